//! The catalog of music glyphs used on tablature sheets.
//!
//! Outlines are pre-computed path-command lists in a nominal box of 10 by 10
//! units centered on the origin; renderers scale them into the box given by
//! the [`super::Glyph`] drawable. The shapes are simplified tracings of the
//! conventional engraving forms. A tablature sheet shows rests small and
//! sparse, so fidelity beyond recognizability buys nothing.

use super::{Point, PathCommand};

/// Identifies a glyph of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum GlyphKey {
    /// Whole rest: a block hanging below the line.
    Rest1,
    /// Half rest: a block sitting on the line.
    Rest2,
    /// Quarter rest.
    Rest4,
    /// Eighth rest.
    Rest8,
    /// Sixteenth rest.
    Rest16,
    /// Thirty-second rest.
    Rest32,
    /// Sixty-fourth rest.
    Rest64,
    /// Fermata above a note.
    Fermata,
    /// Emphasis wedge above a note.
    Emphasis,
    /// The error marker shown for unrepresentable durations.
    Error,
}

const fn pt(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

static REST_1: [PathCommand; 5] = [
    PathCommand::Move(pt(-3.0, -2.0)),
    PathCommand::LineBy(pt(6.0, 0.0)),
    PathCommand::LineBy(pt(0.0, 2.2)),
    PathCommand::LineBy(pt(-6.0, 0.0)),
    PathCommand::Close,
];

static REST_2: [PathCommand; 5] = [
    PathCommand::Move(pt(-3.0, 0.0)),
    PathCommand::LineBy(pt(6.0, 0.0)),
    PathCommand::LineBy(pt(0.0, -2.2)),
    PathCommand::LineBy(pt(-6.0, 0.0)),
    PathCommand::Close,
];

static REST_4: [PathCommand; 8] = [
    PathCommand::Move(pt(-0.8, -5.0)),
    PathCommand::CurveBy {
        c1: pt(1.8, 1.6),
        c2: pt(2.0, 2.2),
        to: pt(0.6, 3.8),
    },
    PathCommand::CurveBy {
        c1: pt(1.6, 1.4),
        c2: pt(1.8, 2.0),
        to: pt(0.4, 3.4),
    },
    PathCommand::CurveBy {
        c1: pt(-1.6, -0.8),
        c2: pt(-2.2, -0.2),
        to: pt(-1.2, 2.8),
    },
    PathCommand::CurveBy {
        c1: pt(-1.8, -2.2),
        c2: pt(-1.2, -3.2),
        to: pt(0.6, -3.6),
    },
    PathCommand::CurveBy {
        c1: pt(-1.4, -1.6),
        c2: pt(-1.6, -2.2),
        to: pt(-0.4, -3.4),
    },
    PathCommand::LineBy(pt(0.0, -3.0)),
    PathCommand::Close,
];

static REST_8: [PathCommand; 6] = [
    PathCommand::Move(pt(1.8, -5.0)),
    PathCommand::LineBy(pt(-3.2, 10.0)),
    PathCommand::LineBy(pt(0.8, 0.0)),
    PathCommand::LineBy(pt(2.0, -8.0)),
    PathCommand::CurveBy {
        c1: pt(-1.6, 1.0),
        c2: pt(-2.8, 0.4),
        to: pt(0.4, -2.0),
    },
    PathCommand::Close,
];

static REST_16: [PathCommand; 7] = [
    PathCommand::Move(pt(2.2, -5.0)),
    PathCommand::LineBy(pt(-3.8, 10.0)),
    PathCommand::LineBy(pt(0.8, 0.0)),
    PathCommand::LineBy(pt(1.4, -5.0)),
    PathCommand::CurveBy {
        c1: pt(-1.4, 0.8),
        c2: pt(-2.4, 0.2),
        to: pt(0.2, -1.8),
    },
    PathCommand::CurveBy {
        c1: pt(-1.4, 0.8),
        c2: pt(-2.4, 0.2),
        to: pt(1.4, -3.2),
    },
    PathCommand::Close,
];

static REST_32: [PathCommand; 8] = [
    PathCommand::Move(pt(2.6, -5.0)),
    PathCommand::LineBy(pt(-4.4, 10.0)),
    PathCommand::LineBy(pt(0.8, 0.0)),
    PathCommand::LineBy(pt(1.0, -3.6)),
    PathCommand::CurveBy {
        c1: pt(-1.2, 0.7),
        c2: pt(-2.0, 0.2),
        to: pt(0.2, -1.6),
    },
    PathCommand::CurveBy {
        c1: pt(-1.2, 0.7),
        c2: pt(-2.0, 0.2),
        to: pt(0.2, -1.6),
    },
    PathCommand::CurveBy {
        c1: pt(-1.2, 0.7),
        c2: pt(-2.0, 0.2),
        to: pt(2.2, -3.2),
    },
    PathCommand::Close,
];

static REST_64: [PathCommand; 9] = [
    PathCommand::Move(pt(3.0, -5.0)),
    PathCommand::LineBy(pt(-5.0, 10.0)),
    PathCommand::LineBy(pt(0.8, 0.0)),
    PathCommand::LineBy(pt(0.8, -2.8)),
    PathCommand::CurveBy {
        c1: pt(-1.0, 0.6),
        c2: pt(-1.8, 0.2),
        to: pt(0.2, -1.4),
    },
    PathCommand::CurveBy {
        c1: pt(-1.0, 0.6),
        c2: pt(-1.8, 0.2),
        to: pt(0.2, -1.4),
    },
    PathCommand::CurveBy {
        c1: pt(-1.0, 0.6),
        c2: pt(-1.8, 0.2),
        to: pt(0.2, -1.4),
    },
    PathCommand::CurveBy {
        c1: pt(-1.0, 0.6),
        c2: pt(-1.8, 0.2),
        to: pt(2.2, -2.8),
    },
    PathCommand::Close,
];

static FERMATA: [PathCommand; 4] = [
    PathCommand::Move(pt(-4.0, 1.0)),
    PathCommand::CurveBy {
        c1: pt(1.0, -5.2),
        c2: pt(7.0, -5.2),
        to: pt(8.0, 0.0),
    },
    PathCommand::CurveBy {
        c1: pt(-1.2, -4.0),
        c2: pt(-6.8, -4.0),
        to: pt(-8.0, 0.0),
    },
    PathCommand::Close,
];

static EMPHASIS: [PathCommand; 4] = [
    PathCommand::Move(pt(-4.0, -1.0)),
    PathCommand::LineBy(pt(8.0, 1.0)),
    PathCommand::LineBy(pt(-8.0, 1.0)),
    PathCommand::Close,
];

static ERROR: [PathCommand; 9] = [
    PathCommand::Move(pt(-4.0, -4.0)),
    PathCommand::LineBy(pt(4.0, 3.0)),
    PathCommand::LineBy(pt(4.0, -3.0)),
    PathCommand::LineBy(pt(-3.0, 4.0)),
    PathCommand::LineBy(pt(3.0, 4.0)),
    PathCommand::LineBy(pt(-4.0, -3.0)),
    PathCommand::LineBy(pt(-4.0, 3.0)),
    PathCommand::LineBy(pt(3.0, -4.0)),
    PathCommand::Close,
];

impl GlyphKey {
    /// The outline commands of the glyph in the nominal 10-by-10 box.
    #[must_use]
    pub fn outline(self) -> &'static [PathCommand] {
        match self {
            Self::Rest1 => &REST_1,
            Self::Rest2 => &REST_2,
            Self::Rest4 => &REST_4,
            Self::Rest8 => &REST_8,
            Self::Rest16 => &REST_16,
            Self::Rest32 => &REST_32,
            Self::Rest64 => &REST_64,
            Self::Fermata => &FERMATA,
            Self::Emphasis => &EMPHASIS,
            Self::Error => &ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_outline_is_closed() {
        for key in [
            GlyphKey::Rest1,
            GlyphKey::Rest2,
            GlyphKey::Rest4,
            GlyphKey::Rest8,
            GlyphKey::Rest16,
            GlyphKey::Rest32,
            GlyphKey::Rest64,
            GlyphKey::Fermata,
            GlyphKey::Emphasis,
            GlyphKey::Error,
        ] {
            let outline = key.outline();
            assert!(matches!(outline.first(), Some(PathCommand::Move(_))));
            assert!(matches!(outline.last(), Some(PathCommand::Close)));
        }
    }
}
