//! The format-independent drawing model.
//!
//! The layout engine emits a [`Sheet`] of [`Drawable`]s; PDF and SVG
//! back-ends translate them one to one. Everything is read-only after
//! layout. Coordinates are sheet millimeters, origin at the top-left of the
//! drawing area.

pub mod glyphs;

use crate::harp::music::EntityIndex;

/// A point on the sheet, in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    /// Millimeters from the left edge of the drawing area.
    pub x: f64,
    /// Millimeters from the top edge of the drawing area.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// This point moved by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Reference from a drawable back to the music entity it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityRef {
    /// The one-based voice index.
    pub voice: usize,
    /// The entity inside that voice.
    pub entity: EntityIndex,
}

/// Fill of an ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillStyle {
    /// Solid note head.
    Filled,
    /// Outlined note head.
    Empty,
}

/// Stroke style of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineStyle {
    /// A continuous stroke.
    Solid,
    /// A dashed stroke.
    Dashed,
    /// A dotted stroke.
    Dotted,
}

/// Text style of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextStyle {
    /// The default body style.
    #[default]
    Regular,
    /// Title-sized text.
    Large,
    /// Emphasized body text.
    Bold,
    /// Footer and string-name text.
    Small,
    /// Fine print.
    Smaller,
}

impl TextStyle {
    /// Parses a configured style name, falling back to regular.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "large" => Self::Large,
            "bold" => Self::Bold,
            "small" => Self::Small,
            "smaller" => Self::Smaller,
            _ => Self::Regular,
        }
    }

    /// The em height of the style, in millimeters.
    #[must_use]
    pub const fn em_height(self) -> f64 {
        match self {
            Self::Large => 7.0,
            Self::Bold | Self::Regular => 3.5,
            Self::Small => 3.0,
            Self::Smaller => 2.5,
        }
    }
}

/// The fields every drawable carries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawableMeta {
    /// Stroke and fill color name.
    pub color: String,
    /// Stroke width in millimeters.
    pub line_width: f64,
    /// Whether the drawable is rendered.
    pub visible: bool,
    /// The music entity this drawable renders, if any.
    pub origin: Option<EntityRef>,
    /// Configuration key for per-instance overrides.
    pub conf_key: Option<String>,
}

impl Default for DrawableMeta {
    fn default() -> Self {
        Self {
            color: "black".to_owned(),
            line_width: 0.1,
            visible: true,
            origin: None,
            conf_key: None,
        }
    }
}

/// A note head.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ellipse {
    /// Center of the head.
    pub center: Point,
    /// Half-axes in millimeters.
    pub size: (f64, f64),
    /// Solid or outlined.
    pub fill: FillStyle,
    /// Whether a duration dot follows the head.
    pub dotted: bool,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// A line connecting successive or simultaneous notes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowLine {
    /// Start point.
    pub from: Point,
    /// End point.
    pub to: Point,
    /// Stroke style: solid for flow, dashed for synch, dotted across ties.
    pub style: LineStyle,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// One command of a path outline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathCommand {
    /// Absolute move.
    Move(Point),
    /// Absolute line.
    Line(Point),
    /// Relative line.
    LineBy(Point),
    /// Relative cubic curve.
    CurveBy {
        /// First control point, relative.
        c1: Point,
        /// Second control point, relative.
        c2: Point,
        /// End point, relative.
        to: Point,
    },
    /// Close the outline.
    Close,
}

/// A free-form path: jump lines, arrowheads, note flags.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path {
    /// The outline.
    pub commands: Vec<PathCommand>,
    /// Whether the outline is filled.
    pub filled: bool,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// A piece of text on the sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Annotation {
    /// Anchor of the text baseline start.
    pub position: Point,
    /// The text.
    pub text: String,
    /// Text style.
    pub style: TextStyle,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// A pre-computed music glyph, scaled into place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Glyph {
    /// Center of the glyph box.
    pub center: Point,
    /// Half-axes of the glyph box in millimeters.
    pub size: (f64, f64),
    /// Which glyph.
    pub glyph: glyphs::GlyphKey,
    /// Whether a duration dot follows the glyph.
    pub dotted: bool,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// An external image placed on the sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Image {
    /// Top-left corner.
    pub position: Point,
    /// The image location.
    pub url: String,
    /// Display height in millimeters; width follows the aspect ratio.
    pub height: f64,
    /// Shared fields.
    pub meta: DrawableMeta,
}

/// A drawing primitive of the sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum Drawable {
    /// A note head.
    Ellipse(Ellipse),
    /// A flow or synch line.
    FlowLine(FlowLine),
    /// A free-form path.
    Path(Path),
    /// A piece of text.
    Annotation(Annotation),
    /// A music glyph.
    Glyph(Glyph),
    /// An external image.
    Image(Image),
}

impl Drawable {
    /// The shared fields of the drawable.
    #[must_use]
    pub const fn meta(&self) -> &DrawableMeta {
        match self {
            Self::Ellipse(e) => &e.meta,
            Self::FlowLine(f) => &f.meta,
            Self::Path(p) => &p.meta,
            Self::Annotation(a) => &a.meta,
            Self::Glyph(g) => &g.meta,
            Self::Image(i) => &i.meta,
        }
    }
}

/// Printer geometry of an extract.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrinterConfig {
    /// Offset applied when printing on A3, in millimeters.
    pub a3_offset: (f64, f64),
    /// Offset applied when printing on two A4 pages, in millimeters.
    pub a4_offset: (f64, f64),
    /// Whether to draw the page border.
    pub show_border: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            a3_offset: (0.0, 0.0),
            a4_offset: (-5.0, 0.0),
            show_border: false,
        }
    }
}

/// The layout result: an ordered sequence of drawables plus the voice and
/// printer context the renderers need.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sheet {
    /// The drawables, in paint order.
    pub drawables: Vec<Drawable>,
    /// The one-based indexes of the voices laid out.
    pub active_voices: Vec<usize>,
    /// Printer geometry.
    pub printer: PrinterConfig,
}

/// An axis-aligned rectangle, used by the collision scan.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Rect {
    fn overlaps(&self, other: &Self) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

/// Estimates the bounding box of an annotation from its style metrics.
fn annotation_rect(annotation: &Annotation) -> Rect {
    let em = annotation.style.em_height();
    let width = annotation.text.chars().count() as f64 * em * 0.6;
    Rect {
        left: annotation.position.x,
        top: annotation.position.y - em,
        right: annotation.position.x + width,
        bottom: annotation.position.y,
    }
}

/// Finds pairs of visible annotations whose estimated boxes overlap.
///
/// Layout reports them as warnings; positions are never adjusted
/// automatically.
#[must_use]
pub fn overlapping_annotations(sheet: &Sheet) -> Vec<(usize, usize)> {
    let boxed: Vec<(usize, Rect)> = sheet
        .drawables
        .iter()
        .enumerate()
        .filter_map(|(index, drawable)| match drawable {
            Drawable::Annotation(annotation) if annotation.meta.visible => {
                Some((index, annotation_rect(annotation)))
            }
            _ => None,
        })
        .collect();
    let mut pairs = Vec::new();
    for (i, (index_a, rect_a)) in boxed.iter().enumerate() {
        for (index_b, rect_b) in &boxed[i + 1..] {
            if rect_a.overlaps(rect_b) {
                pairs.push((*index_a, *index_b));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(x: f64, y: f64, text: &str) -> Drawable {
        Drawable::Annotation(Annotation {
            position: Point::new(x, y),
            text: text.to_owned(),
            style: TextStyle::Regular,
            meta: DrawableMeta::default(),
        })
    }

    #[test]
    fn collision_scan_flags_overlapping_texts() {
        let sheet = Sheet {
            drawables: vec![
                annotation(10.0, 10.0, "eins"),
                annotation(11.0, 10.5, "zwei"),
                annotation(100.0, 100.0, "weit weg"),
            ],
            ..Sheet::default()
        };
        assert_eq!(overlapping_annotations(&sheet), vec![(0, 1)]);
    }

    #[test]
    fn meta_is_reachable_through_the_variants() {
        let drawable = annotation(0.0, 0.0, "x");
        assert!(drawable.meta().visible);
        assert_eq!(drawable.meta().color, "black");
    }
}
