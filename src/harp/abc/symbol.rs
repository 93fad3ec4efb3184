//! The symbol stream delivered by a notation backend.
//!
//! Downstream only consumes a handful of symbol kinds (BAR, METER, KEY,
//! NOTE, REST, PART, STAVES, TEMPO); everything else passes through
//! untouched. Kinds are identified by the stable small-integer tags of the
//! abc2svg model so that a real engraver backend can be plugged in without a
//! mapping table.

use crate::harp::origin::Origin;

/// Ticks per whole note in the backend's resolution.
pub const PARSER_WHOLE: u32 = 1536;

/// The stable small-integer type tag of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SymbolKind {
    /// A bar line, including repeat and volta bars.
    Bar = 0,
    /// A clef change. Passed through.
    Clef = 1,
    /// A key signature.
    Key = 5,
    /// A meter change.
    Meter = 6,
    /// A note or chord.
    Note = 8,
    /// A part label.
    Part = 9,
    /// A rest.
    Rest = 10,
    /// A staff system directive. Passed through.
    Staves = 12,
    /// A staff break. Passed through.
    Stbrk = 13,
    /// A tempo directive. Passed through.
    Tempo = 14,
}

/// One head of a note symbol. A chord carries several.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteHead {
    /// MIDI pitch of the head.
    pub pitch: u8,
    /// Whether a tie marker follows this head.
    pub tie_start: bool,
}

/// Tuplet membership of a note symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TupletMark {
    /// `p` notes are played in the time of `q`.
    pub p: u32,
    /// The reference count of the ratio.
    pub q: u32,
    /// This symbol opens the tuplet group.
    pub start: bool,
    /// This symbol closes the tuplet group.
    pub end: bool,
}

/// A symbol of the backend's per-voice stream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum Symbol {
    /// A note or chord.
    Note {
        /// The heads, in declaration order. At least one.
        heads: Vec<NoteHead>,
        /// Duration in backend ticks ([`PARSER_WHOLE`] per whole note).
        duration: u32,
        /// Slur openings before the symbol, one nibble per slur.
        slur_start: u32,
        /// Number of slurs closed after the symbol.
        slur_end: u8,
        /// Tuplet membership, if any.
        tuplet: Option<TupletMark>,
        /// Decoration names, `!…!` in the source.
        decorations: Vec<String>,
        /// Chord-annotation texts, `"…"` in the source.
        annotations: Vec<String>,
    },
    /// A rest.
    Rest {
        /// Duration in backend ticks.
        duration: u32,
        /// `z` rests are visible, `x` rests are not.
        visible: bool,
        /// Chord-annotation texts attached to the rest.
        annotations: Vec<String>,
    },
    /// A bar line.
    Bar {
        /// The bar glyph as written, volta digits stripped: `|`, `||`,
        /// `|]`, `|:`, `:|`, `::`.
        bar_type: String,
        /// `2` when a variant bracket opens at this bar.
        rbstart: u8,
        /// `2` when a variant bracket closes at this bar.
        rbstop: u8,
        /// The volta label (`1`, `2`, `1-3`) when a bracket opens.
        label: Option<String>,
        /// Chord-annotation texts attached to the bar (`@@…` distances).
        annotations: Vec<String>,
    },
    /// A meter change.
    Meter {
        /// Beats per measure.
        num: u32,
        /// The beat unit denominator.
        den: u32,
    },
    /// A key signature. Only consumed for pitch decoding inside the backend;
    /// passed through to keep the stream complete.
    Key {
        /// The key name as written (`C`, `G`, `Bb`, `Am`).
        name: String,
    },
    /// A part label (`P:` line).
    Part {
        /// The label text.
        label: String,
    },
    /// A tempo directive. Passed through.
    Tempo {
        /// The tempo text as written.
        text: String,
    },
    /// A staff system directive. Passed through.
    Staves,
}

impl Symbol {
    /// The stable type tag of the symbol.
    #[must_use]
    pub const fn kind(&self) -> SymbolKind {
        match self {
            Self::Note { .. } => SymbolKind::Note,
            Self::Rest { .. } => SymbolKind::Rest,
            Self::Bar { .. } => SymbolKind::Bar,
            Self::Meter { .. } => SymbolKind::Meter,
            Self::Key { .. } => SymbolKind::Key,
            Self::Part { .. } => SymbolKind::Part,
            Self::Tempo { .. } => SymbolKind::Tempo,
            Self::Staves => SymbolKind::Staves,
        }
    }
}

/// A symbol with its onset time and source back-reference.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimedSymbol {
    /// Onset in backend ticks from the start of the voice.
    pub time: u32,
    /// Back-reference into the source text.
    pub origin: Origin,
    /// The symbol itself.
    pub symbol: Symbol,
}

/// The symbols of one voice, captured in source order.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoiceSymbols {
    /// The one-based voice index.
    pub id: usize,
    /// The human-readable voice name.
    pub name: String,
    /// The captured symbol chain.
    pub symbols: Vec<TimedSymbol>,
}

/// Decodes the nibble-encoded slur-start field into a count.
#[must_use]
pub fn slur_start_count(mut bits: u32) -> usize {
    let mut count = 0;
    while bits != 0 {
        count += 1;
        bits >>= 4;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slur_nibbles() {
        assert_eq!(slur_start_count(0), 0);
        assert_eq!(slur_start_count(0x1), 1);
        assert_eq!(slur_start_count(0x11), 2);
        assert_eq!(slur_start_count(0x111), 3);
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(SymbolKind::Bar as u8, 0);
        assert_eq!(SymbolKind::Note as u8, 8);
        assert_eq!(SymbolKind::Rest as u8, 10);
        assert_eq!(SymbolKind::Tempo as u8, 14);
    }
}
