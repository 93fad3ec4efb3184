//! Source back-references of music entities.
//!
//! Every entity keeps the char span of the ABC text it came from. The span is
//! the join key of the whole system: the editor highlights it, playback
//! events carry its start, and per-entity configuration overrides are keyed
//! by the znid derived from it.

/// A position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextPosition {
    /// The line number, starts with 1.
    pub line: usize,
    /// The column number in chars, starts with 1.
    pub col: usize,
}

impl TextPosition {
    /// Creates a new [`TextPosition`].
    #[must_use]
    pub const fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Computes the position of the char index `at` by scanning newlines in
    /// `source`.
    #[must_use]
    pub fn of_char_index(source: &str, at: usize) -> Self {
        let mut line = 1;
        let mut col = 1;
        for (index, ch) in source.chars().enumerate() {
            if index == at {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Self { line, col }
    }
}

impl std::fmt::Display for TextPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

/// Back-reference of a music entity into the source text.
///
/// Immutable once created. Invariant: `0 <= start <= end <= source chars`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Origin {
    /// First char index of the originating text, inclusive.
    pub start: usize,
    /// Last char index of the originating text, exclusive.
    pub end: usize,
    /// The raw source snippet, kept for tooltips and debugging.
    pub raw: String,
}

impl Origin {
    /// Creates a back-reference for `source[start..end]`.
    #[must_use]
    pub fn new(source: &str, start: usize, end: usize) -> Self {
        let raw = source
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect();
        Self { start, end, raw }
    }

    /// The char span as a range, for report rendering.
    #[must_use]
    pub const fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// The stable identifier joining this entity with drawables and
    /// per-entity configuration overrides: `"<startChar>_<time>"`.
    #[must_use]
    pub fn znid(&self, time: i64) -> String {
        format!("{}_{}", self.start, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_index_to_line_and_col() {
        let source = "X:1\nK:C\nCDE";
        assert_eq!(TextPosition::of_char_index(source, 0), TextPosition::new(1, 1));
        assert_eq!(TextPosition::of_char_index(source, 4), TextPosition::new(2, 1));
        assert_eq!(TextPosition::of_char_index(source, 9), TextPosition::new(3, 2));
    }

    #[test]
    fn origin_keeps_the_snippet() {
        let origin = Origin::new("CDEF|", 1, 3);
        assert_eq!(origin.raw, "DE");
        assert_eq!(origin.znid(16), "1_16");
    }
}
