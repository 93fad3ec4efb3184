//! Dotted-path addressing of the configuration tree.

/// A parsed dotted path such as `extract.0.layout.X_SPACING`.
///
/// Splitting happens once at the boundary; the rest of the stack works on
/// segments. A numeric segment addresses a list index when the node it is
/// applied to is a list, and an ordinary table key otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path(Vec<String>);

impl Path {
    /// The empty path, addressing the whole layer.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a dotted path. Empty input yields the root path.
    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(dotted.split('.').map(str::to_owned).collect())
    }

    /// Returns the segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_owned());
        Self(segments)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Interprets a segment as a list index, if it is numeric.
#[must_use]
pub(crate) fn as_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let path = Path::parse("extract.0.layout.X_SPACING");
        assert_eq!(path.segments().len(), 4);
        assert_eq!(path.to_string(), "extract.0.layout.X_SPACING");
        assert!(Path::parse("").is_root());
    }

    #[test]
    fn numeric_segments() {
        assert_eq!(as_index("0"), Some(0));
        assert_eq!(as_index("12"), Some(12));
        assert_eq!(as_index("1a"), None);
        assert_eq!(as_index(""), None);
    }
}
