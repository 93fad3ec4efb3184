//! The ABC notation front end.
//!
//! `symbol` defines the per-voice symbol stream every notation backend must
//! deliver; `parser` is the bundled reader for the playable ABC subset;
//! `cursor` is its scanning support. The adapter in [`crate::harp::adapter`]
//! is the only consumer.

pub(crate) mod cursor;
pub mod parser;
pub mod symbol;

use std::borrow::Cow;

use thiserror::Error;

use crate::harp::origin::TextPosition;

/// A warning raised while scanning ABC source.
///
/// Scanning never aborts; warnings accumulate and the offending chars are
/// skipped.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbcWarning {
    /// A char that cannot start any symbol of the subset.
    #[error("unexpected char `{found}` at {position}")]
    UnexpectedChar {
        /// The char found.
        found: char,
        /// Where it was found.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
    /// A header field whose argument did not parse.
    #[error("malformed `{field}` header at {position}")]
    MalformedHeader {
        /// The field tag, such as `M:`.
        field: Cow<'static, str>,
        /// Where the field starts.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
    /// A delimited construct missing its closing delimiter.
    #[error("unterminated {what} at {position}")]
    Unterminated {
        /// What stayed open.
        what: Cow<'static, str>,
        /// Where it started.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
}

impl AbcWarning {
    /// The position the warning points at.
    #[must_use]
    pub const fn position(&self) -> TextPosition {
        match self {
            Self::UnexpectedChar { position, .. }
            | Self::MalformedHeader { position, .. }
            | Self::Unterminated { position, .. } => *position,
        }
    }

    /// The char index the warning points at.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::UnexpectedChar { index, .. }
            | Self::MalformedHeader { index, .. }
            | Self::Unterminated { index, .. } => *index,
        }
    }
}
