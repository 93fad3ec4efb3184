//! Layered configuration for sheet rendering.
//!
//! Rendering is steered by dozens of settings: page geometry, per-extract
//! voice selection, rest positioning, packer tuning. They come from several
//! places at once: built-in defaults, the instrument preset, the
//! configuration block embedded in the tune source, and interactive edits.
//! Each of those is a *layer*: pushing a layer deep-merges it onto the
//! current top and the merged result becomes the new top, so popping a layer
//! restores the previous state exactly.
//!
//! Values are addressed by dotted paths such as `extract.0.layout.X_SPACING`.
//! A numeric segment addresses a list index when the node is a list, and an
//! ordinary key otherwise.
//!
//! Leaves may be *deferred*: a [`Value::Lazy`] holds a producer that is
//! invoked on demand, so derived settings (string names as a function of the
//! instrument, say) are expressed once and stay correct after any override.
//! Resolution caches per producer and detects reference cycles.

pub mod defaults;
pub mod path;
pub mod stack;
pub mod value;

use std::borrow::Cow;

use thiserror::Error;

/// An error occurred while reading or writing the configuration tree.
///
/// Only [`ConfigError::CircularDependency`] is fatal to a render; the stack
/// itself stays intact and rolls back to the last pushed layer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfigError {
    /// A deferred value read another deferred value that is currently being
    /// evaluated. The chain lists the paths of the cycle in evaluation order.
    #[error("circular configuration dependency: {}", chain.join(" -> "))]
    CircularDependency {
        /// Paths participating in the cycle, first entry repeated at the end.
        chain: Vec<String>,
    },
    /// A layer pushed onto the stack was not a table.
    #[error("configuration layer must be a table, got {found}")]
    LayerNotTable {
        /// Type name of the offending value.
        found: Cow<'static, str>,
    },
    /// A `set` tried to index past the end of a list.
    #[error("cannot address index {index} in list of length {len} at `{path}`")]
    IndexOutOfRange {
        /// Path of the list node.
        path: String,
        /// The requested index.
        index: usize,
        /// The current list length.
        len: usize,
    },
    /// A deferred producer reported a failure of its own.
    #[error("deferred value failed: {message}")]
    DeferredFailed {
        /// Producer-supplied description.
        message: String,
    },
}

/// type alias of `core::result::Result<T, ConfigError>`
pub(crate) type Result<T> = core::result::Result<T, ConfigError>;

pub use path::Path;
pub use stack::ConfigStack;
pub use value::{Thunk, Value};
