//! The render pipeline: ABC text in, sheet of drawables out.
//!
//! The phases run serially and synchronously: the adapter obtains the symbol
//! streams, the transformer builds the music model, the layout engine
//! assigns coordinates. Configuration layers pushed for a render are rolled
//! back afterwards, so a failed render never leaks state into the next one.
//!
//! Errors follow the warnings-accumulate policy: parse, transform, and
//! layout findings collect into [`RenderOutput::warnings`], each carrying a
//! source position. Only a configuration failure (a deferred-value cycle)
//! aborts a render, and the stack still rolls back to the last known-good
//! state.

pub mod abc;
pub mod adapter;
pub mod drawing;
pub mod layout;
pub mod music;
pub mod origin;
pub mod prelude;
pub mod transform;

use thiserror::Error;

use crate::config::{ConfigError, ConfigStack, defaults};

use self::adapter::{NotationBackend, ParseError, PlayerEvent, SubsetBackend};
use self::drawing::Sheet;
use self::layout::LayoutWarning;
use self::music::Song;
use self::origin::TextPosition;
use self::transform::TransformWarning;

/// A warning collected anywhere along the render pipeline.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HarpWarning {
    /// The notation backend reported a parse error.
    #[error("parse: {0}")]
    Parse(ParseError),
    /// The music transformer skipped or adjusted something.
    #[error("transform: {0}")]
    Transform(TransformWarning),
    /// The layout engine found a problem on the sheet.
    #[error("layout: {0}")]
    Layout(LayoutWarning),
}

impl HarpWarning {
    /// The char index the warning points at, where it has one.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self {
            Self::Parse(error) => Some(error.index),
            Self::Transform(warning) => match warning {
                TransformWarning::UnexpectedSymbol { index, .. }
                | TransformWarning::FractionalBeat { index, .. }
                | TransformWarning::UnknownTemplate { index, .. } => Some(*index),
                _ => None,
            },
            Self::Layout(_) => None,
        }
    }
}

/// Everything one render produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    /// The transformed song.
    pub song: Song,
    /// The laid-out sheet.
    pub sheet: Sheet,
    /// The annotated standard-notation SVG.
    pub svg: String,
    /// The playback event list.
    pub player_events: Vec<PlayerEvent>,
    /// Warnings of all phases, in pipeline order.
    pub warnings: Vec<HarpWarning>,
}

/// Renders `source` with the bundled backend and the default configuration,
/// using extract `extract`.
///
/// # Errors
///
/// A circular deferred-value dependency in the configuration.
pub fn render_sheet(source: &str, extract: usize) -> Result<RenderOutput, ConfigError> {
    let mut conf = defaults::stack_with_defaults();
    render_sheet_with(&mut conf, &mut SubsetBackend, source, extract)
}

/// Renders `source` against an existing configuration stack and a caller
/// supplied backend.
///
/// A configuration block embedded in the source is pushed as a layer for
/// the duration of the render; on return the stack is back at the depth it
/// had on entry, also when the render fails.
///
/// # Errors
///
/// A circular deferred-value dependency in the configuration.
pub fn render_sheet_with(
    conf: &mut ConfigStack,
    backend: &mut dyn NotationBackend,
    source: &str,
    extract: usize,
) -> Result<RenderOutput, ConfigError> {
    let depth = conf.depth();
    let result = render_inner(conf, backend, source, extract);
    conf.reset_to(depth);
    result
}

fn render_inner(
    conf: &mut ConfigStack,
    backend: &mut dyn NotationBackend,
    source: &str,
    extract: usize,
) -> Result<RenderOutput, ConfigError> {
    let adapted = adapter::run(backend, source);
    let mut warnings: Vec<HarpWarning> =
        adapted.errors.iter().cloned().map(HarpWarning::Parse).collect();

    if let Some(layer) = adapted.config_layer.clone()
        && let Err(error) = conf.push(layer)
    {
        // A malformed embedded layer degrades to a parse finding; the tune
        // still renders with the configuration it had.
        warnings.push(HarpWarning::Parse(ParseError {
            message: error.to_string(),
            position: TextPosition::new(1, 1),
            index: 0,
        }));
    }

    let transformed = transform::transform(source, &adapted.voices, &adapted.meta, conf)?;
    warnings.extend(transformed.warnings.into_iter().map(HarpWarning::Transform));

    let mut song = transformed.song;
    let laid_out = layout::layout_sheet(&mut song, extract, conf)?;
    warnings.extend(laid_out.warnings.into_iter().map(HarpWarning::Layout));

    Ok(RenderOutput {
        song,
        sheet: laid_out.sheet,
        svg: adapted.svg,
        player_events: adapted.player_events,
        warnings,
    })
}
