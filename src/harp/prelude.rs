//! Convenience re-exports of the public surface.
//!
//! `use harpnote_rs::harp::prelude::*;` brings the whole pipeline into
//! scope at once.

pub use super::{
    HarpWarning, RenderOutput,
    abc::{
        AbcWarning,
        parser::{AbcOutput, TuneMeta, parse},
        symbol::{
            NoteHead, PARSER_WHOLE, Symbol, SymbolKind, TimedSymbol, TupletMark, VoiceSymbols,
            slur_start_count,
        },
    },
    adapter::{
        AdapterOutput, BackendSink, CONFIG_SEPARATOR, NotationBackend, ParseError, PlayerEvent,
        SubsetBackend, run, run_subset, split_source,
    },
    drawing::{
        Annotation, Drawable, DrawableMeta, Ellipse, EntityRef, FillStyle, FlowLine, Glyph, Image,
        LineStyle, Path, PathCommand, Point, PrinterConfig, Sheet, TextStyle,
        glyphs::GlyphKey, overlapping_annotations,
    },
    layout::{
        DurationStyle, LayoutOutput, LayoutWarning,
        duration_style, layout_sheet,
        packer::{BEAT_RESOLUTION, BeatCompressor, BeatLoad},
        rest_glyph,
    },
    music::{
        Anchor, EntityIndex, Goto, JumpPolicy, MeasureStart, MusicEntity, NewPart, Note,
        NoteBoundAnnotation, Pause, Playable, PlayableCore, Shift, Song, SynchPoint,
        VerticalAnchor, Voice, source_checksum,
    },
    origin::{Origin, TextPosition},
    render_sheet, render_sheet_with,
    transform::{TransformOutput, TransformWarning, transform},
};

pub use crate::config::{ConfigError, ConfigStack, Path as ConfigPath, Thunk, Value, defaults};

#[cfg(feature = "diagnostics")]
pub use crate::diagnostics::{SimpleSource, ToAriadne, emit_warnings};
