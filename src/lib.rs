//! The harpnote tablature sheet engine.
//!
//! Table harps (Veeh-Harfe, Zauberharfe and friends) are played from tablature
//! sheets: the sheet is laid under the strings, every string owns a vertical
//! strip, and time runs down the page. This crate turns a tune written in ABC
//! notation into the positioned, format-independent drawing primitives of such
//! a sheet. Emitting actual PDF or SVG from those primitives is left to a
//! renderer; this crate stops at geometry.
//!
//! # Usage
//!
//! ```
//! use harpnote_rs::harp::{render_sheet, RenderOutput};
//!
//! let source = "X:1\nM:4/4\nL:1/4\nK:C\nCDEF|\n";
//! let RenderOutput { sheet, warnings, .. } = render_sheet(source, 0).unwrap();
//! assert_eq!(warnings, vec![]);
//! assert!(!sheet.drawables.is_empty());
//! ```
//!
//! # Pipeline
//!
//! ```text
//! ABC text
//!   └─ adapter: symbol streams per voice, playback events, notation SVG
//!        └─ transform: playables, ties, repeats, variant endings, annotations
//!             └─ layout: pitch → x, beat → y with content-aware compression
//!                  └─ sheet: ellipses, glyphs, flowlines, paths, annotations
//! ```
//!
//! Rendering is steered by a process-wide [`config`] stack: defaults,
//! instrument presets, the configuration block embedded in the source text,
//! and user edits compose as layers.
//!
//! # Features
//!
//! - `diagnostics` (default) enables rendering accumulated warnings as
//!   `ariadne` reports, see [`diagnostics`].
//! - `serde` enables `serde::Serialize` and `serde::Deserialize` for the
//!   model and drawing types.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod harp;

pub use harp::{HarpWarning, RenderOutput, render_sheet};
