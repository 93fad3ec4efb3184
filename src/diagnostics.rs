//! Fancy diagnostics support using `ariadne`.
//!
//! Render warnings carry char indexes into the tune source; this module
//! turns them into `ariadne::Report`s without touching the warning types
//! themselves. Ariadne derives row/column display from the offsets.
//!
//! # Usage Example
//!
//! ```rust
//! use harpnote_rs::diagnostics::emit_warnings;
//! use harpnote_rs::harp::render_sheet;
//!
//! let source = "X:1\nM:4/4\nK:C\nCDEF|\n";
//! let output = render_sheet(source, 0).unwrap();
//! emit_warnings("tune.abc", source, &output.warnings);
//! ```

use ariadne::{Label, Report, ReportKind, Source};

use crate::harp::HarpWarning;

/// Simple source container holding the tune name and source text.
pub struct SimpleSource<'a> {
    name: &'a str,
    text: &'a str,
}

impl<'a> SimpleSource<'a> {
    /// Creates a new source container.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// The source text.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// The tune name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }
}

/// Conversion of positioned warnings to `ariadne::Report`.
pub trait ToAriadne {
    /// Builds a report against `src`.
    fn to_report<'a>(&self, src: &SimpleSource<'a>)
    -> Report<'a, (String, std::ops::Range<usize>)>;
}

impl ToAriadne for HarpWarning {
    fn to_report<'a>(
        &self,
        src: &SimpleSource<'a>,
    ) -> Report<'a, (String, std::ops::Range<usize>)> {
        let len = src.text().len();
        let span = self
            .index()
            .map_or(0..0, |at| at.min(len)..(at + 1).min(len));
        let id = src.name().to_owned();
        Report::build(ReportKind::Warning, (id.clone(), span.clone()))
            .with_message(self.to_string())
            .with_label(Label::new((id, span)).with_message(match self {
                Self::Parse(_) => "reported by the notation backend",
                Self::Transform(_) => "while building the music model",
                Self::Layout(_) => "while laying out the sheet",
            }))
            .finish()
    }
}

/// Renders every warning of a render run to the terminal.
pub fn emit_warnings<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a HarpWarning>,
) {
    let simple = SimpleSource::new(name, source);
    let ariadne_source = Source::from(source);
    for warning in warnings {
        let report = warning.to_report(&simple);
        let _ = report.print((name.to_owned(), ariadne_source.clone()));
    }
}
