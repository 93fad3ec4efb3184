//! The facade over a notation backend.
//!
//! A backend parses ABC text and reports through callbacks: SVG fragments of
//! the standard notation, annotation brackets around each notational
//! element, the parsed symbol model, and error messages. The adapter drives
//! one backend run and turns the callback stream into a value: captured
//! per-voice symbol chains, an SVG annotated with `abcref` hit-test
//! rectangles, a playback event list, and a parse-error list.
//!
//! The per-voice chains are copied *inside* the model callback. A backend is
//! free to reuse or truncate its own structures after the callback returns;
//! nothing of the adapter output aliases backend memory.

use crate::config::Value;
use crate::harp::abc::parser::{self, TuneMeta};
use crate::harp::abc::symbol::{Symbol, SymbolKind, VoiceSymbols};
use crate::harp::origin::TextPosition;

/// The configuration block separator in the source text.
///
/// Everything after a line equal to this marker is a JSON configuration
/// layer, not music. The save format appends the block to the ABC text.
pub const CONFIG_SEPARATOR: &str = "%%%%zupfnoter.config";

/// A parse error reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseError {
    /// The backend's message.
    pub message: String,
    /// Line and column of the error.
    pub position: TextPosition,
    /// Char index into the source.
    pub index: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

/// A note-on/off event for the playback component.
///
/// `index` is the char index the note starts at in the source; downstream
/// highlighting joins it against entity origin ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerEvent {
    /// Char index of the note in the source.
    pub index: usize,
    /// MIDI pitch.
    pub pitch: u8,
    /// Onset in backend ticks.
    pub start_tick: u32,
    /// Release in backend ticks.
    pub end_tick: u32,
    /// The one-based voice the note belongs to.
    pub voice: usize,
}

/// The callback surface a backend reports through.
pub trait BackendSink {
    /// A chunk of standard-notation SVG.
    fn img_out(&mut self, fragment: &str);
    /// Opens the annotation bracket of one notational element.
    #[allow(clippy::too_many_arguments)]
    fn anno_start(
        &mut self,
        kind: SymbolKind,
        start: usize,
        end: usize,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    );
    /// Closes the annotation bracket of one notational element.
    fn anno_stop(&mut self, kind: SymbolKind, start: usize, end: usize);
    /// Delivers the parsed model. Called exactly once per run; the sink
    /// must copy what it wants to keep.
    fn model(&mut self, voices: &[VoiceSymbols], meta: &TuneMeta);
    /// Reports a parse error.
    fn errmsg(&mut self, message: &str, position: TextPosition, index: usize);
}

/// A notation backend: parses ABC text and reports through a sink.
pub trait NotationBackend {
    /// Processes `source` (music part only, configuration block already
    /// split off) and reports everything through `sink`.
    fn process(&mut self, source: &str, sink: &mut dyn BackendSink);
}

/// The bundled backend: the ABC-subset reader plus a sketched notation
/// preview. A full engraver can be plugged in through [`NotationBackend`]
/// without touching anything downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetBackend;

impl NotationBackend for SubsetBackend {
    fn process(&mut self, source: &str, sink: &mut dyn BackendSink) {
        let output = parser::parse(source);
        for warning in &output.warnings {
            sink.errmsg(&warning.to_string(), warning.position(), warning.index());
        }
        for voice in &output.voices {
            for ts in &voice.symbols {
                let position = TextPosition::of_char_index(source, ts.origin.start);
                let width = 2.5 * ts.origin.raw.chars().count().max(1) as f64;
                let x = (position.col - 1) as f64 * 2.5;
                let y = (position.line - 1) as f64 * 12.0 + f64::from(voice.id as u32) * 2.0;
                sink.anno_start(
                    ts.symbol.kind(),
                    ts.origin.start,
                    ts.origin.end,
                    x,
                    y,
                    width,
                    10.0,
                );
                sink.img_out(&sketch_fragment(&ts.symbol, x, y));
                sink.anno_stop(ts.symbol.kind(), ts.origin.start, ts.origin.end);
            }
        }
        sink.model(&output.voices, &output.meta);
    }
}

/// A minimal visual stand-in for one symbol in the notation preview.
fn sketch_fragment(symbol: &Symbol, x: f64, y: f64) -> String {
    match symbol {
        Symbol::Note { heads, .. } => heads
            .iter()
            .enumerate()
            .map(|(i, head)| {
                format!(
                    r#"<circle cx="{:.1}" cy="{:.1}" r="1.2"/>"#,
                    x + 1.2,
                    y + 8.0 - f64::from(head.pitch) * 0.1 - i as f64 * 0.2
                )
            })
            .collect(),
        Symbol::Rest { .. } => {
            format!(r#"<rect x="{:.1}" y="{:.1}" width="2" height="1"/>"#, x, y + 4.0)
        }
        Symbol::Bar { .. } => {
            format!(r#"<line x1="{x:.1}" y1="{y:.1}" x2="{x:.1}" y2="{:.1}"/>"#, y + 10.0)
        }
        _ => String::new(),
    }
}

/// Everything one backend run produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdapterOutput {
    /// The captured per-voice symbol chains.
    pub voices: Vec<VoiceSymbols>,
    /// Tune metadata.
    pub meta: TuneMeta,
    /// Standard-notation SVG annotated with `abcref` rectangles.
    pub svg: String,
    /// The playback event list.
    pub player_events: Vec<PlayerEvent>,
    /// Errors the backend reported.
    pub errors: Vec<ParseError>,
    /// The configuration layer embedded in the source, if any.
    pub config_layer: Option<Value>,
}

/// Splits the source text at the configuration separator line.
///
/// Returns the music part and, when present, the raw configuration block.
/// The music part keeps its char indices: the block always trails.
#[must_use]
pub fn split_source(source: &str) -> (&str, Option<&str>) {
    let mut search_from = 0;
    while let Some(found) = source[search_from..].find(CONFIG_SEPARATOR) {
        let at = search_from + found;
        let line_start = at == 0 || source[..at].ends_with('\n');
        let after = at + CONFIG_SEPARATOR.len();
        let line_end = source[after..].chars().next().is_none_or(|c| c == '\n' || c == '\r');
        if line_start && line_end {
            return (&source[..at], Some(source[after..].trim()));
        }
        search_from = after;
    }
    (source, None)
}

/// Runs `backend` over `source` and assembles the adapter output.
pub fn run(backend: &mut dyn NotationBackend, source: &str) -> AdapterOutput {
    let (music, config_block) = split_source(source);

    let mut sink = CapturingSink::default();
    backend.process(music, &mut sink);

    let mut output = AdapterOutput {
        voices: sink.voices,
        meta: sink.meta,
        svg: sink.svg,
        player_events: Vec::new(),
        errors: sink.errors,
        config_layer: None,
    };
    output.player_events = player_events(&output.voices);

    if let Some(block) = config_block {
        match serde_json::from_str::<serde_json::Value>(block) {
            Ok(json) => output.config_layer = Some(Value::from_json(&json)),
            Err(error) => {
                let at = music.chars().count();
                output.errors.push(ParseError {
                    message: format!("configuration block is not valid JSON: {error}"),
                    position: TextPosition::of_char_index(source, at),
                    index: at,
                });
            }
        }
    }
    output
}

/// Convenience entry running the bundled backend.
#[must_use]
pub fn run_subset(source: &str) -> AdapterOutput {
    run(&mut SubsetBackend, source)
}

/// Assembles note-on/off events from captured voices, in tick order.
fn player_events(voices: &[VoiceSymbols]) -> Vec<PlayerEvent> {
    let mut events: Vec<PlayerEvent> = voices
        .iter()
        .flat_map(|voice| {
            voice.symbols.iter().filter_map(move |ts| match &ts.symbol {
                Symbol::Note { heads, duration, .. } => Some(
                    heads
                        .iter()
                        .map(move |head| PlayerEvent {
                            index: ts.origin.start,
                            pitch: head.pitch,
                            start_tick: ts.time,
                            end_tick: ts.time + duration,
                            voice: voice.id,
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            })
        })
        .flatten()
        .collect();
    events.sort_by_key(|event| (event.start_tick, event.voice, event.pitch));
    events
}

/// The sink the adapter listens with.
#[derive(Default)]
struct CapturingSink {
    voices: Vec<VoiceSymbols>,
    meta: TuneMeta,
    svg: String,
    errors: Vec<ParseError>,
    model_delivered: bool,
}

impl BackendSink for CapturingSink {
    fn img_out(&mut self, fragment: &str) {
        self.svg.push_str(fragment);
    }

    fn anno_start(
        &mut self,
        kind: SymbolKind,
        start: usize,
        end: usize,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
    ) {
        let id = abcref_id(kind, start, end);
        self.svg.push_str(&format!(
            r#"<g class="{id}"><rect class="abcref" id="{id}" x="{x:.1}" y="{y:.1}" width="{w:.1}" height="{h:.1}" opacity="0"/>"#,
        ));
    }

    fn anno_stop(&mut self, _kind: SymbolKind, _start: usize, _end: usize) {
        self.svg.push_str("</g>");
    }

    fn model(&mut self, voices: &[VoiceSymbols], meta: &TuneMeta) {
        // Copy here: the backend may clear its chains after this returns.
        if !self.model_delivered {
            self.voices = voices.to_vec();
            self.meta = meta.clone();
            self.model_delivered = true;
        }
    }

    fn errmsg(&mut self, message: &str, position: TextPosition, index: usize) {
        self.errors.push(ParseError {
            message: message.to_owned(),
            position,
            index,
        });
    }
}

/// The hit-test identifier format the editor joins on.
fn abcref_id(kind: SymbolKind, start: usize, end: usize) -> String {
    format!("_{}_{}_{}_", kind as u8, start, end)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn splits_the_configuration_block() {
        let source = "X:1\nK:C\nCDEF|\n%%%%zupfnoter.config\n{\"extract\": {}}\n";
        let (music, block) = split_source(source);
        assert_eq!(music, "X:1\nK:C\nCDEF|\n");
        assert_eq!(block, Some("{\"extract\": {}}"));

        let (music, block) = split_source("X:1\nK:C\nC|\n");
        assert_eq!(music, "X:1\nK:C\nC|\n");
        assert_eq!(block, None);
    }

    #[test]
    fn config_layer_parses_into_a_table() {
        let source =
            "X:1\nM:4/4\nK:C\nC|\n%%%%zupfnoter.config\n{\"extract\": {\"0\": {\"title\": \"T\"}}}";
        let output = run_subset(source);
        assert_eq!(output.errors, vec![]);
        let layer = output.config_layer.expect("block present");
        assert_eq!(
            layer.at("extract.0.title").and_then(Value::as_str),
            Some("T")
        );
    }

    #[test]
    fn invalid_config_block_is_an_error_not_a_panic() {
        let source = "X:1\nM:4/4\nK:C\nC|\n%%%%zupfnoter.config\nnot json";
        let output = run_subset(source);
        assert!(output.config_layer.is_none());
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.contains("configuration block"));
    }

    #[test]
    fn svg_carries_abcref_rectangles() {
        let output = run_subset("X:1\nM:4/4\nK:C\nCD|\n");
        assert_eq!(output.errors, vec![]);
        assert!(output.svg.contains(r#"class="abcref""#));
        // Notes carry the NOTE tag (8) and their char span.
        assert!(output.svg.contains("_8_"));
        assert_eq!(output.svg.matches("</g>").count(), output.svg.matches("<g ").count());
    }

    #[test]
    fn player_events_are_tick_ordered_and_char_indexed() {
        let source = "X:1\nM:4/4\nK:C\nV:1\nCD|\nV:2\nEF|\n";
        let output = run_subset(source);
        assert_eq!(output.errors, vec![]);
        let events = &output.player_events;
        assert_eq!(events.len(), 4);
        assert!(events.windows(2).all(|w| w[0].start_tick <= w[1].start_tick));
        let source_chars: Vec<char> = source.chars().collect();
        for event in events {
            assert!(matches!(source_chars[event.index], 'C' | 'D' | 'E' | 'F'));
        }
        assert_eq!(events[0].end_tick - events[0].start_tick, 192);
    }
}
