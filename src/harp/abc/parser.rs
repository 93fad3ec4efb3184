//! The built-in reader for the playable ABC subset.
//!
//! It understands what a tablature sheet can express: notes, rests, bar
//! structure, repeats, variant endings, ties, slurs, tuplets, decorations,
//! and chord-annotation strings. Anything else either passes through as an
//! opaque symbol or produces a warning and is skipped; scanning never
//! aborts.

use std::collections::HashMap;

use super::{
    AbcWarning,
    cursor::Cursor,
    symbol::{NoteHead, PARSER_WHOLE, Symbol, TimedSymbol, TupletMark, VoiceSymbols},
};
use crate::harp::origin::Origin;

/// Tune metadata gathered from the header fields.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TuneMeta {
    /// The `X:` reference number.
    pub index: Option<u32>,
    /// The `T:` title.
    pub title: Option<String>,
    /// The `C:` composer.
    pub composer: Option<String>,
    /// The active meter as written.
    pub meter: (u32, u32),
    /// The `K:` key name.
    pub key: String,
    /// The `Q:` tempo text.
    pub tempo: Option<String>,
}

impl Default for TuneMeta {
    fn default() -> Self {
        Self {
            index: None,
            title: None,
            composer: None,
            meter: (4, 4),
            key: "C".to_owned(),
            tempo: None,
        }
    }
}

/// Reader output: metadata, per-voice symbol chains, accumulated warnings.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbcOutput {
    /// Tune metadata.
    pub meta: TuneMeta,
    /// The voices in order of first appearance.
    pub voices: Vec<VoiceSymbols>,
    /// Warnings raised while scanning.
    pub warnings: Vec<AbcWarning>,
}

/// Scans ABC source text into per-voice symbol streams.
#[must_use]
pub fn parse(source: &str) -> AbcOutput {
    Reader::new(source).run()
}

/// Key signatures by conventional name, as sharp (positive) or flat
/// (negative) counts.
const KEY_SIGNATURES: [(&str, i8); 30] = [
    ("C", 0), ("G", 1), ("D", 2), ("A", 3), ("E", 4), ("B", 5), ("F#", 6), ("C#", 7),
    ("F", -1), ("Bb", -2), ("Eb", -3), ("Ab", -4), ("Db", -5), ("Gb", -6), ("Cb", -7),
    ("Am", 0), ("Em", 1), ("Bm", 2), ("F#m", 3), ("C#m", 4), ("G#m", 5), ("D#m", 6), ("A#m", 7),
    ("Dm", -1), ("Gm", -2), ("Cm", -3), ("Fm", -4), ("Bbm", -5), ("Ebm", -6), ("Abm", -7),
];

const SHARP_ORDER: [char; 7] = ['F', 'C', 'G', 'D', 'A', 'E', 'B'];
const FLAT_ORDER: [char; 7] = ['B', 'E', 'A', 'D', 'G', 'C', 'F'];

fn key_accidentals(name: &str) -> Option<HashMap<char, i8>> {
    let trimmed = name.trim();
    let normalized = trimmed
        .strip_suffix("min")
        .or_else(|| trimmed.strip_suffix("m"))
        .map_or_else(|| trimmed.to_owned(), |base| format!("{base}m"));
    let sf = KEY_SIGNATURES
        .iter()
        .find(|(key, _)| *key == normalized)?
        .1;
    let mut map = HashMap::new();
    if sf >= 0 {
        for &letter in &SHARP_ORDER[..sf as usize] {
            map.insert(letter, 1);
        }
    } else {
        for &letter in &FLAT_ORDER[..(-sf) as usize] {
            map.insert(letter, -1);
        }
    }
    Some(map)
}

/// An open tuplet group: `p` notes in the time of `q`, `remaining` of
/// `total` members still to come.
#[derive(Debug, Clone, Copy)]
struct TupletRun {
    p: u32,
    q: u32,
    total: u32,
    remaining: u32,
}

/// Per-voice build state.
#[derive(Default)]
struct VoiceBuild {
    id: usize,
    name: String,
    symbols: Vec<TimedSymbol>,
    time: u32,
    in_volta: bool,
    tuplet: Option<TupletRun>,
    /// Accidentals seen in the current measure, keyed by letter and octave.
    measure_accidentals: HashMap<(char, i8), i8>,
    /// Index of the last note symbol, target of trailing `-` and `)`.
    last_note: Option<usize>,
    // Scratch collected between symbols.
    pending_annotations: Vec<String>,
    pending_decorations: Vec<String>,
    pending_slurs: u8,
}

struct Reader<'a> {
    source: &'a str,
    cursor: Cursor,
    meta: TuneMeta,
    warnings: Vec<AbcWarning>,
    voices: Vec<VoiceBuild>,
    current: usize,
    /// Ticks of the unit note length (`L:`), adjusted by `M:` when absent.
    unit_len: u32,
    explicit_unit_len: bool,
    /// Ticks per measure, from the meter.
    w_measure: u32,
    key_map: HashMap<char, i8>,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: Cursor::new(source),
            meta: TuneMeta::default(),
            warnings: Vec::new(),
            voices: Vec::new(),
            current: 0,
            unit_len: PARSER_WHOLE / 8,
            explicit_unit_len: false,
            w_measure: PARSER_WHOLE,
            key_map: HashMap::new(),
        }
    }

    fn run(mut self) -> AbcOutput {
        while !self.cursor.is_end() {
            if self.cursor.at_line_start() && self.try_header_line() {
                continue;
            }
            self.body_step();
        }
        AbcOutput {
            meta: self.meta,
            voices: self
                .voices
                .into_iter()
                .map(|voice| VoiceSymbols {
                    id: voice.id,
                    name: voice.name,
                    symbols: voice.symbols,
                })
                .collect(),
            warnings: self.warnings,
        }
    }

    /// The build state of the current voice, created on demand as voice 1.
    fn voice(&mut self) -> &mut VoiceBuild {
        if self.voices.is_empty() {
            self.voices.push(VoiceBuild {
                id: 1,
                name: "1".to_owned(),
                ..VoiceBuild::default()
            });
            self.current = 0;
        }
        &mut self.voices[self.current]
    }

    fn switch_voice(&mut self, id: usize, name: Option<String>) {
        if let Some(at) = self.voices.iter().position(|v| v.id == id) {
            self.current = at;
            if let Some(name) = name {
                self.voices[at].name = name;
            }
            return;
        }
        self.voices.push(VoiceBuild {
            id,
            name: name.unwrap_or_else(|| id.to_string()),
            ..VoiceBuild::default()
        });
        self.current = self.voices.len() - 1;
    }

    /// Consumes one header line (`X:`, `M:`, `K:` …) if one starts here.
    fn try_header_line(&mut self) -> bool {
        let Some(letter) = self.cursor.peek() else {
            return false;
        };
        if letter == '%' {
            self.cursor.rest_of_line();
            self.cursor.next_char();
            return true;
        }
        if !letter.is_ascii_alphabetic() || self.cursor.peek_at(1) != Some(':') {
            return false;
        }
        let start = self.cursor.index();
        self.cursor.next_char();
        self.cursor.next_char();
        let rest = self.cursor.rest_of_line();
        let rest = rest.trim().to_owned();
        self.cursor.next_char();
        match letter {
            'X' => self.meta.index = rest.parse().ok(),
            'T' => {
                if self.meta.title.is_none() {
                    self.meta.title = Some(rest);
                }
            }
            'C' => self.meta.composer = Some(rest),
            'M' => self.header_meter(&rest, start),
            'L' => self.header_unit_len(&rest, start),
            'K' => self.header_key(&rest, start),
            'Q' => {
                self.meta.tempo = Some(rest.clone());
                self.push_symbol(start, Symbol::Tempo { text: rest });
            }
            'V' => self.header_voice(&rest, start),
            'P' => {
                let label = rest;
                self.push_symbol(start, Symbol::Part { label });
            }
            'W' | 'w' => {}
            _ => {
                // Unknown field lines pass without a symbol.
            }
        }
        true
    }

    fn header_meter(&mut self, text: &str, start: usize) {
        let parsed = text.split_once('/').and_then(|(num, den)| {
            Some((num.trim().parse::<u32>().ok()?, den.trim().parse::<u32>().ok()?))
        });
        let Some((num, den)) = parsed.filter(|&(num, den)| num > 0 && den > 0) else {
            self.warn_malformed("M:", start);
            return;
        };
        self.meta.meter = (num, den);
        self.w_measure = PARSER_WHOLE * num / den;
        if !self.explicit_unit_len {
            // ABC default unit length: 1/8 for meters of 3/4 and up,
            // 1/16 below.
            self.unit_len = if num * 4 >= den * 3 {
                PARSER_WHOLE / 8
            } else {
                PARSER_WHOLE / 16
            };
        }
        self.push_symbol(start, Symbol::Meter { num, den });
    }

    fn header_unit_len(&mut self, text: &str, start: usize) {
        let parsed = text.split_once('/').and_then(|(num, den)| {
            Some((num.trim().parse::<u32>().ok()?, den.trim().parse::<u32>().ok()?))
        });
        let Some((num, den)) = parsed.filter(|&(num, den)| num > 0 && den > 0) else {
            self.warn_malformed("L:", start);
            return;
        };
        self.unit_len = PARSER_WHOLE * num / den;
        self.explicit_unit_len = true;
    }

    fn header_key(&mut self, text: &str, start: usize) {
        let name = text.split_whitespace().next().unwrap_or("C").to_owned();
        match key_accidentals(&name) {
            Some(map) => self.key_map = map,
            None => self.warn_malformed("K:", start),
        }
        self.meta.key = name.clone();
        self.push_symbol(start, Symbol::Key { name });
    }

    fn header_voice(&mut self, text: &str, start: usize) {
        let mut parts = text.split_whitespace();
        let Some(id) = parts.next().and_then(|id| id.parse::<usize>().ok()) else {
            self.warn_malformed("V:", start);
            return;
        };
        let name = parts
            .find_map(|attr| attr.strip_prefix("name="))
            .map(|name| name.trim_matches('"').to_owned());
        self.switch_voice(id, name);
    }

    fn warn_malformed(&mut self, what: &'static str, index: usize) {
        self.warnings.push(AbcWarning::MalformedHeader {
            field: what.into(),
            position: crate::harp::origin::TextPosition::of_char_index(self.source, index),
            index,
        });
    }

    fn push_symbol(&mut self, start: usize, symbol: Symbol) {
        let end = self.cursor.index();
        let origin = Origin::new(self.source, start, end);
        let time = self.voice().time;
        self.voice().symbols.push(TimedSymbol { time, origin, symbol });
    }

    /// One step of body scanning.
    fn body_step(&mut self) {
        let Some(ch) = self.cursor.peek() else {
            return;
        };
        match ch {
            ' ' | '\t' | '\n' | '\r' | '\\' => {
                self.cursor.next_char();
            }
            '"' => self.scan_annotation(),
            '!' => self.scan_decoration(),
            '(' => self.scan_open_paren(),
            ')' => {
                self.cursor.next_char();
                self.close_slur();
            }
            '-' => {
                self.cursor.next_char();
                self.tie_previous();
            }
            ':' | '|' => self.scan_bar(),
            '[' => self.scan_open_bracket(),
            'z' | 'x' | 'Z' => self.scan_rest(),
            '^' | '=' | '_' => self.scan_note(),
            'A'..='G' | 'a'..='g' => self.scan_note(),
            other => {
                let index = self.cursor.index();
                self.warnings.push(AbcWarning::UnexpectedChar {
                    found: other,
                    position: self.cursor.position(),
                    index,
                });
                self.cursor.next_char();
            }
        }
    }

    fn scan_annotation(&mut self) {
        let index = self.cursor.index();
        self.cursor.next_char();
        let text = self.cursor.take_while(|c| c != '"' && c != '\n');
        if !self.cursor.eat('"') {
            self.warnings.push(AbcWarning::Unterminated {
                what: "chord annotation".into(),
                position: self.cursor.position(),
                index,
            });
            return;
        }
        self.voice().pending_annotations.push(text);
    }

    fn scan_decoration(&mut self) {
        let index = self.cursor.index();
        self.cursor.next_char();
        let name = self.cursor.take_while(|c| c != '!' && c != '\n');
        if !self.cursor.eat('!') {
            self.warnings.push(AbcWarning::Unterminated {
                what: "decoration".into(),
                position: self.cursor.position(),
                index,
            });
            return;
        }
        self.voice().pending_decorations.push(name);
    }

    /// `(` either opens a slur or, followed by a digit, a tuplet group.
    fn scan_open_paren(&mut self) {
        self.cursor.next_char();
        if !self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.voice().pending_slurs += 1;
            return;
        }
        let p: u32 = self
            .cursor
            .take_while(|c| c.is_ascii_digit())
            .parse()
            .unwrap_or(3);
        let mut q = match p {
            2 | 4 | 8 => 3,
            _ => 2,
        };
        let mut r = p;
        if self.cursor.eat(':') {
            let given = self.cursor.take_while(|c| c.is_ascii_digit());
            if let Ok(value) = given.parse() {
                q = value;
            }
            if self.cursor.eat(':') {
                let given = self.cursor.take_while(|c| c.is_ascii_digit());
                if let Ok(value) = given.parse() {
                    r = value;
                }
            }
        }
        self.voice().tuplet = Some(TupletRun {
            p,
            q,
            total: r,
            remaining: r,
        });
    }

    fn close_slur(&mut self) {
        let voice = self.voice();
        let Some(last) = voice.last_note else {
            return;
        };
        if let Symbol::Note { slur_end, .. } = &mut voice.symbols[last].symbol {
            *slur_end += 1;
        }
    }

    fn tie_previous(&mut self) {
        let voice = self.voice();
        let Some(last) = voice.last_note else {
            return;
        };
        if let Symbol::Note { heads, .. } = &mut voice.symbols[last].symbol {
            for head in heads {
                head.tie_start = true;
            }
        }
    }

    /// `[` disambiguation: `[1` opens a volta, `[M:…]` is an inline field,
    /// anything else starts a chord.
    fn scan_open_bracket(&mut self) {
        match (self.cursor.peek_at(1), self.cursor.peek_at(2)) {
            (Some(d), _) if d.is_ascii_digit() => self.scan_bar(),
            (Some(letter), Some(':')) if letter.is_ascii_uppercase() => {
                // Inline fields are consumed without effect; only `[M:…]`
                // adjusts the running meter.
                let start = self.cursor.index();
                self.cursor.next_char();
                self.cursor.next_char();
                self.cursor.next_char();
                let body = self.cursor.take_while(|c| c != ']' && c != '\n');
                self.cursor.eat(']');
                if letter == 'M' {
                    self.header_meter(body.trim(), start);
                }
            }
            _ => self.scan_chord(),
        }
    }

    /// Scans a bar token: colons, pipes, brackets, and an optional volta
    /// label.
    fn scan_bar(&mut self) {
        let start = self.cursor.index();
        let mut glyph = String::new();
        while let Some(ch) = self.cursor.peek() {
            if ch == ':' || ch == '|' || ch == ']' {
                glyph.push(ch);
                self.cursor.next_char();
            } else if ch == '[' && self.cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                glyph.push(ch);
                self.cursor.next_char();
                break;
            } else {
                break;
            }
        }
        self.cursor.skip_spaces();
        let label = {
            let digits = self.cursor.take_while(|c| c.is_ascii_digit() || c == '-' || c == ',');
            if digits.is_empty() { None } else { Some(digits) }
        };
        let bar_type = glyph.replace('[', "");
        let rbstart = u8::from(label.is_some()) * 2;
        let closes = {
            let voice = self.voice();
            let closes = voice.in_volta;
            voice.in_volta = label.is_some();
            closes
        };
        let annotations = std::mem::take(&mut self.voice().pending_annotations);
        // A new measure clears the running accidentals.
        if bar_type.contains('|') || bar_type == "::" {
            self.voice().measure_accidentals.clear();
        }
        self.push_symbol(
            start,
            Symbol::Bar {
                bar_type,
                rbstart,
                rbstop: u8::from(closes) * 2,
                label,
                annotations,
            },
        );
    }

    fn scan_rest(&mut self) {
        let start = self.cursor.index();
        let kind = self.cursor.next_char().expect("peeked before");
        let duration = if kind == 'Z' {
            let count: u32 = self
                .cursor
                .take_while(|c| c.is_ascii_digit())
                .parse()
                .unwrap_or(1);
            count * self.w_measure
        } else {
            self.scan_length()
        };
        let duration = self.apply_tuplet_plain(duration);
        let annotations = std::mem::take(&mut self.voice().pending_annotations);
        self.push_symbol(
            start,
            Symbol::Rest {
                duration,
                visible: kind != 'x',
                annotations,
            },
        );
        self.voice().time += duration;
    }

    /// Parses the duration suffix (`2`, `3/2`, `/`, `//`, `/4`) applied to
    /// the unit note length.
    fn scan_length(&mut self) -> u32 {
        let mut numerator: u64 = 1;
        let mut denominator: u64 = 1;
        let digits = self.cursor.take_while(|c| c.is_ascii_digit());
        if let Ok(value) = digits.parse::<u64>() {
            numerator = value.max(1);
        }
        while self.cursor.eat('/') {
            let digits = self.cursor.take_while(|c| c.is_ascii_digit());
            match digits.parse::<u64>() {
                Ok(value) if value > 0 => denominator *= value,
                _ => denominator *= 2,
            }
        }
        ((u64::from(self.unit_len) * numerator / denominator) as u32).max(1)
    }

    /// Scales a duration by the open tuplet group and advances the group.
    /// Returns the scaled duration together with the group marker.
    fn apply_tuplet(&mut self, duration: u32) -> (u32, Option<TupletMark>) {
        let Some(run) = self.voice().tuplet else {
            return (duration, None);
        };
        let scaled = (u64::from(duration) * u64::from(run.q) / u64::from(run.p)) as u32;
        let mark = TupletMark {
            p: run.p,
            q: run.q,
            start: run.remaining == run.total,
            end: run.remaining == 1,
        };
        self.voice().tuplet = (run.remaining > 1).then_some(TupletRun {
            remaining: run.remaining - 1,
            ..run
        });
        (scaled.max(1), Some(mark))
    }

    /// Tuplet scaling for rests, which never carry the marker.
    fn apply_tuplet_plain(&mut self, duration: u32) -> u32 {
        let (scaled, _) = self.apply_tuplet(duration);
        scaled
    }

    /// Scans one note head: accidental, letter, octave marks.
    fn scan_head(&mut self) -> Option<NoteHead> {
        let explicit: Option<i8> = match self.cursor.peek() {
            Some('^') => {
                self.cursor.next_char();
                Some(if self.cursor.eat('^') { 2 } else { 1 })
            }
            Some('_') => {
                self.cursor.next_char();
                Some(if self.cursor.eat('_') { -2 } else { -1 })
            }
            Some('=') => {
                self.cursor.next_char();
                Some(0)
            }
            _ => None,
        };
        let letter = self.cursor.peek()?;
        if !letter.is_ascii_alphabetic() || !matches!(letter.to_ascii_uppercase(), 'A'..='G') {
            return None;
        }
        self.cursor.next_char();
        let mut octave: i8 = i8::from(letter.is_ascii_lowercase());
        loop {
            if self.cursor.eat('\'') {
                octave += 1;
            } else if self.cursor.eat(',') {
                octave -= 1;
            } else {
                break;
            }
        }
        let upper = letter.to_ascii_uppercase();
        let key_default = self.key_map.get(&upper).copied().unwrap_or(0);
        let accidental = match explicit {
            Some(given) => {
                self.voice()
                    .measure_accidentals
                    .insert((upper, octave), given);
                given
            }
            None => self
                .voice()
                .measure_accidentals
                .get(&(upper, octave))
                .copied()
                .unwrap_or(key_default),
        };
        // C4 = 60; the uppercase octave.
        const LETTER_SEMITONES: [i16; 7] = [9, 11, 0, 2, 4, 5, 7]; // A B C D E F G
        let semis = LETTER_SEMITONES[(upper as u8 - b'A') as usize];
        let pitch = 60 + i16::from(octave) * 12 + semis + i16::from(accidental);
        Some(NoteHead {
            pitch: pitch.clamp(0, 127) as u8,
            tie_start: self.cursor.eat('-'),
        })
    }

    fn scan_note(&mut self) {
        let start = self.cursor.index();
        let Some(head) = self.scan_head() else {
            let index = self.cursor.index();
            self.warnings.push(AbcWarning::UnexpectedChar {
                found: self.cursor.peek().unwrap_or(' '),
                position: self.cursor.position(),
                index,
            });
            self.cursor.next_char();
            return;
        };
        let duration = self.scan_length();
        self.finish_note(start, vec![head], duration);
    }

    fn scan_chord(&mut self) {
        let start = self.cursor.index();
        self.cursor.next_char();
        let mut heads = Vec::new();
        loop {
            self.cursor.skip_spaces();
            if self.cursor.eat(']') {
                break;
            }
            match self.scan_head() {
                Some(mut head) => {
                    // A per-head length inside a chord is accepted but the
                    // chord duration comes from the closing suffix.
                    self.scan_length();
                    head.tie_start |= self.cursor.eat('-');
                    heads.push(head);
                }
                None => {
                    let index = self.cursor.index();
                    self.warnings.push(AbcWarning::Unterminated {
                        what: "chord".into(),
                        position: self.cursor.position(),
                        index,
                    });
                    break;
                }
            }
        }
        let duration = self.scan_length();
        if heads.is_empty() {
            return;
        }
        self.finish_note(start, heads, duration);
    }

    fn finish_note(&mut self, start: usize, mut heads: Vec<NoteHead>, duration: u32) {
        let (duration, tuplet) = self.apply_tuplet(duration);
        // A trailing tie after the symbol ties every head.
        if self.cursor.eat('-') {
            for head in &mut heads {
                head.tie_start = true;
            }
        }
        let voice = self.voice();
        let slur_count = std::mem::take(&mut voice.pending_slurs);
        let mut slur_start = 0u32;
        for _ in 0..slur_count {
            slur_start = (slur_start << 4) | 1;
        }
        let decorations = std::mem::take(&mut voice.pending_decorations);
        let annotations = std::mem::take(&mut voice.pending_annotations);
        self.push_symbol(
            start,
            Symbol::Note {
                heads,
                duration,
                slur_start,
                slur_end: 0,
                tuplet,
                decorations,
                annotations,
            },
        );
        let voice = self.voice();
        voice.last_note = Some(voice.symbols.len() - 1);
        voice.time += duration;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn notes_of(output: &AbcOutput) -> Vec<(u32, Vec<u8>, u32)> {
        output.voices[0]
            .symbols
            .iter()
            .filter_map(|ts| match &ts.symbol {
                Symbol::Note { heads, duration, .. } => {
                    Some((ts.time, heads.iter().map(|h| h.pitch).collect(), *duration))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn four_notes_and_a_bar() {
        let output = parse("X:1\nM:4/4\nK:C\nCDEF|\n");
        assert_eq!(output.warnings, vec![]);
        assert_eq!(
            notes_of(&output),
            vec![
                (0, vec![60], 192),
                (192, vec![62], 192),
                (384, vec![64], 192),
                (576, vec![65], 192),
            ]
        );
        assert!(output.voices[0]
            .symbols
            .iter()
            .any(|ts| matches!(&ts.symbol, Symbol::Bar { bar_type, .. } if bar_type == "|")));
    }

    #[test]
    fn unit_length_and_multipliers() {
        let output = parse("X:1\nM:4/4\nL:1/4\nK:C\nC2 D/ E3/2|\n");
        assert_eq!(output.warnings, vec![]);
        let durations: Vec<u32> = notes_of(&output).iter().map(|n| n.2).collect();
        assert_eq!(durations, vec![768, 192, 576]);
    }

    #[test]
    fn chord_collects_heads() {
        let output = parse("X:1\nM:4/4\nK:C\n[CEG]2|\n");
        assert_eq!(output.warnings, vec![]);
        assert_eq!(notes_of(&output), vec![(0, vec![60, 64, 67], 384)]);
    }

    #[test]
    fn tie_marks_both_forms() {
        let output = parse("X:1\nM:4/4\nK:C\nC-C [ce]-[ce]|\n");
        assert_eq!(output.warnings, vec![]);
        let tied: Vec<bool> = output.voices[0]
            .symbols
            .iter()
            .filter_map(|ts| match &ts.symbol {
                Symbol::Note { heads, .. } => Some(heads.iter().all(|h| h.tie_start)),
                _ => None,
            })
            .collect();
        assert_eq!(tied, vec![true, false, true, false]);
    }

    #[test]
    fn volta_brackets_open_and_close() {
        let output = parse("X:1\nM:4/4\nK:C\n|:CD|1 EF:|2 GA|\n");
        assert_eq!(output.warnings, vec![]);
        let bars: Vec<(String, u8, u8, Option<String>)> = output.voices[0]
            .symbols
            .iter()
            .filter_map(|ts| match &ts.symbol {
                Symbol::Bar { bar_type, rbstart, rbstop, label, .. } => {
                    Some((bar_type.clone(), *rbstart, *rbstop, label.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            bars,
            vec![
                ("|:".to_owned(), 0, 0, None),
                ("|".to_owned(), 2, 0, Some("1".to_owned())),
                (":|".to_owned(), 2, 2, Some("2".to_owned())),
                ("|".to_owned(), 0, 2, None),
            ]
        );
    }

    #[test]
    fn triplet_scales_durations() {
        let output = parse("X:1\nM:4/4\nK:C\n(3CDE F|\n");
        assert_eq!(output.warnings, vec![]);
        let notes = notes_of(&output);
        assert_eq!(notes[0].2, 128);
        assert_eq!(notes[1].0, 128);
        assert_eq!(notes[3].0, 384);
    }

    #[test]
    fn key_signature_applies_and_accidentals_persist() {
        let output = parse("X:1\nM:4/4\nK:G\nF =F F|F|\n");
        assert_eq!(output.warnings, vec![]);
        let pitches: Vec<u8> = notes_of(&output).iter().map(|n| n.1[0]).collect();
        // Key of G sharpens F; the natural holds to the end of the measure.
        assert_eq!(pitches, vec![66, 65, 65, 66]);
    }

    #[test]
    fn voices_split_on_v_lines() {
        let output = parse("X:1\nM:4/4\nK:C\nV:1\nCDEF|\nV:2\nGABc|\n");
        assert_eq!(output.warnings, vec![]);
        assert_eq!(output.voices.len(), 2);
        assert_eq!(output.voices[0].id, 1);
        assert_eq!(output.voices[1].id, 2);
        assert_eq!(output.voices[1].symbols.len(), 5);
    }
}
