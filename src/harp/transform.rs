//! From symbol streams to the harpnote music model.
//!
//! One [`VoiceTransformer`] walks each voice's symbol chain linearly,
//! carrying the repeat stack, pending next-note marks, tie and slur state,
//! and the variant-ending groups. Unexpected symbol shapes produce warnings
//! and are skipped; the walk never aborts.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::config::{ConfigError, ConfigStack, Value};
use crate::harp::abc::parser::TuneMeta;
use crate::harp::abc::symbol::{
    NoteHead, PARSER_WHOLE, Symbol, TimedSymbol, VoiceSymbols, slur_start_count,
};
use crate::harp::music::{
    Anchor, EntityIndex, Goto, JumpPolicy, MeasureStart, MusicEntity, NewPart, Note,
    NoteBoundAnnotation, Pause, Playable, PlayableCore, Shift, Song, SynchPoint, VerticalAnchor,
    source_checksum,
};
use crate::harp::origin::{Origin, TextPosition};

/// A warning raised while building the music model.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformWarning {
    /// A symbol could not be interpreted in its context and was skipped.
    #[error("unexpected symbol at {position}: {message}")]
    UnexpectedSymbol {
        /// What was wrong.
        message: String,
        /// Where the symbol sits.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
    /// A tuplet produced an onset between beats; the beat was rounded down.
    #[error("tuplet produces a non-integer beat at {position}, rounding down")]
    FractionalBeat {
        /// Where the playable sits.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
    /// A `#name` annotation referenced a template that is not configured.
    #[error("unknown annotation template `{name}` at {position}")]
    UnknownTemplate {
        /// The template name.
        name: String,
        /// Where the annotation sits.
        position: TextPosition,
        /// Char index into the source.
        index: usize,
    },
    /// A `@label@…` annotation never found its `:label` target.
    #[error("jump target `{label}` not found in voice {voice}")]
    UnresolvedJumpTarget {
        /// The missing target label.
        label: String,
        /// The voice searched.
        voice: usize,
    },
}

/// Transform output: the song plus accumulated warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    /// The transformed song.
    pub song: Song,
    /// Warnings raised during the walk.
    pub warnings: Vec<TransformWarning>,
}

/// Where a rest takes its display pitch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestPosition {
    Center,
    Previous,
    Next,
}

impl RestPosition {
    fn from_conf(name: Option<&str>) -> Self {
        match name {
            Some("previous") => Self::Previous,
            Some("next") => Self::Next,
            _ => Self::Center,
        }
    }
}

/// The configuration snapshot the transformer works from.
struct TransformConf {
    shortest_note: u32,
    rest_default: RestPosition,
    rest_repeatend: RestPosition,
    partname_pos: (f64, f64),
    variantend_pos: (f64, f64),
    annotation_pos: (f64, f64),
    /// Named annotation templates: name to (text, pos).
    templates: HashMap<String, (String, (f64, f64))>,
}

impl TransformConf {
    fn from_stack(conf: &ConfigStack) -> Result<Self, ConfigError> {
        let pos_of = |value: Option<Value>, fallback: (f64, f64)| {
            value
                .as_ref()
                .and_then(|v| v.at("pos"))
                .and_then(Value::as_pair)
                .unwrap_or(fallback)
        };
        let mut templates = HashMap::new();
        if let Some(Value::Table(entries)) = conf.get("annotations")? {
            for (name, entry) in &entries {
                let text = entry
                    .at("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let pos = entry.at("pos").and_then(Value::as_pair).unwrap_or((5.0, -7.0));
                templates.insert(name.clone(), (text, pos));
            }
        }
        Ok(Self {
            shortest_note: conf
                .get("shortest_note")?
                .and_then(|v| v.as_i64())
                .map_or(64, |v| v.clamp(1, 1024) as u32),
            rest_default: RestPosition::from_conf(
                conf.get("restposition.default")?
                    .as_ref()
                    .and_then(Value::as_str),
            ),
            rest_repeatend: RestPosition::from_conf(
                conf.get("restposition.repeatend")?
                    .as_ref()
                    .and_then(Value::as_str),
            ),
            partname_pos: pos_of(conf.get("defaults.notebound.partname")?, (-4.0, -7.0)),
            variantend_pos: pos_of(conf.get("defaults.notebound.variantend")?, (-4.0, -7.0)),
            annotation_pos: pos_of(conf.get("defaults.notebound.annotation")?, (5.0, -7.0)),
            templates,
        })
    }
}

/// Builds the music model from captured symbol streams.
///
/// # Errors
///
/// Only configuration failures (a deferred-value cycle) abort; everything
/// else degrades to warnings.
pub fn transform(
    source: &str,
    voices: &[VoiceSymbols],
    meta: &TuneMeta,
    conf: &ConfigStack,
) -> Result<TransformOutput, ConfigError> {
    let tconf = TransformConf::from_stack(conf)?;
    let mut warnings = Vec::new();
    let transformed = voices
        .iter()
        .map(|voice| VoiceTransformer::new(source, voice, meta, &tconf).run(&mut warnings))
        .collect();
    let song = Song::new(transformed, meta.clone(), source_checksum(source));
    Ok(TransformOutput { song, warnings })
}

/// One entry of a variant-ending group.
///
/// Entry 0 of a group is the common segment and only carries `rbstop` (the
/// playable before the first bracket); later entries are the brackets
/// themselves.
#[derive(Debug, Clone, Default)]
struct VariantEntry {
    rbstart: Option<EntityIndex>,
    rbstop: Option<EntityIndex>,
    distance: Option<Vec<i32>>,
    repeat_end: bool,
    is_followup: bool,
}

struct VoiceTransformer<'a> {
    source: &'a str,
    input: &'a VoiceSymbols,
    conf: &'a TransformConf,
    voice: crate::harp::music::Voice,

    // The per-voice state table, reset for every voice.
    measure_count: u32,
    measure_start_time: i64,
    repetition_stack: Vec<EntityIndex>,
    next_measure: bool,
    next_repeat_start: bool,
    next_variant_ending: Option<String>,
    next_variant_followup: bool,
    previous: Option<EntityIndex>,
    variant_endings: Vec<Vec<VariantEntry>>,
    variant_no: u32,
    tie_started: bool,
    slur_stack: Vec<usize>,
    next_slur_id: usize,
    /// Count-beat grouping from the meter denominator.
    count_by: u32,
    part_table: BTreeMap<i64, String>,

    first_playable: Option<EntityIndex>,
    jump_targets: HashMap<String, EntityIndex>,
    unresolved_gotos: Vec<(EntityIndex, String, Vec<i32>)>,
    repeatend_pauses: Vec<EntityIndex>,
    /// Distance triple given on a volta-opening bar, applied to the next
    /// variant entry.
    pending_variant_distance: Option<Vec<i32>>,
}

impl<'a> VoiceTransformer<'a> {
    fn new(
        source: &'a str,
        input: &'a VoiceSymbols,
        meta: &TuneMeta,
        conf: &'a TransformConf,
    ) -> Self {
        let (_, den) = meta.meter;
        Self {
            source,
            input,
            conf,
            voice: crate::harp::music::Voice::new(input.id, input.name.clone()),
            measure_count: 0,
            measure_start_time: 0,
            repetition_stack: Vec::new(),
            // The voice opening starts measure 1.
            next_measure: true,
            next_repeat_start: false,
            next_variant_ending: None,
            next_variant_followup: false,
            previous: None,
            variant_endings: vec![Vec::new()],
            variant_no: 0,
            tie_started: false,
            slur_stack: Vec::new(),
            next_slur_id: 0,
            count_by: den,
            part_table: BTreeMap::new(),
            first_playable: None,
            jump_targets: HashMap::new(),
            unresolved_gotos: Vec::new(),
            repeatend_pauses: Vec::new(),
            pending_variant_distance: None,
        }
    }

    fn run(mut self, warnings: &mut Vec<TransformWarning>) -> crate::harp::music::Voice {
        // PART symbols drive a time-indexed table, looked up when the
        // playable at that time arrives.
        for ts in &self.input.symbols {
            if let Symbol::Part { label } = &ts.symbol {
                self.part_table
                    .insert(i64::from(ts.time), label.clone());
            }
        }
        let symbols = self.input.symbols.clone();
        for ts in &symbols {
            self.step(ts, warnings);
        }
        self.finish(warnings);
        self.voice
    }

    fn position_of(&self, origin: &Origin) -> TextPosition {
        TextPosition::of_char_index(self.source, origin.start)
    }

    fn step(&mut self, ts: &TimedSymbol, warnings: &mut Vec<TransformWarning>) {
        match &ts.symbol {
            Symbol::Note {
                heads,
                duration,
                slur_start,
                slur_end,
                tuplet,
                decorations,
                annotations,
            } => {
                if heads.is_empty() {
                    warnings.push(TransformWarning::UnexpectedSymbol {
                        message: "note without heads".to_owned(),
                        position: self.position_of(&ts.origin),
                        index: ts.origin.start,
                    });
                    return;
                }
                self.handle_note(
                    ts,
                    heads,
                    *duration,
                    *slur_start,
                    *slur_end,
                    tuplet.as_ref().copied(),
                    decorations,
                    annotations,
                    warnings,
                );
            }
            Symbol::Rest {
                duration,
                visible,
                annotations,
            } => self.handle_rest(ts, *duration, *visible, annotations, warnings),
            Symbol::Bar {
                bar_type,
                rbstart,
                rbstop,
                label,
                annotations,
            } => self.handle_bar(bar_type, *rbstart, *rbstop, label.as_deref(), annotations),
            Symbol::Meter { den, .. } => {
                self.count_by = *den;
            }
            // Side-effect-only and pass-through symbols.
            Symbol::Part { .. } | Symbol::Key { .. } | Symbol::Tempo { .. } | Symbol::Staves => {}
        }
    }

    /// Normalizes a backend duration onto the shortest-note grid.
    fn normalize_duration(&self, raw: u32) -> u32 {
        let scaled = (f64::from(raw) / f64::from(PARSER_WHOLE) * f64::from(self.conf.shortest_note))
            .round() as i64;
        scaled.clamp(1, 128) as u32
    }

    /// The beat-count label of a playable, when it sits on a count position.
    fn count_label(&self, time: i64) -> Option<String> {
        let unit = i64::from(PARSER_WHOLE) / i64::from(self.count_by);
        let offset = time - self.measure_start_time;
        (unit > 0 && offset % unit == 0).then(|| (offset / unit + 1).to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_note(
        &mut self,
        ts: &TimedSymbol,
        heads: &[NoteHead],
        raw_duration: u32,
        slur_start: u32,
        slur_end: u8,
        tuplet: Option<crate::harp::abc::symbol::TupletMark>,
        decorations: &[String],
        annotations: &[String],
        warnings: &mut Vec<TransformWarning>,
    ) {
        let time = i64::from(ts.time);
        let duration = self.normalize_duration(raw_duration);
        let znid = ts.origin.znid(time);

        let mut slur_starts = Vec::new();
        for _ in 0..slur_start_count(slur_start) {
            let id = self.next_slur_id;
            self.next_slur_id += 1;
            self.slur_stack.push(id);
            slur_starts.push(id);
        }
        let mut slur_ends = Vec::new();
        for _ in 0..slur_end {
            if let Some(id) = self.slur_stack.pop() {
                slur_ends.push(id);
            }
        }

        let make_note = |head: &NoteHead| Note {
            core: PlayableCore {
                time,
                origin: ts.origin.clone(),
                znid: znid.clone(),
                visible: true,
                duration,
                count_note: self.count_label(time),
                ..PlayableCore::default()
            },
            pitch: head.pitch,
            tie_start: head.tie_start,
            tie_end: self.tie_started,
            slur_starts: slur_starts.clone(),
            slur_ends: slur_ends.clone(),
            tuplet: tuplet.map(|m| m.p),
            tuplet_start: tuplet.is_some_and(|m| m.start),
            tuplet_end: tuplet.is_some_and(|m| m.end),
            decorations: decorations.to_vec(),
        };

        let entity = if heads.len() == 1 {
            MusicEntity::Note(make_note(&heads[0]))
        } else {
            MusicEntity::SynchPoint(SynchPoint {
                notes: heads.iter().map(make_note).collect(),
            })
        };
        self.tie_started = heads.iter().any(|head| head.tie_start);
        let index = self.voice.push(entity);
        self.link_and_annotate(index, annotations, &ts.origin, warnings);
    }

    fn handle_rest(
        &mut self,
        ts: &TimedSymbol,
        raw_duration: u32,
        visible: bool,
        annotations: &[String],
        warnings: &mut Vec<TransformWarning>,
    ) {
        let time = i64::from(ts.time);
        let pause = Pause {
            core: PlayableCore {
                time,
                origin: ts.origin.clone(),
                znid: ts.origin.znid(time),
                visible,
                duration: self.normalize_duration(raw_duration),
                count_note: self.count_label(time),
                ..PlayableCore::default()
            },
            // Filled by the rest-position pass once the neighbors are linked.
            pitch: 0,
        };
        let index = self.voice.push(MusicEntity::Pause(pause));
        self.link_and_annotate(index, annotations, &ts.origin, warnings);
    }

    fn handle_bar(
        &mut self,
        bar_type: &str,
        rbstart: u8,
        rbstop: u8,
        label: Option<&str>,
        annotations: &[String],
    ) {
        let repeat_start = bar_type.ends_with(':');
        let repeat_end = bar_type.starts_with(':');
        let distances = annotations.iter().find_map(|a| parse_goto_distance(a, "@@"));

        if bar_type.contains('|') || bar_type == "::" {
            self.next_measure = true;
        }

        if rbstop == 2 {
            let group = self
                .variant_endings
                .last_mut()
                .expect("a variant group is always open");
            if let Some(entry) = group.iter_mut().rev().find(|e| !e.is_followup) {
                entry.rbstop = self.previous;
                if repeat_end {
                    entry.repeat_end = true;
                    if let Some(&top) = self.repetition_stack.last() {
                        self.repetition_stack.push(top);
                    }
                }
            }
            if rbstart != 2 {
                // The bracket run is over; whatever follows is the common
                // continuation of the group.
                self.next_variant_followup = true;
                self.variant_endings.push(Vec::new());
                self.variant_no = 0;
            }
        }

        if repeat_end {
            self.emit_repeat_goto(distances.clone());
            if self.conf.rest_repeatend == RestPosition::Previous
                && let Some(previous) = self.previous
                && matches!(self.voice.entity(previous), Some(MusicEntity::Pause(_)))
            {
                self.repeatend_pauses.push(previous);
            }
        }

        if rbstart == 2 {
            self.variant_no += 1;
            self.next_variant_ending =
                Some(label.map_or_else(|| self.variant_no.to_string(), str::to_owned));
            self.pending_variant_distance = distances;
        }

        if repeat_start {
            self.next_repeat_start = true;
        }
    }

    /// Emits the Goto of a `:|` bar: from the previous playable back to the
    /// current repeat target.
    fn emit_repeat_goto(&mut self, distances: Option<Vec<i32>>) {
        let Some(from) = self.previous else {
            return;
        };
        let to = if self.repetition_stack.len() > 1 {
            self.repetition_stack.pop().expect("checked length above")
        } else {
            self.repetition_stack
                .last()
                .copied()
                .or(self.first_playable)
                .unwrap_or(from)
        };
        let distance = distances.and_then(|d| d.first().copied()).unwrap_or(2);
        let conf_key = self.goto_conf_key(from);
        self.voice.push(MusicEntity::Goto(Goto {
            from,
            to,
            policy: JumpPolicy {
                is_repeat: true,
                level: Some(self.repetition_stack.len() as u32),
                distance,
                conf_key: Some(conf_key),
                ..JumpPolicy::default()
            },
        }));
    }

    fn goto_conf_key(&self, from: EntityIndex) -> String {
        let znid = self
            .voice
            .playable(from)
            .map(|p| p.core().znid.clone())
            .unwrap_or_default();
        format!("gotos.v_{}.{}", self.voice.index, znid)
    }

    /// Applies a closure to every playable core of the entity: the single
    /// core of a note or rest, all constituents of a chord.
    fn with_cores(&mut self, index: EntityIndex, f: impl Fn(&mut PlayableCore)) {
        match self.voice.entity_mut(index) {
            Some(MusicEntity::Note(note)) => f(&mut note.core),
            Some(MusicEntity::Pause(pause)) => f(&mut pause.core),
            Some(MusicEntity::SynchPoint(synch)) => {
                for note in &mut synch.notes {
                    f(&mut note.core);
                }
            }
            _ => {}
        }
    }

    fn link_and_annotate(
        &mut self,
        index: EntityIndex,
        annotations: &[String],
        origin: &Origin,
        warnings: &mut Vec<TransformWarning>,
    ) {
        if self.first_playable.is_none() {
            self.first_playable = Some(index);
        }
        let (time, znid, pitch) = {
            let playable = self.voice.playable(index).expect("just pushed a playable");
            (
                playable.core().time,
                playable.core().znid.clone(),
                playable.pitch(),
            )
        };

        // 1. Bidirectional linking with the predecessor.
        if let Some(previous) = self.previous {
            let prev_pitch = self.voice.playable(previous).map(Playable::pitch);
            self.with_cores(index, |core| {
                core.prev_playable = Some(previous);
                core.prev_pitch = prev_pitch;
            });
            self.with_cores(previous, |core| {
                core.next_playable = Some(index);
                core.next_pitch = Some(pitch);
            });
        }

        // 2. Part boundaries from the part table.
        if let Some(part) = self.part_table.get(&time).cloned() {
            self.with_cores(index, |core| core.first_in_part = true);
            self.voice.push(MusicEntity::NewPart(NewPart {
                name: part.clone(),
                companion: index,
            }));
            let conf_key = format!("notebound.partname.v_{}.{}", self.voice.index, znid);
            self.voice
                .push(MusicEntity::NoteBoundAnnotation(NoteBoundAnnotation {
                    companion: index,
                    text: part,
                    style: "regular".to_owned(),
                    position: self.conf.partname_pos,
                    conf_key: Some(conf_key),
                    origin: origin.clone(),
                }));
        }

        // 3. Pending marks from the previous bar.
        if self.next_measure {
            self.next_measure = false;
            self.measure_count += 1;
            self.measure_start_time = time;
            let count = self.measure_count;
            self.with_cores(index, |core| {
                core.measure_start = true;
                core.measure_count = count;
                // The count restarts with the measure.
                core.count_note = Some("1".to_owned());
            });
            self.voice
                .push(MusicEntity::MeasureStart(MeasureStart { companion: index }));
        } else {
            let count = self.measure_count;
            self.with_cores(index, |core| core.measure_count = count);
        }
        if self.next_repeat_start {
            self.next_repeat_start = false;
            self.repetition_stack.push(index);
            self.with_cores(index, |core| core.first_in_part = true);
        }
        if let Some(text) = self.next_variant_ending.take() {
            let variant = self.variant_no;
            self.with_cores(index, |core| core.variant = Some(variant));
            let group = self
                .variant_endings
                .last_mut()
                .expect("a variant group is always open");
            if group.is_empty() {
                // First bracket of the group: the common segment ends at the
                // playable before it.
                group.push(VariantEntry {
                    rbstop: self.previous,
                    ..VariantEntry::default()
                });
            }
            group.push(VariantEntry {
                rbstart: Some(index),
                distance: self.pending_variant_distance.take(),
                ..VariantEntry::default()
            });
            let conf_key = format!("notebound.variantend.v_{}.{}", self.voice.index, znid);
            self.voice
                .push(MusicEntity::NoteBoundAnnotation(NoteBoundAnnotation {
                    companion: index,
                    text,
                    style: "regular".to_owned(),
                    position: self.conf.variantend_pos,
                    conf_key: Some(conf_key),
                    origin: origin.clone(),
                }));
        }
        if self.next_variant_followup {
            self.next_variant_followup = false;
            if let Some(group) = self.variant_endings.iter_mut().rev().nth(1) {
                group.push(VariantEntry {
                    rbstart: Some(index),
                    is_followup: true,
                    ..VariantEntry::default()
                });
            }
        }

        // 4. Chord annotations of the symbol.
        for annotation in annotations {
            self.apply_annotation(index, annotation, origin, warnings);
        }

        self.previous = Some(index);
    }

    fn apply_annotation(
        &mut self,
        index: EntityIndex,
        annotation: &str,
        origin: &Origin,
        warnings: &mut Vec<TransformWarning>,
    ) {
        let znid = self
            .voice
            .playable(index)
            .map(|p| p.core().znid.clone())
            .unwrap_or_default();
        if let Some(label) = annotation.strip_prefix(':') {
            self.jump_targets.insert(label.to_owned(), index);
            return;
        }
        if let Some(rest) = annotation.strip_prefix('@') {
            if let Some((label, distance)) = rest.split_once('@') {
                let distances = parse_distances(distance).unwrap_or_default();
                self.unresolved_gotos
                    .push((index, label.to_owned(), distances));
                return;
            }
            // A lone `@` body is a positioned text without a companion
            // semantic; treat it as an unexpected shape.
            warnings.push(TransformWarning::UnexpectedSymbol {
                message: format!("malformed goto annotation `{annotation}`"),
                position: self.position_of(origin),
                index: origin.start,
            });
            return;
        }
        let (kind, body) = match annotation.chars().next() {
            Some('#') => ('#', &annotation[1..]),
            Some('!') => ('!', &annotation[1..]),
            Some('<') => ('<', &annotation[1..]),
            Some('>') => ('>', &annotation[1..]),
            _ => return, // plain chord names pass through silently
        };
        match kind {
            '<' | '>' => {
                let shift = if kind == '<' { Shift::Left } else { Shift::Right };
                self.with_cores(index, |core| core.shift = Some(shift));
                if body.is_empty() {
                    return;
                }
            }
            '#' => {
                let Some((text, pos)) = self.conf.templates.get(body).cloned() else {
                    warnings.push(TransformWarning::UnknownTemplate {
                        name: body.to_owned(),
                        position: self.position_of(origin),
                        index: origin.start,
                    });
                    return;
                };
                self.push_notebound(index, &znid, text, pos, origin);
                return;
            }
            _ => {}
        }
        // `!text@x,y` and the shift forms: explicit position wins over the
        // configured default.
        let (text, pos) = match body.rsplit_once('@') {
            Some((text, coords)) => match parse_pair(coords) {
                Some(pos) => (text.to_owned(), pos),
                None => (body.to_owned(), self.conf.annotation_pos),
            },
            None => (body.to_owned(), self.conf.annotation_pos),
        };
        self.push_notebound(index, &znid, text, pos, origin);
    }

    fn push_notebound(
        &mut self,
        companion: EntityIndex,
        znid: &str,
        text: String,
        position: (f64, f64),
        origin: &Origin,
    ) {
        let conf_key = format!("notebound.annotation.v_{}.{}", self.voice.index, znid);
        self.voice
            .push(MusicEntity::NoteBoundAnnotation(NoteBoundAnnotation {
                companion,
                text,
                style: "regular".to_owned(),
                position,
                conf_key: Some(conf_key),
                origin: origin.clone(),
            }));
    }

    fn finish(&mut self, warnings: &mut Vec<TransformWarning>) {
        self.resolve_gotos(warnings);
        self.infer_rest_pitches();
        self.synthesize_variant_jumps();
        self.assign_beats(warnings);
    }

    fn resolve_gotos(&mut self, warnings: &mut Vec<TransformWarning>) {
        for (from, label, distances) in std::mem::take(&mut self.unresolved_gotos) {
            let Some(&to) = self.jump_targets.get(&label) else {
                warnings.push(TransformWarning::UnresolvedJumpTarget {
                    label,
                    voice: self.voice.index,
                });
                continue;
            };
            let conf_key = self.goto_conf_key(from);
            self.voice.push(MusicEntity::Goto(Goto {
                from,
                to,
                policy: JumpPolicy {
                    distance: distances.first().copied().unwrap_or(2),
                    conf_key: Some(conf_key),
                    ..JumpPolicy::default()
                },
            }));
        }
    }

    /// Fills the display pitch of every rest from its surroundings.
    fn infer_rest_pitches(&mut self) {
        let indices: Vec<EntityIndex> = self
            .voice
            .entities()
            .filter_map(|(i, e)| matches!(e, MusicEntity::Pause(_)).then_some(i))
            .collect();
        for index in indices {
            let mode = if self.repeatend_pauses.contains(&index) {
                self.conf.rest_repeatend
            } else {
                self.conf.rest_default
            };
            let Some(MusicEntity::Pause(pause)) = self.voice.entity(index) else {
                continue;
            };
            let (prev, next) = (pause.core.prev_pitch, pause.core.next_pitch);
            let pitch = match mode {
                RestPosition::Previous => prev.or(next),
                RestPosition::Next => next.or(prev),
                RestPosition::Center => match (prev, next) {
                    (Some(p), Some(n)) => Some(((u16::from(p) + u16::from(n)) / 2) as u8),
                    (one, other) => one.or(other),
                },
            }
            .unwrap_or(60);
            if let Some(MusicEntity::Pause(pause)) = self.voice.entity_mut(index) {
                pause.pitch = pitch;
            }
        }
    }

    /// Emits the Gotos of the collected variant-ending groups.
    fn synthesize_variant_jumps(&mut self) {
        const DEFAULT_DISTANCES: [i32; 3] = [-10, 10, 15];
        let groups = std::mem::take(&mut self.variant_endings);
        for group in &groups {
            if group.len() < 2 {
                continue;
            }
            let common = &group[0];
            let followup = group.last().filter(|e| e.is_followup);
            let variants: Vec<&VariantEntry> =
                group[1..].iter().filter(|e| !e.is_followup).collect();
            let Some(&last_variant) = variants.last() else {
                continue;
            };
            let distance_at = |entry: &VariantEntry, slot: usize| {
                entry
                    .distance
                    .as_ref()
                    .and_then(|d| d.get(slot).copied())
                    .unwrap_or(DEFAULT_DISTANCES[slot])
            };
            // Start lines: from the common close into every bracket.
            if let Some(common_stop) = common.rbstop {
                for entry in &variants {
                    let Some(rbstart) = entry.rbstart else {
                        continue;
                    };
                    self.push_variant_goto(
                        common_stop,
                        rbstart,
                        distance_at(entry, 0),
                        None,
                    );
                }
            }
            // End lines: brackets that fall through join the last bracket.
            for (i, entry) in variants.iter().enumerate() {
                if entry.repeat_end || i + 1 >= variants.len() {
                    continue;
                }
                if let (Some(rbstop), Some(target)) = (entry.rbstop, last_variant.rbstart) {
                    self.push_variant_goto(
                        rbstop,
                        target,
                        distance_at(entry, 1),
                        Some(VerticalAnchor::To),
                    );
                }
            }
            // Follow-up line: out of the last bracket into the continuation.
            if let Some(followup) = followup
                && let (Some(rbstop), Some(target)) = (last_variant.rbstop, followup.rbstart)
            {
                self.push_variant_goto(
                    rbstop,
                    target,
                    distance_at(last_variant, 2),
                    None,
                );
            }
        }
    }

    fn push_variant_goto(
        &mut self,
        from: EntityIndex,
        to: EntityIndex,
        distance: i32,
        vertical_anchor: Option<VerticalAnchor>,
    ) {
        let conf_key = self.goto_conf_key(from);
        self.voice.push(MusicEntity::Goto(Goto {
            from,
            to,
            policy: JumpPolicy {
                is_repeat: false,
                level: None,
                distance,
                from_anchor: Anchor::After,
                to_anchor: Anchor::Before,
                vertical_anchor,
                conf_key: Some(conf_key),
            },
        }));
    }

    /// Derives beats from times; a remainder warns and rounds down.
    fn assign_beats(&mut self, warnings: &mut Vec<TransformWarning>) {
        let mut fractional: Vec<Origin> = Vec::new();
        for (_, entity) in self.voice.entities_mut() {
            let Some(playable) = entity.as_playable_mut() else {
                continue;
            };
            let time = playable.core().time;
            if time % 8 != 0 {
                fractional.push(playable.core().origin.clone());
            }
            playable.set_beat(time.div_euclid(8));
        }
        for origin in fractional {
            warnings.push(TransformWarning::FractionalBeat {
                position: TextPosition::of_char_index(self.source, origin.start),
                index: origin.start,
            });
        }
    }
}

/// Parses `<n>` or `<n>,<n>,<n>` after the given prefix, as in `@@4,10,15`.
fn parse_goto_distance(annotation: &str, prefix: &str) -> Option<Vec<i32>> {
    annotation.strip_prefix(prefix).and_then(parse_distances)
}

fn parse_distances(text: &str) -> Option<Vec<i32>> {
    let values: Vec<i32> = text
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<_>>()?;
    (!values.is_empty()).then_some(values)
}

fn parse_pair(text: &str) -> Option<(f64, f64)> {
    let (x, y) = text.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}
