//! The layout engine: from a song to a sheet of drawables.
//!
//! ## Coordinate model
//!
//! - **X is pitch.** Every semitone owns a vertical strip:
//!   `x = (PITCH_OFFSET + pitch) * X_SPACING + X_OFFSET`, in millimeters
//!   from the left edge of the drawing area.
//! - **Y is beat.** Per-voice beats are `time / 8` in backend ticks. Beats
//!   map through the content-aware [`packer::BeatCompressor`] and scale by
//!   the *beat spacing*:
//!
//! ```text
//! beat_spacing = min(full_spacing, pack_max_spreadfactor * Y_SCALE / BEAT_RESOLUTION)
//! full_spacing = (DRAWING_HEIGHT - START_POS) / max_compressed_beat
//! y            = START_POS + position(beat) * beat_spacing     (top-down)
//! y            = DRAWING_HEIGHT - position(beat) * beat_spacing (bottom-up)
//! ```
//!
//! The `min` guarantees the page fit: the whole tune lands inside the
//! drawing area by construction.

pub mod packer;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::config::{ConfigError, ConfigStack, Value, stack::deep_merge};
use crate::harp::drawing::{
    Annotation, Drawable, DrawableMeta, Ellipse, EntityRef, FillStyle, FlowLine, Glyph, LineStyle,
    Path, PathCommand, Point, PrinterConfig, Sheet, TextStyle, glyphs::GlyphKey,
    overlapping_annotations,
};
use crate::harp::music::{EntityIndex, MusicEntity, Shift, Song, VerticalAnchor};

use self::packer::{BEAT_RESOLUTION, BeatCompressor, BeatLoad};

/// Top margin reserved for the sheet heading, in millimeters.
const START_POS: f64 = 15.0;

/// A non-fatal layout finding.
/// Extracts routinely select more voices than a tune has; absent voices are
/// skipped silently, so the only finding left is overlapping text.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LayoutWarning {
    /// Annotation boxes overlap on the sheet.
    #[error("{count} annotation pairs overlap")]
    AnnotationCollisions {
        /// Number of overlapping pairs.
        count: usize,
    },
}

/// Layout output: the sheet plus accumulated warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOutput {
    /// The laid-out sheet.
    pub sheet: Sheet,
    /// Warnings raised during layout.
    pub warnings: Vec<LayoutWarning>,
}

/// Visual style of one duration bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationStyle {
    /// Size factor applied to `ELLIPSE_SIZE` and to the beat weight.
    pub weight: f64,
    /// Solid or outlined head.
    pub fill: FillStyle,
    /// Whether a duration dot follows.
    pub dotted: bool,
}

const fn style(weight: f64, fill: FillStyle, dotted: bool) -> DurationStyle {
    DurationStyle { weight, fill, dotted }
}

/// The style of a normalized duration bucket; anything off the bucket grid
/// renders as the oversized error style.
#[must_use]
pub const fn duration_style(duration: u32) -> DurationStyle {
    match duration {
        64 => style(0.9, FillStyle::Empty, false),
        48 => style(0.7, FillStyle::Empty, true),
        32 => style(0.7, FillStyle::Empty, false),
        24 => style(0.7, FillStyle::Filled, true),
        16 => style(0.7, FillStyle::Filled, false),
        12 => style(0.5, FillStyle::Filled, true),
        8 => style(0.5, FillStyle::Filled, false),
        6 => style(0.3, FillStyle::Filled, true),
        4 => style(0.3, FillStyle::Filled, false),
        3 => style(0.1, FillStyle::Filled, true),
        2 => style(0.1, FillStyle::Filled, false),
        1 => style(0.05, FillStyle::Filled, false),
        _ => style(2.0, FillStyle::Filled, false),
    }
}

/// The glyph of a rest duration bucket: box scale, glyph, duration dot.
#[must_use]
pub const fn rest_glyph(duration: u32) -> ((f64, f64), GlyphKey, bool) {
    match duration {
        64 => ((1.0, 0.8), GlyphKey::Rest1, false),
        48 => ((1.0, 0.8), GlyphKey::Rest1, true),
        32 => ((1.0, 0.8), GlyphKey::Rest2, false),
        24 => ((1.0, 0.8), GlyphKey::Rest2, true),
        16 => ((0.8, 1.0), GlyphKey::Rest4, false),
        12 => ((0.8, 1.0), GlyphKey::Rest4, true),
        8 => ((0.8, 1.0), GlyphKey::Rest8, false),
        6 => ((0.8, 1.0), GlyphKey::Rest8, true),
        4 => ((0.8, 1.0), GlyphKey::Rest16, false),
        3 => ((0.8, 1.0), GlyphKey::Rest16, true),
        2 => ((0.8, 1.0), GlyphKey::Rest32, false),
        1 => ((0.8, 1.0), GlyphKey::Rest64, false),
        _ => ((2.0, 2.0), GlyphKey::Error, false),
    }
}

/// Flag count of a stem for the given duration bucket.
const fn flag_count(duration: u32) -> u32 {
    match duration {
        8 | 6 => 1,
        4 | 3 => 2,
        2 => 3,
        1 => 4,
        _ => 0,
    }
}

/// The resolved extract configuration the renderer works from.
struct LayoutConf {
    /// The resolved extract table, kept for per-instance override lookups.
    extract: Value,
    title: String,
    voices: Vec<usize>,
    layoutlines: Vec<usize>,
    flowlines: Vec<usize>,
    subflowlines: Vec<usize>,
    synchlines: Vec<(usize, usize)>,
    jumplines: Vec<usize>,
    barnumbers_voices: Vec<usize>,
    barnumbers_pos: (f64, f64),
    barnumbers_prefix: String,
    countnotes_voices: Vec<usize>,
    countnotes_pos: (f64, f64),
    stringnames: Vec<String>,
    stringnames_vpos: Vec<f64>,
    stringnames_style: TextStyle,
    limit_a3: bool,
    bottomup: bool,
    beams: bool,
    line_thin: f64,
    line_medium: f64,
    line_thick: f64,
    ellipse_size: (f64, f64),
    rest_size: (f64, f64),
    x_spacing: f64,
    x_offset: f64,
    pitch_offset: f64,
    y_scale: f64,
    drawing_size: (f64, f64),
    jumpline_anchor: (f64, f64),
    color_default: String,
    color_variant1: String,
    color_variant2: String,
    pack_method: i64,
    pack_max_spread: f64,
    pack_min_increment: f64,
}

fn usize_list(value: Option<&Value>) -> Vec<usize> {
    value
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_i64().map(|i| i.max(0) as usize))
                .collect()
        })
        .unwrap_or_default()
}

fn f64_at(root: &Value, path: &str, fallback: f64) -> f64 {
    root.at(path).and_then(Value::as_f64).unwrap_or(fallback)
}

fn pair_at(root: &Value, path: &str, fallback: (f64, f64)) -> (f64, f64) {
    root.at(path).and_then(Value::as_pair).unwrap_or(fallback)
}

fn str_at(root: &Value, path: &str, fallback: &str) -> String {
    root.at(path)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_owned()
}

impl LayoutConf {
    fn from_stack(conf: &ConfigStack, extract: usize) -> Result<Self, ConfigError> {
        let base = conf
            .get("extract.0")?
            .unwrap_or_else(|| Value::Table(Default::default()));
        let resolved = if extract == 0 {
            base
        } else {
            match conf.get(&format!("extract.{extract}"))? {
                Some(over) => deep_merge(&base, &over),
                None => base,
            }
        };
        let synchlines = resolved
            .at("synchlines")
            .and_then(Value::as_list)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter_map(|pair| {
                        let items = pair.as_list()?;
                        match items {
                            [a, b] => Some((
                                a.as_i64()?.max(0) as usize,
                                b.as_i64()?.max(0) as usize,
                            )),
                            _ => None,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        let stringnames = resolved
            .at("stringnames.text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        let stringnames_vpos = resolved
            .at("stringnames.vpos")
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        Ok(Self {
            title: str_at(&resolved, "title", ""),
            voices: usize_list(resolved.at("voices")),
            layoutlines: usize_list(resolved.at("layoutlines")),
            flowlines: usize_list(resolved.at("flowlines")),
            subflowlines: usize_list(resolved.at("subflowlines")),
            synchlines,
            jumplines: usize_list(resolved.at("jumplines")),
            barnumbers_voices: usize_list(resolved.at("barnumbers.voices")),
            barnumbers_pos: pair_at(&resolved, "barnumbers.pos", (6.0, -4.0)),
            barnumbers_prefix: str_at(&resolved, "barnumbers.prefix", ""),
            countnotes_voices: usize_list(resolved.at("countnotes.voices")),
            countnotes_pos: pair_at(&resolved, "countnotes.pos", (3.0, -2.0)),
            stringnames,
            stringnames_vpos,
            stringnames_style: TextStyle::from_name(&str_at(
                &resolved,
                "stringnames.style",
                "small",
            )),
            limit_a3: resolved.at("layout.limit_a3").and_then(Value::as_bool).unwrap_or(true),
            bottomup: resolved.at("layout.bottomup").and_then(Value::as_bool).unwrap_or(false),
            beams: resolved.at("layout.beams").and_then(Value::as_bool).unwrap_or(false),
            line_thin: f64_at(&resolved, "layout.LINE_THIN", 0.1),
            line_medium: f64_at(&resolved, "layout.LINE_MEDIUM", 0.3),
            line_thick: f64_at(&resolved, "layout.LINE_THICK", 0.5),
            ellipse_size: pair_at(&resolved, "layout.ELLIPSE_SIZE", (3.5, 1.7)),
            rest_size: pair_at(&resolved, "layout.REST_SIZE", (4.0, 2.0)),
            x_spacing: f64_at(&resolved, "layout.X_SPACING", 11.5),
            x_offset: f64_at(&resolved, "layout.X_OFFSET", 2.8),
            pitch_offset: f64_at(&resolved, "layout.PITCH_OFFSET", -43.0),
            y_scale: f64_at(&resolved, "layout.Y_SCALE", 4.0),
            drawing_size: pair_at(&resolved, "layout.DRAWING_AREA_SIZE", (400.0, 282.0)),
            jumpline_anchor: pair_at(&resolved, "layout.jumpline_anchor", (3.5, 1.0)),
            color_default: str_at(&resolved, "layout.color.color_default", "black"),
            color_variant1: str_at(&resolved, "layout.color.color_variant1", "grey"),
            color_variant2: str_at(&resolved, "layout.color.color_variant2", "dimgrey"),
            pack_method: resolved
                .at("layout.packer.pack_method")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            pack_max_spread: f64_at(&resolved, "layout.packer.pack_max_spreadfactor", 2.0),
            pack_min_increment: f64_at(&resolved, "layout.packer.pack_min_increment", 0.2),
            extract: resolved,
        })
    }

    fn color_for(&self, variant: Option<u32>) -> String {
        match variant {
            None => self.color_default.clone(),
            Some(v) if v % 2 == 1 => self.color_variant1.clone(),
            Some(_) => self.color_variant2.clone(),
        }
    }
}

/// Lays out one extract of a song into a sheet.
///
/// The song is only mutated to attach the sheet-drawable back-pointers.
///
/// # Errors
///
/// Configuration failures (a deferred-value cycle) are the only fatal case.
pub fn layout_sheet(
    song: &mut Song,
    extract: usize,
    conf: &ConfigStack,
) -> Result<LayoutOutput, ConfigError> {
    let layout_conf = LayoutConf::from_stack(conf, extract)?;
    let mut renderer = Renderer::new(&layout_conf, song);
    let mut warnings = Vec::new();
    renderer.render(song);
    let sheet = Sheet {
        drawables: renderer.drawables,
        active_voices: layout_conf
            .voices
            .iter()
            .copied()
            .filter(|&v| song.voice(v).is_some())
            .collect(),
        printer: PrinterConfig {
            a3_offset: pair_at(&layout_conf.extract, "printer.a3_offset", (0.0, 0.0)),
            a4_offset: pair_at(&layout_conf.extract, "printer.a4_offset", (-5.0, 0.0)),
            show_border: layout_conf
                .extract
                .at("printer.show_border")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
    };
    // Back-pointers from the playables into the sheet.
    for (voice_index, entity, drawable) in renderer.backrefs {
        if let Some(voice) = song
            .voices_mut()
            .iter_mut()
            .find(|voice| voice.index == voice_index)
            && let Some(playable) = voice.entity_mut(entity).and_then(MusicEntity::as_playable_mut)
        {
            playable.core_mut().sheet_drawable = Some(drawable);
        }
    }
    let collisions = overlapping_annotations(&sheet);
    if !collisions.is_empty() {
        warnings.push(LayoutWarning::AnnotationCollisions {
            count: collisions.len(),
        });
    }
    Ok(LayoutOutput { sheet, warnings })
}

struct Renderer<'a> {
    conf: &'a LayoutConf,
    compressor: BeatCompressor,
    beat_spacing: f64,
    drawables: Vec<Drawable>,
    backrefs: Vec<(usize, EntityIndex, usize)>,
    /// Proxy center of every rendered playable, by voice and entity.
    positions: HashMap<(usize, usize), Point>,
    /// Every head center of every rendered playable, with its pitch.
    chords: HashMap<(usize, usize), Vec<(u8, Point)>>,
}

impl<'a> Renderer<'a> {
    fn new(conf: &'a LayoutConf, song: &Song) -> Self {
        let mut loads: BTreeMap<i64, BeatLoad> = BTreeMap::new();
        for &index in &conf.layoutlines {
            let Some(voice) = song.voice(index) else {
                continue;
            };
            for (_, playable) in voice.playables() {
                let core = playable.core();
                if let Some(beat) = core.beat {
                    loads.entry(beat).or_default().absorb(
                        core.duration,
                        core.measure_start,
                        core.first_in_part,
                    );
                }
            }
        }
        let compressor = BeatCompressor::build(
            &loads,
            |duration| duration_style(duration).weight,
            conf.pack_method,
            conf.pack_min_increment,
        );
        let max_position = compressor.max_position();
        let spread_spacing = conf.pack_max_spread * conf.y_scale / BEAT_RESOLUTION;
        let beat_spacing = if max_position > 0.0 {
            ((conf.drawing_size.1 - START_POS) / max_position).min(spread_spacing)
        } else {
            spread_spacing
        };
        Self {
            conf,
            compressor,
            beat_spacing,
            drawables: Vec::new(),
            backrefs: Vec::new(),
            positions: HashMap::new(),
            chords: HashMap::new(),
        }
    }

    fn beat_y(&self, beat: i64) -> f64 {
        let position = self.compressor.position(beat) * self.beat_spacing;
        if self.conf.bottomup {
            self.conf.drawing_size.1 - position
        } else {
            START_POS + position
        }
    }

    fn pitch_x(&self, pitch: u8, shift: Option<Shift>) -> f64 {
        let mut x =
            (self.conf.pitch_offset + f64::from(pitch)) * self.conf.x_spacing + self.conf.x_offset;
        if self.conf.limit_a3 {
            if x < 5.0 {
                x += self.conf.ellipse_size.0;
            } else if x > 415.0 {
                x -= self.conf.ellipse_size.0;
            }
        }
        match shift {
            Some(Shift::Left) => x -= self.conf.ellipse_size.0,
            Some(Shift::Right) => x += self.conf.ellipse_size.0,
            None => {}
        }
        x
    }

    /// Reads the per-instance override table of a configuration key.
    fn instance_override(&self, conf_key: Option<&str>) -> Option<&Value> {
        self.conf.extract.at(conf_key?)
    }

    fn render(&mut self, song: &Song) {
        let conf = self.conf;
        for &index in &conf.layoutlines {
            if song.voice(index).is_some() {
                self.render_voice(song, index);
            }
        }
        self.render_cross_voice_synchlines(song);
        self.render_barnumbers(song);
        self.render_countnotes(song);
        self.render_stringnames();
        self.render_sheet_annotations(song);
    }

    fn render_voice(&mut self, song: &Song, voice_index: usize) {
        let voice = song.voice(voice_index).expect("checked by the caller");
        // First pass: heads, rests, measure bars, flags.
        for (entity_index, entity) in voice.entities() {
            let Some(playable) = entity.as_playable() else {
                continue;
            };
            let core = playable.core();
            let Some(beat) = core.beat else {
                continue;
            };
            let y = self.beat_y(beat);
            let origin = EntityRef {
                voice: voice_index,
                entity: entity_index,
            };
            match entity {
                MusicEntity::Note(note) => {
                    let x = self.pitch_x(note.pitch, core.shift);
                    let center = Point::new(x, y);
                    let first = self.push_note_head(center, note.core.duration, core.variant, origin);
                    self.finish_playable(voice_index, entity_index, center, first);
                    self.chords
                        .insert((voice_index, entity_index.value()), vec![(note.pitch, center)]);
                    if core.measure_start {
                        self.push_measure_bar(center);
                    }
                }
                MusicEntity::SynchPoint(synch) => {
                    let mut heads = Vec::with_capacity(synch.notes.len());
                    let mut first_drawable = None;
                    for note in &synch.notes {
                        let x = self.pitch_x(note.pitch, note.core.shift.or(core.shift));
                        let center = Point::new(x, y);
                        let drawable =
                            self.push_note_head(center, note.core.duration, core.variant, origin);
                        first_drawable.get_or_insert(drawable);
                        heads.push((note.pitch, center));
                    }
                    let proxy_center = heads.last().map_or(Point::default(), |h| h.1);
                    self.finish_playable(
                        voice_index,
                        entity_index,
                        proxy_center,
                        first_drawable.unwrap_or(0),
                    );
                    if core.measure_start {
                        self.push_measure_bar(proxy_center);
                    }
                    // Chord synchline between the first and last head.
                    if let (Some(&(_, first)), Some(&(_, last))) = (heads.first(), heads.last())
                        && heads.len() >= 2
                    {
                        self.drawables.push(Drawable::FlowLine(FlowLine {
                            from: first,
                            to: last,
                            style: LineStyle::Dashed,
                            meta: DrawableMeta {
                                line_width: self.conf.line_thin,
                                origin: Some(origin),
                                ..DrawableMeta::default()
                            },
                        }));
                    }
                    self.chords.insert((voice_index, entity_index.value()), heads);
                }
                MusicEntity::Pause(pause) => {
                    let x = self.pitch_x(pause.pitch, core.shift);
                    let center = Point::new(x, y);
                    let (scale, key, dotted) = rest_glyph(pause.core.duration);
                    let drawable_index = self.drawables.len();
                    self.drawables.push(Drawable::Glyph(Glyph {
                        center,
                        size: (
                            self.conf.rest_size.0 * scale.0,
                            self.conf.rest_size.1 * scale.1,
                        ),
                        glyph: key,
                        dotted,
                        meta: DrawableMeta {
                            color: self.conf.color_for(core.variant),
                            line_width: self.conf.line_thin,
                            visible: core.visible,
                            origin: Some(origin),
                            conf_key: None,
                        },
                    }));
                    self.finish_playable(voice_index, entity_index, center, drawable_index);
                    self.chords
                        .insert((voice_index, entity_index.value()), vec![(pause.pitch, center)]);
                    if core.measure_start {
                        self.push_measure_bar(center);
                    }
                }
                _ => {}
            }
        }
        self.render_flowlines(voice, voice_index);
        self.render_jumplines(voice, voice_index);
        self.render_notebound(voice, voice_index);
    }

    /// Pushes one note-head ellipse and returns its drawable index.
    fn push_note_head(
        &mut self,
        center: Point,
        duration: u32,
        variant: Option<u32>,
        origin: EntityRef,
    ) -> usize {
        let style = duration_style(duration);
        let index = self.drawables.len();
        self.drawables.push(Drawable::Ellipse(Ellipse {
            center,
            size: (
                self.conf.ellipse_size.0 * style.weight.max(0.3),
                self.conf.ellipse_size.1 * style.weight.max(0.3),
            ),
            fill: style.fill,
            dotted: style.dotted,
            meta: DrawableMeta {
                color: self.conf.color_for(variant),
                line_width: if matches!(style.fill, FillStyle::Filled) {
                    self.conf.line_thin
                } else {
                    self.conf.line_medium
                },
                origin: Some(origin),
                ..DrawableMeta::default()
            },
        }));
        if self.conf.beams && flag_count(duration) > 0 {
            self.push_note_flags(center, duration);
        }
        index
    }

    /// The stem-and-flag path of a short note.
    fn push_note_flags(&mut self, center: Point, duration: u32) {
        let stem_x = center.x + self.conf.ellipse_size.0;
        let mut commands = vec![
            PathCommand::Move(Point::new(stem_x, center.y)),
            PathCommand::LineBy(Point::new(0.0, -4.0)),
        ];
        for flag in 0..flag_count(duration) {
            commands.push(PathCommand::Move(Point::new(
                stem_x,
                center.y - 4.0 + f64::from(flag),
            )));
            commands.push(PathCommand::LineBy(Point::new(1.6, 0.8)));
        }
        self.drawables.push(Drawable::Path(Path {
            commands,
            filled: false,
            meta: DrawableMeta {
                line_width: self.conf.line_thin,
                ..DrawableMeta::default()
            },
        }));
    }

    /// The thin filled bar marking a measure boundary over (or, bottom-up,
    /// under) a playable.
    fn push_measure_bar(&mut self, center: Point) {
        let direction = if self.conf.bottomup { 1.0 } else { -1.0 };
        let y = center.y + direction * (self.conf.ellipse_size.1 + 1.2);
        let half_width = self.conf.ellipse_size.0;
        self.drawables.push(Drawable::Path(Path {
            commands: vec![
                PathCommand::Move(Point::new(center.x - half_width, y)),
                PathCommand::LineBy(Point::new(2.0 * half_width, 0.0)),
                PathCommand::LineBy(Point::new(0.0, 0.3)),
                PathCommand::LineBy(Point::new(-2.0 * half_width, 0.0)),
                PathCommand::Close,
            ],
            filled: true,
            meta: DrawableMeta {
                line_width: self.conf.line_thin,
                ..DrawableMeta::default()
            },
        }));
    }

    fn finish_playable(
        &mut self,
        voice_index: usize,
        entity_index: EntityIndex,
        center: Point,
        drawable_index: usize,
    ) {
        self.positions
            .insert((voice_index, entity_index.value()), center);
        self.backrefs.push((voice_index, entity_index, drawable_index));
    }

    fn render_flowlines(&mut self, voice: &crate::harp::music::Voice, voice_index: usize) {
        let flow = self.conf.flowlines.contains(&voice_index);
        let subflow = self.conf.subflowlines.contains(&voice_index);
        if !flow && !subflow {
            return;
        }
        let mut previous: Option<(EntityIndex, Point)> = None;
        for (entity_index, entity) in voice.entities() {
            let Some(playable) = entity.as_playable() else {
                continue;
            };
            let core = playable.core();
            if !core.visible {
                continue;
            }
            let Some(&center) = self.positions.get(&(voice_index, entity_index.value())) else {
                continue;
            };
            if let Some((_, from)) = previous
                && !core.first_in_part
            {
                let tied = match entity {
                    MusicEntity::Note(note) => note.tie_end,
                    MusicEntity::SynchPoint(synch) => synch.proxy().tie_end,
                    _ => false,
                };
                let style = if tied {
                    LineStyle::Dotted
                } else if subflow {
                    LineStyle::Dashed
                } else {
                    LineStyle::Solid
                };
                self.drawables.push(Drawable::FlowLine(FlowLine {
                    from,
                    to: center,
                    style,
                    meta: DrawableMeta {
                        line_width: self.conf.line_medium,
                        origin: Some(EntityRef {
                            voice: voice_index,
                            entity: entity_index,
                        }),
                        ..DrawableMeta::default()
                    },
                }));
            }
            previous = Some((entity_index, center));
        }
    }

    fn render_jumplines(&mut self, voice: &crate::harp::music::Voice, voice_index: usize) {
        if !self.conf.jumplines.contains(&voice_index) {
            return;
        }
        for (entity_index, entity) in voice.entities() {
            let MusicEntity::Goto(goto) = entity else {
                continue;
            };
            let (Some(&from), Some(&to)) = (
                self.positions.get(&(voice_index, goto.from.value())),
                self.positions.get(&(voice_index, goto.to.value())),
            ) else {
                continue;
            };
            let policy = &goto.policy;
            let distance = self
                .instance_override(policy.conf_key.as_deref())
                .and_then(|v| v.at("distance"))
                .and_then(Value::as_i64)
                .map_or(policy.distance, |d| d as i32);
            // Anchors flip in bottom-up mode: "after" means later in time,
            // which then lies upward.
            let flip = if self.conf.bottomup { -1.0 } else { 1.0 };
            let from_sign = policy.from_anchor.sign() * flip;
            let to_sign = policy.to_anchor.sign() * flip;
            let anchor_dy = self.conf.jumpline_anchor.1 + self.conf.ellipse_size.1;
            let start = Point::new(from.x, from.y + from_sign * anchor_dy);
            let end = Point::new(to.x, to.y + to_sign * anchor_dy);
            let corridor_base = match policy.vertical_anchor {
                Some(VerticalAnchor::From) => start.x,
                Some(VerticalAnchor::To) | None => end.x,
            };
            let corridor_x =
                corridor_base + (f64::from(distance) + 0.5) * self.conf.x_spacing;
            let meta = DrawableMeta {
                line_width: self.conf.line_thick,
                origin: Some(EntityRef {
                    voice: voice_index,
                    entity: entity_index,
                }),
                conf_key: policy.conf_key.clone(),
                ..DrawableMeta::default()
            };
            // The L-shaped run: over to the corridor, along it, back to the
            // destination.
            self.drawables.push(Drawable::Path(Path {
                commands: vec![
                    PathCommand::Move(start),
                    PathCommand::LineBy(Point::new(corridor_x - start.x, 0.0)),
                    PathCommand::LineBy(Point::new(0.0, end.y - start.y)),
                    PathCommand::LineBy(Point::new(end.x - corridor_x, 0.0)),
                ],
                filled: false,
                meta: meta.clone(),
            }));
            // Arrowhead: apex on the destination anchor, base toward the
            // corridor.
            let base_x = end.x + if corridor_x >= end.x { 2.5 } else { -2.5 };
            self.drawables.push(Drawable::Path(Path {
                commands: vec![
                    PathCommand::Move(end),
                    PathCommand::Line(Point::new(base_x, end.y - 1.0)),
                    PathCommand::Line(Point::new(base_x, end.y + 1.0)),
                    PathCommand::Close,
                ],
                filled: true,
                meta,
            }));
        }
    }

    fn render_cross_voice_synchlines(&mut self, song: &Song) {
        for &(left, right) in &self.conf.synchlines {
            let (Some(left_map), Some(right_map)) = (song.beat_map(left), song.beat_map(right))
            else {
                continue;
            };
            for (&beat, &left_entity) in left_map {
                let Some(&right_entity) = right_map.get(&beat) else {
                    continue;
                };
                let left_heads = self.chords.get(&(left, left_entity.value()));
                let right_heads = self.chords.get(&(right, right_entity.value()));
                let (Some(left_heads), Some(right_heads)) = (left_heads, right_heads) else {
                    continue;
                };
                // Of the two chords, connect the closest pitch pair.
                let mut best: Option<(u32, Point, Point)> = None;
                for &(left_pitch, left_point) in left_heads {
                    for &(right_pitch, right_point) in right_heads {
                        let gap = u32::from(left_pitch.abs_diff(right_pitch));
                        if best.is_none_or(|(b, _, _)| gap < b) {
                            best = Some((gap, left_point, right_point));
                        }
                    }
                }
                if let Some((_, from, to)) = best {
                    self.drawables.push(Drawable::FlowLine(FlowLine {
                        from,
                        to,
                        style: LineStyle::Dashed,
                        meta: DrawableMeta {
                            line_width: self.conf.line_thin,
                            ..DrawableMeta::default()
                        },
                    }));
                }
            }
        }
    }

    fn render_notebound(&mut self, voice: &crate::harp::music::Voice, voice_index: usize) {
        for (_, entity) in voice.entities() {
            let MusicEntity::NoteBoundAnnotation(annotation) = entity else {
                continue;
            };
            let Some(&companion) = self
                .positions
                .get(&(voice_index, annotation.companion.value()))
            else {
                continue;
            };
            let (dx, dy) = self
                .instance_override(annotation.conf_key.as_deref())
                .and_then(|v| v.at("pos"))
                .and_then(Value::as_pair)
                .unwrap_or(annotation.position);
            self.drawables.push(Drawable::Annotation(Annotation {
                position: companion.offset(dx, dy),
                text: annotation.text.clone(),
                style: TextStyle::from_name(&annotation.style),
                meta: DrawableMeta {
                    conf_key: annotation.conf_key.clone(),
                    ..DrawableMeta::default()
                },
            }));
        }
    }

    fn render_barnumbers(&mut self, song: &Song) {
        for &voice_index in &self.conf.barnumbers_voices {
            let Some(voice) = song.voice(voice_index) else {
                continue;
            };
            for (entity_index, playable) in voice.playables() {
                let core = playable.core();
                if !core.measure_start {
                    continue;
                }
                let Some(&center) = self.positions.get(&(voice_index, entity_index.value()))
                else {
                    continue;
                };
                let (dx, dy) = self.conf.barnumbers_pos;
                self.drawables.push(Drawable::Annotation(Annotation {
                    position: center.offset(dx, dy),
                    text: format!("{}{}", self.conf.barnumbers_prefix, core.measure_count),
                    style: TextStyle::Smaller,
                    meta: DrawableMeta::default(),
                }));
            }
        }
    }

    fn render_countnotes(&mut self, song: &Song) {
        for &voice_index in &self.conf.countnotes_voices {
            let Some(voice) = song.voice(voice_index) else {
                continue;
            };
            for (entity_index, playable) in voice.playables() {
                let Some(label) = playable.core().count_note.clone() else {
                    continue;
                };
                if label.is_empty() {
                    continue;
                }
                let Some(&center) = self.positions.get(&(voice_index, entity_index.value()))
                else {
                    continue;
                };
                let (dx, dy) = self.conf.countnotes_pos;
                self.drawables.push(Drawable::Annotation(Annotation {
                    position: center.offset(dx, dy),
                    text: label,
                    style: TextStyle::Smaller,
                    meta: DrawableMeta::default(),
                }));
            }
        }
    }

    fn render_stringnames(&mut self) {
        let conf = self.conf;
        if conf.stringnames_vpos.is_empty() || conf.stringnames.is_empty() {
            return;
        }
        for &y in &conf.stringnames_vpos {
            for (string, name) in conf.stringnames.iter().enumerate() {
                let pitch = (-conf.pitch_offset) as i64 + string as i64;
                let Ok(pitch) = u8::try_from(pitch) else {
                    continue;
                };
                let x = self.pitch_x(pitch, None);
                self.drawables.push(Drawable::Annotation(Annotation {
                    position: Point::new(x - 1.0, y),
                    text: name.clone(),
                    style: conf.stringnames_style,
                    meta: DrawableMeta::default(),
                }));
            }
        }
    }

    /// The sheet heading, the extract's free-standing notes, and the footer
    /// identifying the source revision.
    fn render_sheet_annotations(&mut self, song: &Song) {
        let heading = song
            .meta
            .title
            .clone()
            .unwrap_or_else(|| self.conf.title.clone());
        if !heading.is_empty() {
            self.drawables.push(Drawable::Annotation(Annotation {
                position: Point::new(20.0, 8.0),
                text: heading,
                style: TextStyle::Large,
                meta: DrawableMeta::default(),
            }));
        }
        if let Some(Value::Table(notes)) = self.conf.extract.at("notes").cloned() {
            for (key, note) in &notes {
                let Some((x, y)) = note.at("pos").and_then(Value::as_pair) else {
                    continue;
                };
                let text = note.at("text").and_then(Value::as_str).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                self.drawables.push(Drawable::Annotation(Annotation {
                    position: Point::new(x, y),
                    text: text.to_owned(),
                    style: TextStyle::from_name(
                        note.at("style").and_then(Value::as_str).unwrap_or("regular"),
                    ),
                    meta: DrawableMeta {
                        conf_key: Some(format!("notes.{key}")),
                        ..DrawableMeta::default()
                    },
                }));
            }
        }
        let footer = format!("{} [{}]", self.conf.title, song.checksum);
        self.drawables.push(Drawable::Annotation(Annotation {
            position: Point::new(20.0, self.conf.drawing_size.1 - 2.0),
            text: footer,
            style: TextStyle::Smaller,
            meta: DrawableMeta::default(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::defaults::stack_with_defaults;
    use crate::harp::abc::parser::parse;
    use crate::harp::transform::transform;

    fn sheet_for(source: &str) -> (Song, LayoutOutput) {
        let conf = stack_with_defaults();
        let abc = parse(source);
        assert_eq!(abc.warnings, vec![]);
        let output = transform(source, &abc.voices, &abc.meta, &conf).expect("no config errors");
        let mut song = output.song;
        let layout = layout_sheet(&mut song, 0, &conf).expect("no config errors");
        (song, layout)
    }

    fn ellipses(sheet: &Sheet) -> Vec<&Ellipse> {
        sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Ellipse(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn x_grows_with_pitch_and_y_with_beat() {
        let (_, layout) = sheet_for("X:1\nM:4/4\nK:C\nCDEF|\n");
        assert_eq!(layout.warnings, vec![]);
        let heads = ellipses(&layout.sheet);
        assert_eq!(heads.len(), 4);
        for pair in heads.windows(2) {
            assert!(pair[0].center.x < pair[1].center.x);
            assert!(pair[0].center.y < pair[1].center.y);
        }
    }

    #[test]
    fn the_whole_tune_fits_the_page() {
        let long_tune = format!("X:1\nM:4/4\nK:C\n{}", "CDEF GABc|".repeat(40));
        let (_, layout) = sheet_for(&long_tune);
        let max_y = ellipses(&layout.sheet)
            .iter()
            .map(|e| e.center.y)
            .fold(0.0_f64, f64::max);
        assert!(max_y <= 282.0 + 1e-6, "lowest head at {max_y}");
    }

    #[test]
    fn duration_styles_match_the_bucket_table() {
        assert_eq!(duration_style(64).fill, FillStyle::Empty);
        assert!(duration_style(48).dotted);
        assert_eq!(duration_style(8).fill, FillStyle::Filled);
        assert_eq!(duration_style(7).weight, 2.0);
        let (scale, key, dotted) = rest_glyph(16);
        assert_eq!((key, dotted), (GlyphKey::Rest4, false));
        assert!(scale.0 > 0.0);
    }

    #[test]
    fn jumplines_are_a_line_and_an_arrowhead() {
        let (_, layout) = sheet_for("X:1\nM:4/4\nK:C\n|:CDEF:|\n");
        let paths: Vec<&Path> = layout
            .sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Path(p) if p.meta.line_width >= 0.5 => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(paths.len(), 2);
        let line = paths.iter().find(|p| !p.filled).expect("the jump run");
        assert_eq!(line.commands.len(), 4);
        let arrow = paths.iter().find(|p| p.filled).expect("the arrowhead");
        // The apex sits on the destination anchor: the first command.
        assert!(matches!(arrow.commands[0], PathCommand::Move(_)));
        assert_eq!(arrow.commands.len(), 4);
    }

    #[test]
    fn invisible_rests_stay_invisible() {
        let (_, layout) = sheet_for("X:1\nM:4/4\nK:C\nC x D z|\n");
        let glyph_visibility: Vec<bool> = layout
            .sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Glyph(g) => Some(g.meta.visible),
                _ => None,
            })
            .collect();
        assert_eq!(glyph_visibility, vec![false, true]);
    }

    #[test]
    fn back_pointers_land_on_the_playables() {
        let (song, layout) = sheet_for("X:1\nM:4/4\nK:C\nCD|\n");
        let voice = song.voice(1).expect("voice 1 exists");
        for (_, playable) in voice.playables() {
            let drawable = playable.core().sheet_drawable.expect("back-pointer set");
            assert!(matches!(
                layout.sheet.drawables[drawable],
                Drawable::Ellipse(_)
            ));
        }
    }

    #[test]
    fn barnumbers_render_for_configured_voices() {
        let source = "X:1\nM:4/4\nK:C\nCDEF|GABc|\n";
        let mut conf = stack_with_defaults();
        conf.set(
            "extract.0.barnumbers.voices",
            Value::list([Value::Int(1)]),
        )
        .expect("path is addressable");
        let abc = parse(source);
        let output = transform(source, &abc.voices, &abc.meta, &conf).expect("no config errors");
        let mut song = output.song;
        let layout = layout_sheet(&mut song, 0, &conf).expect("no config errors");
        let numbers: Vec<String> = layout
            .sheet
            .drawables
            .iter()
            .filter_map(|d| match d {
                Drawable::Annotation(a) if a.text.parse::<u32>().is_ok() => Some(a.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["1".to_owned(), "2".to_owned()]);
    }

    #[test]
    fn bottomup_mode_runs_time_upward() {
        let source = "X:1\nM:4/4\nK:C\nCDEF|\n";
        let mut conf = stack_with_defaults();
        conf.set("extract.0.layout.bottomup", Value::Bool(true))
            .expect("path is addressable");
        let abc = parse(source);
        let output = transform(source, &abc.voices, &abc.meta, &conf).expect("no config errors");
        let mut song = output.song;
        let layout = layout_sheet(&mut song, 0, &conf).expect("no config errors");
        let heads = ellipses(&layout.sheet);
        for pair in heads.windows(2) {
            assert!(pair[0].center.y > pair[1].center.y);
        }
    }

    #[test]
    fn extract_notes_place_free_annotations() {
        let source = "X:1\nM:4/4\nK:C\nC|\n";
        let mut conf = stack_with_defaults();
        conf.set("extract.0.notes.n1.pos", Value::list([Value::Float(330.0), Value::Float(17.0)]))
            .expect("path is addressable");
        conf.set("extract.0.notes.n1.text", Value::from("zur Weihnacht"))
            .expect("path is addressable");
        let abc = parse(source);
        let output = transform(source, &abc.voices, &abc.meta, &conf).expect("no config errors");
        let mut song = output.song;
        let layout = layout_sheet(&mut song, 0, &conf).expect("no config errors");
        let note = layout
            .sheet
            .drawables
            .iter()
            .find_map(|d| match d {
                Drawable::Annotation(a) if a.text == "zur Weihnacht" => Some(a),
                _ => None,
            })
            .expect("the free annotation");
        assert_eq!(note.position, Point::new(330.0, 17.0));
        assert_eq!(note.meta.conf_key.as_deref(), Some("notes.n1"));
    }

    #[test]
    fn stringnames_render_when_positioned() {
        let source = "X:1\nM:4/4\nK:C\nC|\n";
        let mut conf = stack_with_defaults();
        conf.set(
            "extract.0.stringnames.vpos",
            Value::list([Value::Float(12.0)]),
        )
        .expect("path is addressable");
        let abc = parse(source);
        let output = transform(source, &abc.voices, &abc.meta, &conf).expect("no config errors");
        let mut song = output.song;
        let layout = layout_sheet(&mut song, 0, &conf).expect("no config errors");
        let names = layout
            .sheet
            .drawables
            .iter()
            .filter(|d| matches!(d, Drawable::Annotation(a) if (a.position.y - 12.0).abs() < 1e-9))
            .count();
        assert_eq!(names, 25);
    }
}
