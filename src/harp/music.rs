//! The harpnote music model.
//!
//! A [`Song`] owns its voices; every [`Voice`] owns its entities as an arena
//! and refers between them by [`EntityIndex`], so the prev/next chains of
//! playables never form ownership cycles. Entities live for one render pass:
//! the transformer creates them, the layout engine only attaches the
//! sheet-drawable back-pointer.

use std::collections::BTreeMap;

use crate::harp::abc::parser::TuneMeta;
use crate::harp::origin::Origin;

/// Index of an entity inside its owning voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityIndex(pub(crate) usize);

impl EntityIndex {
    /// Returns the contained arena index value.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

/// Horizontal nudge of a playable, from `<` / `>` chord annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Shift {
    /// Nudge one ellipse width to the left.
    Left,
    /// Nudge one ellipse width to the right.
    Right,
}

/// Which side of a playable a jump line attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Anchor {
    /// Attach on the time-earlier side.
    Before,
    /// Attach on the time-later side.
    After,
}

impl Anchor {
    /// The direction sign of the anchor: before is -1, after is +1.
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Before => -1.0,
            Self::After => 1.0,
        }
    }
}

/// Which end pins the vertical corridor of a jump line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VerticalAnchor {
    /// The corridor follows the source.
    From,
    /// The corridor follows the destination.
    To,
}

/// The fields shared by every playable entity.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayableCore {
    /// Onset in parser ticks (1536 per whole note).
    pub time: i64,
    /// The derived beat, assigned when the song's beat maps are built.
    pub beat: Option<i64>,
    /// Back-reference into the source text.
    pub origin: Origin,
    /// The stable identifier `"<startChar>_<time>"`.
    pub znid: String,
    /// Whether the entity is rendered.
    pub visible: bool,
    /// Duration normalized onto the shortest-note grid (8 = an eighth when
    /// the grid is 64 per whole).
    pub duration: u32,
    /// Whether a measure starts at this playable.
    pub measure_start: bool,
    /// Whether a new part starts at this playable.
    pub first_in_part: bool,
    /// Number of measures started up to and including this playable.
    pub measure_count: u32,
    /// Beat-count label, when counting is enabled.
    pub count_note: Option<String>,
    /// Variant-ending ordinal; `None` outside variant brackets.
    pub variant: Option<u32>,
    /// Horizontal nudge.
    pub shift: Option<Shift>,
    /// The previous playable of the voice.
    pub prev_playable: Option<EntityIndex>,
    /// The next playable of the voice.
    pub next_playable: Option<EntityIndex>,
    /// Pitch of the previous playable.
    pub prev_pitch: Option<u8>,
    /// Pitch of the next playable.
    pub next_pitch: Option<u8>,
    /// Index of the drawable this playable produced, attached by layout.
    pub sheet_drawable: Option<usize>,
}

/// A single note.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// The shared playable fields.
    pub core: PlayableCore,
    /// MIDI pitch.
    pub pitch: u8,
    /// A tie starts at this note.
    pub tie_start: bool,
    /// A tie ends at this note.
    pub tie_end: bool,
    /// Open-slur indices starting here, outermost first.
    pub slur_starts: Vec<usize>,
    /// Slur indices ending here.
    pub slur_ends: Vec<usize>,
    /// The tuplet divisor, when part of a tuplet.
    pub tuplet: Option<u32>,
    /// First member of its tuplet group.
    pub tuplet_start: bool,
    /// Last member of its tuplet group.
    pub tuplet_end: bool,
    /// Decoration names attached to the note.
    pub decorations: Vec<String>,
}

/// Notes played simultaneously as one chord.
///
/// Acts as a playable by delegating to its *proxy note*, the last
/// constituent in declaration order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynchPoint {
    /// The constituents, at least two, all sharing one onset time.
    pub notes: Vec<Note>,
}

impl SynchPoint {
    /// The constituent the synch point delegates to.
    #[must_use]
    pub fn proxy(&self) -> &Note {
        self.notes.last().expect("a synch point holds at least one note")
    }

    fn proxy_mut(&mut self) -> &mut Note {
        self.notes.last_mut().expect("a synch point holds at least one note")
    }
}

/// A rest. Same shape as a note; the pitch is inferred from the surrounding
/// notes so the glyph lands between them.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pause {
    /// The shared playable fields.
    pub core: PlayableCore,
    /// The inferred display pitch.
    pub pitch: u8,
}

/// The rendering policy of a jump line.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JumpPolicy {
    /// Whether the jump is a plain repeat.
    pub is_repeat: bool,
    /// Nesting level of the repeat, where known.
    pub level: Option<u32>,
    /// Horizontal corridor distance in string strips.
    pub distance: i32,
    /// Which side of the source the line leaves from.
    pub from_anchor: Anchor,
    /// Which side of the destination the line arrives at.
    pub to_anchor: Anchor,
    /// Which end pins the corridor.
    pub vertical_anchor: Option<VerticalAnchor>,
    /// Configuration key for per-instance overrides.
    pub conf_key: Option<String>,
}

impl Default for JumpPolicy {
    fn default() -> Self {
        Self {
            is_repeat: false,
            level: None,
            distance: 2,
            from_anchor: Anchor::After,
            to_anchor: Anchor::Before,
            vertical_anchor: None,
            conf_key: None,
        }
    }
}

/// A jump from one playable back (or forward) to another.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Goto {
    /// The source playable.
    pub from: EntityIndex,
    /// The destination playable.
    pub to: EntityIndex,
    /// How the jump line is routed.
    pub policy: JumpPolicy,
}

/// Text attached to a companion playable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteBoundAnnotation {
    /// The playable the text belongs to.
    pub companion: EntityIndex,
    /// The text.
    pub text: String,
    /// Style name, `regular` / `small` / `bold`.
    pub style: String,
    /// Offset from the companion's center, in millimeters.
    pub position: (f64, f64),
    /// Configuration key for per-instance overrides.
    pub conf_key: Option<String>,
    /// Back-reference into the source text.
    pub origin: Origin,
}

/// A measure boundary, annotating its companion playable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasureStart {
    /// The first playable of the measure.
    pub companion: EntityIndex,
}

/// A part boundary, annotating its companion playable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewPart {
    /// The part label.
    pub name: String,
    /// The first playable of the part.
    pub companion: EntityIndex,
}

/// A music entity of a voice.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum MusicEntity {
    /// A single note.
    Note(Note),
    /// A chord of simultaneous notes.
    SynchPoint(SynchPoint),
    /// A rest.
    Pause(Pause),
    /// A note-bound text.
    NoteBoundAnnotation(NoteBoundAnnotation),
    /// A measure boundary.
    MeasureStart(MeasureStart),
    /// A part boundary.
    NewPart(NewPart),
    /// A jump between playables.
    Goto(Goto),
}

/// Capability of everything that occupies time on the sheet.
///
/// [`SynchPoint`] implements it by forwarding to its proxy note; this is a
/// capability shim, not inheritance.
pub trait Playable {
    /// The shared fields.
    fn core(&self) -> &PlayableCore;
    /// The shared fields, mutable.
    fn core_mut(&mut self) -> &mut PlayableCore;
    /// The display pitch.
    fn pitch(&self) -> u8;
    /// Assigns the derived beat.
    fn set_beat(&mut self, beat: i64) {
        self.core_mut().beat = Some(beat);
    }
}

impl Playable for Note {
    fn core(&self) -> &PlayableCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut PlayableCore {
        &mut self.core
    }
    fn pitch(&self) -> u8 {
        self.pitch
    }
}

impl Playable for Pause {
    fn core(&self) -> &PlayableCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut PlayableCore {
        &mut self.core
    }
    fn pitch(&self) -> u8 {
        self.pitch
    }
}

impl Playable for SynchPoint {
    fn core(&self) -> &PlayableCore {
        &self.proxy().core
    }
    fn core_mut(&mut self) -> &mut PlayableCore {
        &mut self.proxy_mut().core
    }
    fn pitch(&self) -> u8 {
        self.proxy().pitch
    }
    fn set_beat(&mut self, beat: i64) {
        for note in &mut self.notes {
            note.core.beat = Some(beat);
        }
    }
}

impl MusicEntity {
    /// The entity as a playable, if it is one.
    #[must_use]
    pub fn as_playable(&self) -> Option<&dyn Playable> {
        match self {
            Self::Note(note) => Some(note),
            Self::SynchPoint(synch) => Some(synch),
            Self::Pause(pause) => Some(pause),
            _ => None,
        }
    }

    /// The entity as a mutable playable, if it is one.
    pub fn as_playable_mut(&mut self) -> Option<&mut dyn Playable> {
        match self {
            Self::Note(note) => Some(note),
            Self::SynchPoint(synch) => Some(synch),
            Self::Pause(pause) => Some(pause),
            _ => None,
        }
    }
}

/// An ordered sequence of music entities with a one-based index and a name.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Voice {
    /// The one-based voice index.
    pub index: usize,
    /// The human-readable name.
    pub name: String,
    entities: Vec<MusicEntity>,
}

impl Voice {
    /// Creates an empty voice.
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            entities: Vec::new(),
        }
    }

    /// Appends an entity and returns its index.
    pub fn push(&mut self, entity: MusicEntity) -> EntityIndex {
        self.entities.push(entity);
        EntityIndex(self.entities.len() - 1)
    }

    /// The entity at `index`.
    #[must_use]
    pub fn entity(&self, index: EntityIndex) -> Option<&MusicEntity> {
        self.entities.get(index.0)
    }

    /// The entity at `index`, mutable.
    pub fn entity_mut(&mut self, index: EntityIndex) -> Option<&mut MusicEntity> {
        self.entities.get_mut(index.0)
    }

    /// All entities in order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityIndex, &MusicEntity)> {
        self.entities.iter().enumerate().map(|(i, e)| (EntityIndex(i), e))
    }

    /// All entities in order, mutable.
    pub fn entities_mut(&mut self) -> impl Iterator<Item = (EntityIndex, &mut MusicEntity)> {
        self.entities
            .iter_mut()
            .enumerate()
            .map(|(i, e)| (EntityIndex(i), e))
    }

    /// All playables in order.
    pub fn playables(&self) -> impl Iterator<Item = (EntityIndex, &dyn Playable)> {
        self.entities().filter_map(|(i, e)| e.as_playable().map(|p| (i, p)))
    }

    /// The playable at `index`, if the entity is one.
    #[must_use]
    pub fn playable(&self, index: EntityIndex) -> Option<&dyn Playable> {
        self.entity(index).and_then(MusicEntity::as_playable)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the voice has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// A transformed song: voices, metadata, and per-voice beat maps.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Song {
    voices: Vec<Voice>,
    /// Tune metadata from the header fields.
    pub meta: TuneMeta,
    /// FNV-1a checksum of the source text, hex-printed.
    pub checksum: String,
    /// Per voice: beat to the playable starting at that beat.
    beat_maps: Vec<BTreeMap<i64, EntityIndex>>,
}

impl Song {
    /// Creates a song from transformed voices.
    #[must_use]
    pub fn new(voices: Vec<Voice>, meta: TuneMeta, checksum: String) -> Self {
        let mut song = Self {
            voices,
            meta,
            checksum,
            beat_maps: Vec::new(),
        };
        song.beat_maps = song.voices.iter().map(voice_beat_map).collect();
        song
    }

    /// The voices in index order.
    #[must_use]
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// The voices, mutable. Beat maps are rebuilt by the caller if entity
    /// times change; layout only attaches back-pointers.
    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    /// Resolves a voice by its one-based index.
    ///
    /// Index 0 is an alias of voice 1, preserving one-based addressing in
    /// configuration.
    #[must_use]
    pub fn voice(&self, index: usize) -> Option<&Voice> {
        let index = if index == 0 { 1 } else { index };
        self.voices.iter().find(|voice| voice.index == index)
    }

    /// The beat map of a voice, aliasing like [`Song::voice`].
    #[must_use]
    pub fn beat_map(&self, index: usize) -> Option<&BTreeMap<i64, EntityIndex>> {
        let index = if index == 0 { 1 } else { index };
        let position = self.voices.iter().position(|voice| voice.index == index)?;
        self.beat_maps.get(position)
    }

    /// The largest beat of any voice.
    #[must_use]
    pub fn last_beat(&self) -> i64 {
        self.beat_maps
            .iter()
            .filter_map(|map| map.keys().next_back())
            .max()
            .copied()
            .unwrap_or(0)
    }
}

fn voice_beat_map(voice: &Voice) -> BTreeMap<i64, EntityIndex> {
    voice
        .playables()
        .filter_map(|(index, playable)| playable.core().beat.map(|beat| (beat, index)))
        .collect()
}

/// FNV-1a 64 of the source text, the stable revision mark printed on sheets.
#[must_use]
pub fn source_checksum(source: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in source.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(time: i64, pitch: u8, beat: Option<i64>) -> Note {
        Note {
            core: PlayableCore {
                time,
                beat,
                duration: 8,
                visible: true,
                ..PlayableCore::default()
            },
            pitch,
            ..Note::default()
        }
    }

    #[test]
    fn synch_point_delegates_to_its_proxy() {
        let mut synch = SynchPoint {
            notes: vec![note(0, 60, None), note(0, 67, None)],
        };
        assert_eq!(synch.pitch(), 67);
        synch.set_beat(4);
        assert!(synch.notes.iter().all(|n| n.core.beat == Some(4)));
        assert_eq!(synch.core().beat, Some(4));
    }

    #[test]
    fn voice_zero_aliases_voice_one() {
        let mut voice = Voice::new(1, "Sopran");
        voice.push(MusicEntity::Note(note(0, 60, Some(0))));
        let song = Song::new(vec![voice], TuneMeta::default(), String::new());
        assert_eq!(song.voice(0).map(|v| v.index), Some(1));
        assert_eq!(song.beat_map(0).map(BTreeMap::len), Some(1));
    }

    #[test]
    fn beat_maps_key_playables_by_beat() {
        let mut voice = Voice::new(1, "1");
        voice.push(MusicEntity::Note(note(0, 60, Some(0))));
        voice.push(MusicEntity::Note(note(8, 62, Some(1))));
        voice.push(MusicEntity::Goto(Goto {
            from: EntityIndex(1),
            to: EntityIndex(0),
            policy: JumpPolicy::default(),
        }));
        let song = Song::new(vec![voice], TuneMeta::default(), String::new());
        let map = song.beat_map(1).expect("voice 1 exists");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1), Some(&EntityIndex(1)));
        assert_eq!(song.last_beat(), 1);
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(source_checksum("abc"), source_checksum("abc"));
        assert_ne!(source_checksum("abc"), source_checksum("abd"));
    }
}
