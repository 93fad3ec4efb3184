//! Content-aware beat compression.
//!
//! Vertical placement does not map beats to millimeters linearly: a passage
//! of whole notes would waste a page a passage of sixteenths cannot afford.
//! The compressor walks every beat that carries a playable, weighs it by the
//! visual size of the largest note at that beat, and accumulates positions
//! whose step sizes follow those weights. Dense and sparse passages then
//! share one page.

use std::collections::BTreeMap;

/// Compressed layout units per size-weight unit.
pub const BEAT_RESOLUTION: f64 = 64.0;

/// What the compressor needs to know about one beat.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BeatLoad {
    /// The largest normalized duration at this beat.
    pub max_duration: u32,
    /// Whether any playable at this beat starts a measure.
    pub measure_start: bool,
    /// Whether any playable at this beat starts a part.
    pub first_in_part: bool,
}

impl BeatLoad {
    /// Folds another playable at the same beat into the load.
    pub fn absorb(&mut self, duration: u32, measure_start: bool, first_in_part: bool) {
        self.max_duration = self.max_duration.max(duration);
        self.measure_start |= measure_start;
        self.first_in_part |= first_in_part;
    }
}

/// The map from original beat to layout-space position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeatCompressor {
    positions: BTreeMap<i64, f64>,
}

impl BeatCompressor {
    /// Builds the compression map.
    ///
    /// `loads` collects every beat carrying at least one playable across the
    /// layout voices; `size_weight` maps a normalized duration to the first
    /// element of its duration style. `pack_method` 2 yields the identity
    /// map; 0 and 1 run the compressor (1 is reserved for a tighter variant
    /// and treated as 0).
    #[must_use]
    pub fn build(
        loads: &BTreeMap<i64, BeatLoad>,
        size_weight: impl Fn(u32) -> f64,
        pack_method: i64,
        pack_min_increment: f64,
    ) -> Self {
        if pack_method == 2 {
            return Self {
                positions: loads.keys().map(|&beat| (beat, beat as f64)).collect(),
            };
        }
        let scaled_min_increment = pack_min_increment * BEAT_RESOLUTION;
        let mut positions = BTreeMap::new();
        let mut last_size = 0.0;
        let mut position = 0.0;
        for (index, (&beat, load)) in loads.iter().enumerate() {
            let size = size_weight(load.max_duration) * BEAT_RESOLUTION;
            if index > 0 {
                let default_increment = (size + last_size) / 2.0;
                let mut increment = scaled_min_increment.max(default_increment);
                if load.measure_start {
                    increment += increment / 4.0;
                }
                if load.first_in_part {
                    increment += default_increment;
                }
                position += increment;
            }
            positions.insert(beat, position);
            last_size = size;
        }
        Self { positions }
    }

    /// The layout-space position of `beat`.
    ///
    /// Beats absent from the map interpolate linearly between the bracketing
    /// known beats; beats outside the span clamp to the edges.
    #[must_use]
    pub fn position(&self, beat: i64) -> f64 {
        if let Some(&position) = self.positions.get(&beat) {
            return position;
        }
        let before = self.positions.range(..beat).next_back();
        let after = self.positions.range(beat..).next();
        match (before, after) {
            (Some((&b0, &p0)), Some((&b1, &p1))) => {
                let fraction = (beat - b0) as f64 / (b1 - b0) as f64;
                p0 + (p1 - p0) * fraction
            }
            (Some((_, &p0)), None) => p0,
            (None, Some((_, &p1))) => p1,
            (None, None) => 0.0,
        }
    }

    /// The largest compressed position.
    #[must_use]
    pub fn max_position(&self) -> f64 {
        self.positions.values().next_back().copied().unwrap_or(0.0)
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loads(entries: &[(i64, u32, bool, bool)]) -> BTreeMap<i64, BeatLoad> {
        entries
            .iter()
            .map(|&(beat, duration, measure, part)| {
                (
                    beat,
                    BeatLoad {
                        max_duration: duration,
                        measure_start: measure,
                        first_in_part: part,
                    },
                )
            })
            .collect()
    }

    const fn weight(duration: u32) -> f64 {
        match duration {
            16 => 0.7,
            8 => 0.5,
            _ => 0.3,
        }
    }

    #[test]
    fn positions_accumulate_by_size() {
        let compressor = BeatCompressor::build(
            &loads(&[(0, 8, true, false), (24, 8, false, false), (48, 8, false, false)]),
            weight,
            0,
            0.2,
        );
        // Eighths weigh 0.5: every step is 32 layout units.
        assert_eq!(compressor.position(0), 0.0);
        assert_eq!(compressor.position(24), 32.0);
        assert_eq!(compressor.position(48), 64.0);
        assert_eq!(compressor.max_position(), 64.0);
    }

    #[test]
    fn measures_and_parts_get_extra_room() {
        let plain = BeatCompressor::build(
            &loads(&[(0, 8, true, false), (24, 8, false, false)]),
            weight,
            0,
            0.2,
        );
        let with_measure = BeatCompressor::build(
            &loads(&[(0, 8, true, false), (24, 8, true, false)]),
            weight,
            0,
            0.2,
        );
        let with_part = BeatCompressor::build(
            &loads(&[(0, 8, true, false), (24, 8, false, true)]),
            weight,
            0,
            0.2,
        );
        assert!(with_measure.position(24) > plain.position(24));
        assert!(with_part.position(24) > with_measure.position(24));
    }

    #[test]
    fn minimum_increment_holds_for_tiny_notes() {
        let compressor = BeatCompressor::build(
            &loads(&[(0, 1, false, false), (1, 1, false, false)]),
            |_| 0.01,
            0,
            0.2,
        );
        // 0.2 * 64 = 12.8 beats the tiny default increment.
        assert_eq!(compressor.position(1), 12.8);
    }

    #[test]
    fn identity_map_for_pack_method_two() {
        let compressor = BeatCompressor::build(
            &loads(&[(0, 8, false, false), (24, 8, false, false)]),
            weight,
            2,
            0.2,
        );
        assert_eq!(compressor.position(24), 24.0);
    }

    #[test]
    fn absent_beats_interpolate() {
        let compressor = BeatCompressor::build(
            &loads(&[(0, 8, false, false), (24, 8, false, false)]),
            weight,
            0,
            0.2,
        );
        assert_eq!(compressor.position(12), 16.0);
        assert_eq!(compressor.position(-5), 0.0);
        assert_eq!(compressor.position(100), 32.0);
    }
}
