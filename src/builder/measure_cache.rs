//! Measure cache — derived lookups computed once over the frozen score.
//!
//! The renderer lays staves out measure by measure, so each measure's
//! horizontal extent must agree across players even when one player is
//! silent for part of it. The extremes are therefore computed across all
//! players first and written into every player's entry.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    BuildLog, CachedMeasureInfo, CachedNoteSetInfo, IntermediateScore, MeasureCache,
    PitchRange, TimeKey,
};

/// Accumulated per-measure facts shared by every player's cache entry.
struct MeasureExtent {
    min_offset: f64,
    max_offset: f64,
    /// Staves sounding at each onset, combined across players.
    onset_staves: BTreeMap<TimeKey, BTreeSet<i32>>,
}

/// Build the per-player, per-measure cache.
pub fn build_measure_cache(score: &IntermediateScore) -> MeasureCache {
    let mut extents: BTreeMap<usize, MeasureExtent> = BTreeMap::new();

    for time_map in score.players.values() {
        for (time, set) in time_map {
            let Some(first) = set.first() else { continue };
            let start = time.as_units();
            let end = start + set.iter().map(|n| n.duration).fold(0.0, f64::max);

            let extent = extents.entry(first.measure).or_insert(MeasureExtent {
                min_offset: f64::INFINITY,
                max_offset: f64::NEG_INFINITY,
                onset_staves: BTreeMap::new(),
            });
            extent.min_offset = extent.min_offset.min(start);
            extent.max_offset = extent.max_offset.max(end);
            let staves = extent.onset_staves.entry(*time).or_default();
            for note in set {
                staves.insert(note.staff.unwrap_or(1));
            }
        }
    }

    let mut cache = MeasureCache::new();
    for (player, time_map) in &score.players {
        let mut per_measure: BTreeMap<usize, CachedMeasureInfo> = BTreeMap::new();

        for (time, set) in time_map {
            let Some(first) = set.first() else { continue };
            let entry = per_measure.entry(first.measure).or_insert_with(|| {
                let extent = &extents[&first.measure];
                CachedMeasureInfo {
                    note_sets: Vec::new(),
                    min_offset_time: extent.min_offset,
                    max_offset_time: extent.max_offset,
                    matching_note_set_times: extent
                        .onset_staves
                        .iter()
                        .filter(|(_, staves)| staves.contains(&1) && staves.contains(&2))
                        .map(|(t, _)| t.as_units())
                        .collect(),
                }
            });
            entry.note_sets.push(CachedNoteSetInfo {
                time: time.as_units(),
                note_set: set.clone(),
            });
        }

        cache.insert(*player, per_measure);
    }

    cache
}

/// Lowest and highest sounding MIDI pitch, rests ignored. A score with no
/// pitched notes at all falls back to the full keyboard.
pub fn pitch_range(score: &IntermediateScore, logs: &mut Vec<BuildLog>) -> PitchRange {
    let mut lowest = 128;
    let mut highest = 0;

    for time_map in score.players.values() {
        for set in time_map.values() {
            for note in set {
                if note.rest {
                    continue;
                }
                if let Some(pitch) = &note.pitch {
                    let midi = pitch.to_midi();
                    lowest = lowest.min(midi);
                    highest = highest.max(midi);
                }
            }
        }
    }

    if lowest > highest {
        logs.push(BuildLog::warning(
            "score has no pitched notes; pitch range defaults to the full keyboard",
        ));
        return PitchRange {
            lowest: 0,
            highest: 127,
        };
    }

    PitchRange { lowest, highest }
}

/// Total score length in normalized units: the last onset plus its longest
/// duration across players, rounded up to a whole unit.
pub fn score_length(score: &IntermediateScore) -> f64 {
    let mut length: f64 = 0.0;

    for time_map in score.players.values() {
        if let Some((time, set)) = time_map.iter().next_back() {
            let longest = set.iter().map(|n| n.duration).fold(0.0, f64::max);
            length = length.max(time.as_units() + longest);
        }
    }

    length.ceil()
}
