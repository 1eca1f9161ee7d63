//! Score builder — turns a [`ParsedScore`] into a playable,
//! hand-partitioned, time-indexed score.
//!
//! The pipeline runs in a fixed order: partition notes by player, resolve
//! ties across onsets, derive display pitches, drop rest-only onsets, then
//! build the per-measure cache and pitch range. Each stage is a function
//! from one owned snapshot to the next; the finished [`PlayableScore`] is
//! immutable and shared by reference with the renderer and the matcher.

pub mod cleanup;
pub mod measure_cache;
pub mod partition;
pub mod simplify;
pub mod ties;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ParsedNote, ParsedScore};

/// Spacing factor folded into every normalized duration.
pub const NOTE_MARGIN: f64 = 1.5;

/// How many preceding onsets the tie resolver searches for a link target.
pub const TIE_SEARCH_WINDOW: usize = 15;

/// A performer that notated material is partitioned into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Player {
    RightHand,
    LeftHand,
    Computer,
    Muted,
}

impl Player {
    pub const ALL: [Player; 4] = [
        Player::RightHand,
        Player::LeftHand,
        Player::Computer,
        Player::Muted,
    ];
}

/// One rule of the player-mapping table: notes from the matching part and
/// staff belong to `player`. A rule matches when its staff equals the
/// note's zero-based staff index and either the part number or the
/// (lower-cased) part name matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMapping {
    pub part_number: usize,
    pub part_name: String,
    /// Zero-based staff index within the part.
    pub staff: usize,
    pub player: Player,
}

/// A normalized onset time, stored fixed-point so onset keys are exact:
/// every key in a player's time map is unique and totally ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeKey(i64);

const TIME_SCALE: f64 = 1_000_000.0;

impl TimeKey {
    pub fn from_units(units: f64) -> TimeKey {
        TimeKey((units * TIME_SCALE).round() as i64)
    }

    pub fn as_units(self) -> f64 {
        self.0 as f64 / TIME_SCALE
    }
}

/// All notes beginning at one onset for one player. Insertion order is
/// significant: the matcher zips physical presses positionally against it.
pub type NoteSet = Vec<ParsedNote>;

/// Onset time → note set, ordered by time.
pub type TimeMap = BTreeMap<TimeKey, NoteSet>;

/// The partitioned, time-indexed score the pipeline stages pass along.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntermediateScore {
    pub players: BTreeMap<Player, TimeMap>,
}

impl IntermediateScore {
    /// Sorted onset times for one player.
    pub fn onset_times(&self, player: Player) -> Vec<TimeKey> {
        self.players
            .get(&player)
            .map(|tm| tm.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn note_set(&self, player: Player, time: TimeKey) -> Option<&NoteSet> {
        self.players.get(&player).and_then(|tm| tm.get(&time))
    }
}

/// Severity of a build log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Failure,
}

/// A recoverable anomaly recorded while building. Accumulated alongside
/// the result, never a failure by itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildLog {
    pub severity: LogLevel,
    pub message: String,
}

impl BuildLog {
    pub fn warning(message: impl Into<String>) -> BuildLog {
        let message = message.into();
        log::warn!("{message}");
        BuildLog {
            severity: LogLevel::Warning,
            message,
        }
    }
}

/// Options controlling the builder pipeline.
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    /// Player-mapping rules, first match wins. When no rule matches, staff
    /// 0 falls back to the right hand and staff 1 to the left hand
    /// regardless of part identity.
    pub player_mappings: Vec<PlayerMapping>,
    /// Spacing factor for duration normalization.
    pub note_margin: f64,
    /// Backward search bound for tie resolution, in onsets.
    pub tie_search_window: usize,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            player_mappings: Vec::new(),
            note_margin: NOTE_MARGIN,
            tie_search_window: TIE_SEARCH_WINDOW,
        }
    }
}

/// Lowest and highest sounding MIDI pitch across the whole score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchRange {
    pub lowest: i32,
    pub highest: i32,
}

/// One `(time, note set)` pair inside a measure's cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedNoteSetInfo {
    pub time: f64,
    pub note_set: NoteSet,
}

/// Per-player, per-measure lookup derived once after the score is frozen.
///
/// `min_offset_time` and `max_offset_time` are shared across players for
/// the same measure so layout stays measure-synchronous across staves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedMeasureInfo {
    /// Ordered `(time, note set)` pairs covering this measure.
    pub note_sets: Vec<CachedNoteSetInfo>,
    /// Smallest onset in this measure across all players.
    pub min_offset_time: f64,
    /// Largest onset + duration in this measure across all players.
    pub max_offset_time: f64,
    /// Onsets with notes on both staff 1 and staff 2, ascending. Used for
    /// intra-measure alignment guides.
    pub matching_note_set_times: Vec<f64>,
}

/// Measure number → cache entry, per player.
pub type MeasureCache = BTreeMap<Player, BTreeMap<usize, CachedMeasureInfo>>;

/// The finished, immutable score handed to the renderer and the matcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayableScore {
    pub intermediate: IntermediateScore,
    pub measures: MeasureCache,
    pub pitch_range: PitchRange,
    /// Total score length in normalized units (background staff extent).
    pub length: f64,
}

/// Result of a build: the frozen score plus accumulated log entries.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub score: PlayableScore,
    pub logs: Vec<BuildLog>,
}

/// Runs the pipeline stages over a parsed score.
#[derive(Debug, Clone, Default)]
pub struct ScoreBuilder {
    pub options: BuilderOptions,
}

impl ScoreBuilder {
    pub fn new(options: BuilderOptions) -> ScoreBuilder {
        ScoreBuilder { options }
    }

    /// Run the full pipeline. Single-threaded and synchronous; the
    /// returned score is complete before any matcher activity can begin.
    pub fn build(&self, input: &ParsedScore) -> BuildOutput {
        let mut logs = Vec::new();

        let partitioned = partition::partition(&self.options, input, &mut logs);
        let tied = ties::resolve_ties(&self.options, partitioned, &mut logs);
        let simplified = simplify::simplify(tied);
        let intermediate = cleanup::remove_empty_onsets(simplified);

        let measures = measure_cache::build_measure_cache(&intermediate);
        let pitch_range = measure_cache::pitch_range(&intermediate, &mut logs);
        let length = measure_cache::score_length(&intermediate);

        BuildOutput {
            score: PlayableScore {
                intermediate,
                measures,
                pitch_range,
                length,
            },
            logs,
        }
    }
}
