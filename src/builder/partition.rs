//! Partition stage — walks each part in document order, simulating a
//! virtual clock, and buckets notes by player and onset time.
//!
//! The clock replays MusicXML's document-order semantics: `<backup>`
//! rewinds, `<forward>` advances, chord continuations share their
//! principal note's onset, and every duration is normalized from the
//! document's division units into the pipeline's canonical time unit.

use crate::model::{MeasureAttributes, MeasureChild, ParsedNote, ParsedScore, Part};

use super::{BuildLog, BuilderOptions, IntermediateScore, Player, TimeKey};

/// Running context threaded through one part's walk. Updated by
/// `<attributes>` nodes; applies to all subsequent duration normalization
/// until overridden.
#[derive(Debug, Clone, Copy)]
struct PartContext {
    divisions: f64,
    beats: f64,
    beat_type: f64,
}

impl Default for PartContext {
    fn default() -> Self {
        // 4/4 until the first <attributes> says otherwise.
        Self {
            divisions: 1.0,
            beats: 4.0,
            beat_type: 4.0,
        }
    }
}

impl PartContext {
    fn apply(&mut self, attrs: &MeasureAttributes) {
        if let Some(d) = attrs.divisions {
            self.divisions = d;
        }
        if let Some(time) = attrs.time {
            self.beats = time.beats;
            self.beat_type = time.beat_type;
        }
    }

    /// Convert a raw division-unit duration into normalized units. When
    /// divisions is zero the raw duration is kept as-is — an explicit
    /// edge case, not an error.
    fn normalize(&self, duration: f64, note_margin: f64) -> f64 {
        if self.divisions == 0.0 || duration == 0.0 {
            return duration;
        }
        (duration / self.divisions) * (3.0 * self.beat_type / self.beats) * note_margin
    }
}

/// Partition a parsed score into player → onset → note set.
pub fn partition(
    options: &BuilderOptions,
    input: &ParsedScore,
    logs: &mut Vec<BuildLog>,
) -> IntermediateScore {
    let mut out = IntermediateScore::default();

    for (part_idx, part) in input.parts.iter().enumerate() {
        // The clock and chord state never carry across parts.
        let mut clock: f64 = 0.0;
        let mut ctx = PartContext::default();
        let mut prev_note: Option<ParsedNote> = None;

        for (measure_idx, measure) in part.measures.iter().enumerate() {
            for child in &measure.children {
                match child {
                    MeasureChild::Attributes(attrs) => ctx.apply(attrs),
                    MeasureChild::Backup { duration } => {
                        clock -= ctx.normalize(*duration, options.note_margin);
                    }
                    MeasureChild::Forward { duration } => {
                        clock += ctx.normalize(*duration, options.note_margin);
                    }
                    MeasureChild::Note(raw) => {
                        let mut note = raw.clone();
                        note.duration = ctx.normalize(note.duration, options.note_margin);
                        place_note(
                            options,
                            &mut out,
                            &mut clock,
                            &prev_note,
                            &mut note,
                            part_idx,
                            part,
                            measure_idx,
                            logs,
                        );
                        prev_note = Some(note);
                    }
                }
            }
        }
    }

    out
}

#[allow(clippy::too_many_arguments)]
fn place_note(
    options: &BuilderOptions,
    out: &mut IntermediateScore,
    clock: &mut f64,
    prev_note: &Option<ParsedNote>,
    note: &mut ParsedNote,
    part_idx: usize,
    part: &Part,
    measure_idx: usize,
    logs: &mut Vec<BuildLog>,
) {
    if note.staff.is_none() {
        note.staff = Some(1);
    }
    if note.grace {
        note.duration = 0.0;
    }
    note.measure = measure_idx;

    let prev_chord = prev_note.as_ref().map(|p| p.chord).unwrap_or(false);
    let starts_chord = note.chord && !prev_chord;
    let ends_chord_run = prev_chord && !note.chord;

    // A chord continuation belongs at the same onset as its principal
    // note, whose duration was already applied to the clock.
    if starts_chord {
        if let Some(prev) = prev_note {
            *clock -= prev.duration;
        }
    }
    // Leaving a chord run: catch up past the chord's shared duration,
    // which was never applied after the continuation notes.
    if ends_chord_run {
        if let Some(prev) = prev_note {
            *clock += prev.duration;
        }
    }

    add_note(options, out, *clock, note, part_idx, part, logs);

    // Chord continuations never advance the clock.
    if !note.chord {
        *clock += note.duration;
    }
}

fn add_note(
    options: &BuilderOptions,
    out: &mut IntermediateScore,
    clock: f64,
    note: &ParsedNote,
    part_idx: usize,
    part: &Part,
    logs: &mut Vec<BuildLog>,
) {
    if note.cue {
        return;
    }

    let staff_idx = (note.staff.unwrap_or(1) - 1).max(0) as usize;
    let player = match resolve_player(options, part_idx, part, staff_idx) {
        Some(p) => p,
        None => {
            logs.push(BuildLog::warning(format!(
                "note did not map to a player (part index {part_idx}, staff {staff_idx}); dropped"
            )));
            return;
        }
    };

    let note_set = out
        .players
        .entry(player)
        .or_default()
        .entry(TimeKey::from_units(clock))
        .or_default();

    // Multiple parts may double the same pitch at the same onset; keep one.
    let duplicate = note_set.iter().any(|existing| {
        matches!((&existing.pitch, &note.pitch), (Some(a), Some(b)) if a == b)
    });
    if !duplicate {
        note_set.push(note.clone());
    }
}

/// Resolve the owning player for a (part, staff) pair. Mapping rules are
/// checked first in order; without a match, staff 0 plays right-hand and
/// staff 1 left-hand regardless of part identity.
fn resolve_player(
    options: &BuilderOptions,
    part_idx: usize,
    part: &Part,
    staff_idx: usize,
) -> Option<Player> {
    for mapping in &options.player_mappings {
        if mapping.staff == staff_idx
            && (mapping.part_number == part_idx || mapping.part_name == part.name)
        {
            return Some(mapping.player);
        }
    }

    match staff_idx {
        0 => Some(Player::RightHand),
        1 => Some(Player::LeftHand),
        _ => None,
    }
}
