//! Empty-onset cleanup — the last rewriting stage before the score is
//! frozen. Rests matter for clock simulation but not for playback, so
//! they are stripped here, and onsets left with nothing to sound are
//! deleted outright.

use super::IntermediateScore;

/// Strip rests from every note set and drop onsets that end up empty.
pub fn remove_empty_onsets(mut score: IntermediateScore) -> IntermediateScore {
    for time_map in score.players.values_mut() {
        time_map.retain(|_, set| {
            set.retain(|note| !note.rest);
            !set.is_empty()
        });
    }
    score
}
