//! Simplification — derives the display pitch for every placed note.
//!
//! Today the display pitch is the sounding pitch; this stage is where a
//! register-clamping pass for small keyboards would slot in, rewriting
//! `display_pitch` while leaving `pitch` untouched.

use super::IntermediateScore;

/// Fill `display_pitch` for every note. Idempotent.
pub fn simplify(mut score: IntermediateScore) -> IntermediateScore {
    for time_map in score.players.values_mut() {
        for set in time_map.values_mut() {
            for note in set.iter_mut() {
                note.display_pitch = note.pitch.clone();
            }
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Player, TimeKey};
    use crate::model::{ParsedNote, Pitch};

    #[test]
    fn display_pitch_mirrors_pitch_and_is_idempotent() {
        let mut score = IntermediateScore::default();
        score.players.entry(Player::LeftHand).or_default().insert(
            TimeKey::from_units(0.0),
            vec![
                ParsedNote {
                    pitch: Pitch::from_name("F#2"),
                    duration: 4.0,
                    ..Default::default()
                },
                ParsedNote {
                    rest: true,
                    duration: 4.0,
                    ..Default::default()
                },
            ],
        );

        let once = simplify(score);
        let twice = simplify(once.clone());
        assert_eq!(once, twice);

        let set = once
            .note_set(Player::LeftHand, TimeKey::from_units(0.0))
            .unwrap();
        assert_eq!(set[0].display_pitch, set[0].pitch);
        assert_eq!(set[1].display_pitch, None);
    }
}
