//! Tie resolution — merges tied continuations back into the note that
//! started the tie, so each sustained sound occupies exactly one onset.
//!
//! The walk runs latest-to-earliest per player so that a chain of tied
//! notes collapses front-to-back: the tail merges into the middle before
//! the middle merges into the head, keeping the summed duration intact.

use crate::model::TieKind;

use super::{BuildLog, BuilderOptions, IntermediateScore, TimeKey, TimeMap};

/// Resolve ties in every player's time map.
pub fn resolve_ties(
    options: &BuilderOptions,
    mut score: IntermediateScore,
    logs: &mut Vec<BuildLog>,
) -> IntermediateScore {
    for time_map in score.players.values_mut() {
        resolve_time_map(options, time_map, logs);
    }
    score
}

fn resolve_time_map(options: &BuilderOptions, map: &mut TimeMap, logs: &mut Vec<BuildLog>) {
    let mut times: Vec<TimeKey> = map.keys().copied().collect();

    let mut idx = times.len();
    while idx > 0 {
        idx -= 1;
        let time = times[idx];

        let mut note_idx = 0;
        loop {
            let (pitch, duration) = {
                let Some(set) = map.get(&time) else { break };
                let Some(note) = set.get(note_idx) else { break };
                let continuation =
                    note.has_tie(TieKind::Stop) || note.has_tie(TieKind::Continue);
                // A note that also starts a tie is a chain middle; it still
                // merges backward, carrying whatever the tail already added.
                if !continuation || note.pitch.is_none() {
                    note_idx += 1;
                    continue;
                }
                (note.pitch.clone(), note.duration)
            };

            match find_link_target(map, &times, idx, options.tie_search_window, &pitch) {
                Some((target_time, target_idx)) => {
                    if let Some(target_set) = map.get_mut(&target_time) {
                        if let Some(target) = target_set.get_mut(target_idx) {
                            target.duration += duration;
                        }
                    }
                }
                None => {
                    logs.push(BuildLog::warning(format!(
                        "tied continuation at onset {} has no origin within {} onsets; its duration is dropped",
                        time.as_units(),
                        options.tie_search_window,
                    )));
                }
            }

            // The continuation itself never survives; with no origin its
            // duration is lost rather than re-attacked.
            if let Some(set) = map.get_mut(&time) {
                set.remove(note_idx);
                if set.is_empty() {
                    map.remove(&time);
                    times.remove(idx);
                    break;
                }
            }
        }
    }
}

/// Closest preceding onset (within `window` onsets) holding a note of the
/// given pitch that a continuation can merge into: one that starts or
/// continues a tie, or carries exactly a stop+start pair.
fn find_link_target(
    map: &TimeMap,
    times: &[TimeKey],
    idx: usize,
    window: usize,
    pitch: &Option<crate::model::Pitch>,
) -> Option<(TimeKey, usize)> {
    let floor = idx.saturating_sub(window);
    for j in (floor..idx).rev() {
        let time = times[j];
        let Some(set) = map.get(&time) else { continue };
        for (pos, candidate) in set.iter().enumerate() {
            if &candidate.pitch != pitch {
                continue;
            }
            let starts = tie_count(candidate, TieKind::Start);
            let continues = tie_count(candidate, TieKind::Continue);
            let stops = tie_count(candidate, TieKind::Stop);
            if starts > 0 || continues > 0 || stops + starts == 2 {
                return Some((time, pos));
            }
        }
    }
    None
}

fn tie_count(note: &crate::model::ParsedNote, kind: TieKind) -> usize {
    note.ties.iter().filter(|&&t| t == kind).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Player, TIE_SEARCH_WINDOW};
    use crate::model::{ParsedNote, Pitch};

    fn tied_note(name: &str, duration: f64, ties: Vec<TieKind>) -> ParsedNote {
        ParsedNote {
            pitch: Pitch::from_name(name),
            duration,
            ties,
            ..Default::default()
        }
    }

    fn score_of(onsets: Vec<(f64, Vec<ParsedNote>)>) -> IntermediateScore {
        let mut score = IntermediateScore::default();
        let map = score.players.entry(Player::RightHand).or_default();
        for (time, set) in onsets {
            map.insert(TimeKey::from_units(time), set);
        }
        score
    }

    fn resolve(score: IntermediateScore) -> (IntermediateScore, Vec<BuildLog>) {
        let mut logs = Vec::new();
        let out = resolve_ties(&BuilderOptions::default(), score, &mut logs);
        (out, logs)
    }

    #[test]
    fn split_whole_note_collapses_to_one_onset() {
        let score = score_of(vec![
            (0.0, vec![tied_note("C4", 9.0, vec![TieKind::Start])]),
            (9.0, vec![tied_note("C4", 9.0, vec![TieKind::Stop])]),
        ]);

        let (out, logs) = resolve(score);
        let times = out.onset_times(Player::RightHand);
        assert_eq!(times.len(), 1);
        let set = out.note_set(Player::RightHand, times[0]).unwrap();
        assert_eq!(set[0].duration, 18.0);
        assert!(logs.is_empty());
    }

    #[test]
    fn three_note_chain_is_duration_conservative() {
        let score = score_of(vec![
            (0.0, vec![tied_note("G3", 4.0, vec![TieKind::Start])]),
            (
                4.0,
                vec![tied_note("G3", 4.0, vec![TieKind::Stop, TieKind::Start])],
            ),
            (8.0, vec![tied_note("G3", 4.0, vec![TieKind::Stop])]),
        ]);

        let (out, _) = resolve(score);
        let times = out.onset_times(Player::RightHand);
        assert_eq!(times.len(), 1);
        let set = out.note_set(Player::RightHand, times[0]).unwrap();
        assert_eq!(set[0].duration, 12.0);
    }

    #[test]
    fn other_notes_at_a_collapsed_onset_survive() {
        let score = score_of(vec![
            (0.0, vec![tied_note("C4", 6.0, vec![TieKind::Start])]),
            (
                6.0,
                vec![
                    tied_note("C4", 3.0, vec![TieKind::Stop]),
                    tied_note("E4", 3.0, vec![]),
                ],
            ),
        ]);

        let (out, _) = resolve(score);
        let times = out.onset_times(Player::RightHand);
        assert_eq!(times.len(), 2);
        let tail = out.note_set(Player::RightHand, times[1]).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].pitch, Pitch::from_name("E4"));
        let head = out.note_set(Player::RightHand, times[0]).unwrap();
        assert_eq!(head[0].duration, 9.0);
    }

    #[test]
    fn exhausted_window_drops_the_continuation_and_logs() {
        let mut onsets = vec![(0.0, vec![tied_note("C4", 1.0, vec![TieKind::Start])])];
        // Enough intervening onsets to push the origin out of the window.
        for i in 0..TIE_SEARCH_WINDOW {
            onsets.push(((i + 1) as f64, vec![tied_note("D4", 1.0, vec![])]));
        }
        onsets.push((99.0, vec![tied_note("C4", 1.0, vec![TieKind::Stop])]));

        let (out, logs) = resolve(score_of(onsets));
        assert_eq!(logs.len(), 1);
        // The origin keeps its own duration; the continuation is gone.
        let times = out.onset_times(Player::RightHand);
        assert_eq!(times.len(), 1 + TIE_SEARCH_WINDOW);
        let head = out.note_set(Player::RightHand, times[0]).unwrap();
        assert_eq!(head[0].duration, 1.0);
    }

    #[test]
    fn continuation_only_merges_into_matching_pitch() {
        let score = score_of(vec![
            (0.0, vec![tied_note("D4", 4.0, vec![TieKind::Start])]),
            (4.0, vec![tied_note("C4", 4.0, vec![TieKind::Stop])]),
        ]);

        let (out, logs) = resolve(score);
        assert_eq!(logs.len(), 1);
        let times = out.onset_times(Player::RightHand);
        assert_eq!(times.len(), 1);
        assert_eq!(
            out.note_set(Player::RightHand, times[0]).unwrap()[0].duration,
            4.0
        );
    }
}
