//! Real-time playback matcher: decides which notated notes a physical
//! key press or release corresponds to, and advances the per-hand
//! cursors through the score.
//!
//! Two modes:
//! - **Gated** — a note set sounds only once the player has pressed as
//!   many keys as the set contains. Which physical key triggers which
//!   notated pitch is decided positionally: the queued presses are sorted
//!   ascending and zipped against the stored note-set order, so a chord
//!   can be played with any keys in any order.
//! - **Pass-through** — every press sounds the entire current note set
//!   and advances the cursor, turning single-finger playing into full
//!   chords.
//!
//! Events arrive one at a time and each runs to completion; the matcher
//! never fails from the event path. Anything it cannot interpret degrades
//! to a log line and a no-op so playback is never interrupted.

use std::collections::HashMap;

use crate::builder::{NoteSet, PlayableScore, Player};

/// A physical keyboard event delivered to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    ControlChange { controller: u8, value: u8 },
}

/// Output port for the matcher: the device (or synth) that actually
/// makes sound.
pub trait MidiSink {
    fn play_note(&mut self, pitch: u8, velocity: u8);
    fn stop_note(&mut self, pitch: u8);
    fn send_control_change(&mut self, controller: u8, value: u8);
}

/// How presses map to notated material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Gated,
    PassThrough,
}

/// Options controlling the matcher.
#[derive(Debug, Clone, Copy)]
pub struct MatcherOptions {
    pub mode: MatchMode,
    /// Keys at or above this pitch belong to the right hand. Middle C by
    /// default.
    pub split_point: u8,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            mode: MatchMode::Gated,
            split_point: 60,
        }
    }
}

/// Per-hand progress: the hand's onset sequence, its cursor, and the
/// gated-mode queues.
struct HandState<'a> {
    note_sets: Vec<&'a NoteSet>,
    cursor: usize,
    /// Presses collected toward the current note set, in arrival order.
    press_queue: Vec<(u8, u8)>,
    /// Physical keys released while their press was still pending.
    release_queue: Vec<u8>,
}

impl<'a> HandState<'a> {
    fn new(score: &'a PlayableScore, player: Player) -> HandState<'a> {
        let note_sets = score
            .intermediate
            .players
            .get(&player)
            .map(|tm| tm.values().collect())
            .unwrap_or_default();
        HandState {
            note_sets,
            cursor: 0,
            press_queue: Vec::new(),
            release_queue: Vec::new(),
        }
    }

    /// The next sounding note set at or after the cursor, skipping sets
    /// with nothing to play. Returns its index so the cursor can be moved
    /// past it.
    fn current(&self) -> Option<(usize, &'a NoteSet)> {
        let mut idx = self.cursor;
        while idx < self.note_sets.len() {
            let set = self.note_sets[idx];
            if set.iter().any(|n| n.pitch.is_some()) {
                return Some((idx, set));
            }
            idx += 1;
        }
        None
    }
}

/// Matches live key events against a frozen score.
pub struct PlaybackMatcher<'a> {
    options: MatcherOptions,
    right: HandState<'a>,
    left: HandState<'a>,
    /// Physical key → notated pitches it is currently sounding.
    pressed: HashMap<u8, Vec<u8>>,
}

impl<'a> PlaybackMatcher<'a> {
    pub fn new(score: &'a PlayableScore, options: MatcherOptions) -> PlaybackMatcher<'a> {
        PlaybackMatcher {
            options,
            right: HandState::new(score, Player::RightHand),
            left: HandState::new(score, Player::LeftHand),
            pressed: HashMap::new(),
        }
    }

    /// Onset position of each hand, as an index into its note-set
    /// sequence.
    pub fn cursors(&self) -> (usize, usize) {
        (self.right.cursor, self.left.cursor)
    }

    /// Process one event against the score, emitting any resulting sound
    /// through `sink`.
    pub fn handle_event(&mut self, event: KeyEvent, sink: &mut dyn MidiSink) {
        match event {
            KeyEvent::NoteOn { pitch, velocity } => self.note_on(pitch, velocity, sink),
            KeyEvent::NoteOff { pitch } => self.note_off(pitch, sink),
            KeyEvent::ControlChange { controller, value } => {
                // Pedals and other controllers pass straight through in
                // both modes.
                sink.send_control_change(controller, value);
            }
        }
    }

    fn hand_mut(&mut self, pitch: u8) -> &mut HandState<'a> {
        if pitch >= self.options.split_point {
            &mut self.right
        } else {
            &mut self.left
        }
    }

    fn note_on(&mut self, pitch: u8, velocity: u8, sink: &mut dyn MidiSink) {
        match self.options.mode {
            MatchMode::Gated => self.gated_note_on(pitch, velocity, sink),
            MatchMode::PassThrough => self.pass_through_note_on(pitch, velocity, sink),
        }
    }

    fn gated_note_on(&mut self, pitch: u8, velocity: u8, sink: &mut dyn MidiSink) {
        if self.pressed.contains_key(&pitch) {
            log::debug!("key {pitch} is already sounding; press ignored");
            return;
        }

        let hand = if pitch >= self.options.split_point {
            &mut self.right
        } else {
            &mut self.left
        };

        let Some((idx, set)) = hand.current() else {
            log::debug!("key {pitch} pressed after the hand's part ended; ignored");
            return;
        };

        if hand.press_queue.iter().any(|&(p, _)| p == pitch) {
            log::debug!("key {pitch} already pending for this note set; press ignored");
            return;
        }

        hand.press_queue.push((pitch, velocity));
        if hand.press_queue.len() < set.len() {
            return;
        }

        // Chord complete: lowest press plays the first stored note, and so
        // on up the set.
        let mut presses = std::mem::take(&mut hand.press_queue);
        presses.sort_unstable_by_key(|&(p, _)| p);
        hand.cursor = idx + 1;
        let deferred = std::mem::take(&mut hand.release_queue);

        for ((physical, vel), note) in presses.into_iter().zip(set.iter()) {
            if let Some(notated) = &note.pitch {
                let mapped = notated.to_midi().clamp(0, 127) as u8;
                sink.play_note(mapped, vel);
                self.pressed.entry(physical).or_default().push(mapped);
            }
        }

        for physical in deferred {
            self.release(physical, sink);
        }
    }

    fn pass_through_note_on(&mut self, pitch: u8, velocity: u8, sink: &mut dyn MidiSink) {
        if self.pressed.contains_key(&pitch) {
            log::debug!("key {pitch} is already sounding; press ignored");
            return;
        }

        let hand = if pitch >= self.options.split_point {
            &mut self.right
        } else {
            &mut self.left
        };

        let Some((idx, set)) = hand.current() else {
            log::debug!("key {pitch} pressed after the hand's part ended; ignored");
            return;
        };

        hand.cursor = idx + 1;

        let mut mapped = Vec::new();
        for note in set.iter() {
            if let Some(notated) = &note.pitch {
                let midi = notated.to_midi().clamp(0, 127) as u8;
                sink.play_note(midi, velocity);
                mapped.push(midi);
            }
        }
        self.pressed.insert(pitch, mapped);
    }

    fn note_off(&mut self, pitch: u8, sink: &mut dyn MidiSink) {
        if self.options.mode == MatchMode::Gated {
            let hand = self.hand_mut(pitch);
            if hand.press_queue.iter().any(|&(p, _)| p == pitch) {
                // Released before the chord completed: the sound hasn't
                // started yet, so the release waits for it.
                hand.release_queue.push(pitch);
                return;
            }
        }
        self.release(pitch, sink);
    }

    fn release(&mut self, pitch: u8, sink: &mut dyn MidiSink) {
        match self.pressed.remove(&pitch) {
            Some(mapped) => {
                for notated in mapped {
                    sink.stop_note(notated);
                }
            }
            None => log::debug!("release of key {pitch} that never sounded; ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderOptions, ScoreBuilder};
    use crate::model::{
        Measure, MeasureAttributes, MeasureChild, ParsedNote, ParsedScore, Part, Pitch,
        TimeSignature,
    };

    #[derive(Debug, PartialEq, Eq)]
    enum SinkCall {
        Play(u8, u8),
        Stop(u8),
        Control(u8, u8),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<SinkCall>,
    }

    impl MidiSink for RecordingSink {
        fn play_note(&mut self, pitch: u8, velocity: u8) {
            self.calls.push(SinkCall::Play(pitch, velocity));
        }
        fn stop_note(&mut self, pitch: u8) {
            self.calls.push(SinkCall::Stop(pitch));
        }
        fn send_control_change(&mut self, controller: u8, value: u8) {
            self.calls.push(SinkCall::Control(controller, value));
        }
    }

    fn note(name: &str, duration: f64, chord: bool) -> MeasureChild {
        MeasureChild::Note(ParsedNote {
            chord,
            pitch: Pitch::from_name(name),
            duration,
            ..Default::default()
        })
    }

    /// One right-hand part: an E4+C4 chord (E first in document order),
    /// then a single G4.
    fn chord_then_single() -> PlayableScore {
        let score = ParsedScore {
            parts: vec![Part {
                id: "P1".to_string(),
                name: "piano".to_string(),
                measures: vec![Measure {
                    number: 1,
                    children: vec![
                        MeasureChild::Attributes(MeasureAttributes {
                            divisions: Some(1.0),
                            time: Some(TimeSignature {
                                beats: 4.0,
                                beat_type: 4.0,
                            }),
                            clef_sign: Some("G".to_string()),
                        }),
                        note("E4", 2.0, false),
                        note("C4", 2.0, true),
                        note("G4", 2.0, false),
                    ],
                }],
            }],
        };
        ScoreBuilder::new(BuilderOptions::default()).build(&score).score
    }

    fn press(matcher: &mut PlaybackMatcher, sink: &mut RecordingSink, pitch: u8) {
        matcher.handle_event(KeyEvent::NoteOn { pitch, velocity: 80 }, sink);
    }

    fn release(matcher: &mut PlaybackMatcher, sink: &mut RecordingSink, pitch: u8) {
        matcher.handle_event(KeyEvent::NoteOff { pitch }, sink);
    }

    #[test]
    fn chord_completion_zips_sorted_presses_with_stored_order() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        // First press alone makes no sound.
        press(&mut matcher, &mut sink, 60);
        assert!(sink.calls.is_empty());
        assert_eq!(matcher.cursors().0, 0);

        press(&mut matcher, &mut sink, 64);
        // Stored order is [E4, C4]; sorted presses are [60, 64], so the
        // lower physical key sounds E4 and the higher sounds C4.
        assert_eq!(
            sink.calls,
            vec![SinkCall::Play(64, 80), SinkCall::Play(60, 80)]
        );
        assert_eq!(matcher.cursors().0, 1);
    }

    #[test]
    fn duplicate_pending_press_is_ignored() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        press(&mut matcher, &mut sink, 62);
        press(&mut matcher, &mut sink, 62);
        assert!(sink.calls.is_empty());
        assert_eq!(matcher.cursors().0, 0);
    }

    #[test]
    fn release_before_completion_is_deferred() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        press(&mut matcher, &mut sink, 60);
        release(&mut matcher, &mut sink, 60);
        assert!(sink.calls.is_empty());

        // Completing the chord plays both notes, then honors the pending
        // release of key 60 (which sounded E4 = 64).
        press(&mut matcher, &mut sink, 64);
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Play(64, 80),
                SinkCall::Play(60, 80),
                SinkCall::Stop(64)
            ]
        );
    }

    #[test]
    fn unknown_release_is_a_no_op() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        release(&mut matcher, &mut sink, 72);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn events_after_the_part_ends_are_ignored() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        press(&mut matcher, &mut sink, 60);
        press(&mut matcher, &mut sink, 64);
        press(&mut matcher, &mut sink, 67);
        sink.calls.clear();

        press(&mut matcher, &mut sink, 65);
        assert!(sink.calls.is_empty());
        assert_eq!(matcher.cursors().0, 2);
    }

    #[test]
    fn pass_through_sounds_the_whole_set_per_press() {
        let score = chord_then_single();
        let options = MatcherOptions {
            mode: MatchMode::PassThrough,
            ..Default::default()
        };
        let mut matcher = PlaybackMatcher::new(&score, options);
        let mut sink = RecordingSink::default();

        press(&mut matcher, &mut sink, 61);
        assert_eq!(
            sink.calls,
            vec![SinkCall::Play(64, 80), SinkCall::Play(60, 80)]
        );
        assert_eq!(matcher.cursors().0, 1);

        release(&mut matcher, &mut sink, 61);
        assert_eq!(sink.calls[2..], [SinkCall::Stop(64), SinkCall::Stop(60)]);
    }

    #[test]
    fn control_changes_are_forwarded() {
        let score = chord_then_single();
        let mut matcher = PlaybackMatcher::new(&score, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        matcher.handle_event(
            KeyEvent::ControlChange {
                controller: 64,
                value: 127,
            },
            &mut sink,
        );
        assert_eq!(sink.calls, vec![SinkCall::Control(64, 127)]);
    }

    #[test]
    fn hands_advance_independently() {
        // Right hand C5, left hand C3 at the same onset via backup.
        let score = ParsedScore {
            parts: vec![Part {
                id: "P1".to_string(),
                name: "piano".to_string(),
                measures: vec![Measure {
                    number: 1,
                    children: vec![
                        MeasureChild::Attributes(MeasureAttributes {
                            divisions: Some(1.0),
                            time: Some(TimeSignature {
                                beats: 4.0,
                                beat_type: 4.0,
                            }),
                            clef_sign: Some("G".to_string()),
                        }),
                        note("C5", 4.0, false),
                        MeasureChild::Backup { duration: 4.0 },
                        MeasureChild::Note(ParsedNote {
                            pitch: Pitch::from_name("C3"),
                            duration: 4.0,
                            staff: Some(2),
                            ..Default::default()
                        }),
                    ],
                }],
            }],
        };
        let built = ScoreBuilder::new(BuilderOptions::default()).build(&score).score;
        let mut matcher = PlaybackMatcher::new(&built, MatcherOptions::default());
        let mut sink = RecordingSink::default();

        press(&mut matcher, &mut sink, 48);
        assert_eq!(matcher.cursors(), (0, 1));
        assert_eq!(sink.calls, vec![SinkCall::Play(48, 80)]);

        press(&mut matcher, &mut sink, 72);
        assert_eq!(matcher.cursors(), (1, 1));
        assert_eq!(sink.calls[1..], [SinkCall::Play(72, 80)]);
    }
}
