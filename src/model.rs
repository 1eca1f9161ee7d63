//! Data model for a parsed MusicXML score.
//!
//! These structures hold exactly the musical information the builder
//! pipeline and the playback matcher need: parts, measures, and the
//! ordered measure children (notes, backups, forwards, attributes) in
//! document order.

use serde::{Deserialize, Serialize};

/// A complete score parsed from MusicXML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedScore {
    /// Musical parts in document order.
    pub parts: Vec<Part>,
}

/// A musical part (one instrument).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier from the part-list (e.g., "P1").
    pub id: String,
    /// Part name, trimmed and lower-cased (e.g., "piano").
    pub name: String,
    /// Ordered list of measures.
    pub measures: Vec<Measure>,
}

/// A single measure (bar) of music.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Measure number as written in the document.
    pub number: i32,
    /// Measure contents in document order.
    pub children: Vec<MeasureChild>,
}

/// One entry in a measure's document-order child sequence.
///
/// MusicXML interleaves notes with clock-control elements (`<backup>`,
/// `<forward>`) and context changes (`<attributes>`); the partition stage
/// replays this sequence against a virtual clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MeasureChild {
    Note(ParsedNote),
    Backup { duration: f64 },
    Forward { duration: f64 },
    Attributes(MeasureAttributes),
}

/// Musical context that changes at measure boundaries and applies forward
/// until overridden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureAttributes {
    /// Divisions per quarter note (duration resolution for this part).
    pub divisions: Option<f64>,
    /// Time signature.
    pub time: Option<TimeSignature>,
    /// Clef sign ("G", "F", "C").
    pub clef_sign: Option<String>,
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (e.g., 3 in 3/4).
    pub beats: f64,
    /// Denominator (e.g., 4 in 3/4).
    pub beat_type: f64,
}

/// A single note or rest.
///
/// Created by the parser; the builder stages rewrite `duration` during
/// normalization, stamp `measure` during partitioning, and fill
/// `display_pitch` during simplification. Once the pipeline output is
/// frozen into a [`crate::builder::PlayableScore`] the note is read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedNote {
    /// Sounds simultaneously with the immediately preceding non-chord note.
    pub chord: bool,
    /// Notated rest or silence.
    pub rest: bool,
    /// Cue note — printed but not assigned to a performer.
    pub cue: bool,
    /// Grace note — ornamental, zero effective duration.
    pub grace: bool,
    /// Pitch; `None` for rests.
    pub pitch: Option<Pitch>,
    /// Display-adjusted pitch, derived by the simplification stage.
    pub display_pitch: Option<Pitch>,
    /// Duration: division units in the document, normalized pipeline units
    /// after partitioning.
    pub duration: f64,
    /// Voice number for multi-voice writing.
    pub voice: Option<i32>,
    /// Staff number (1-based); absent means staff 1.
    pub staff: Option<i32>,
    /// Tuplet ratio.
    pub time_modification: Option<TimeModification>,
    /// Tie markers found under `<notations>`. Other notation kinds are
    /// intentionally not retained in this version.
    pub ties: Vec<TieKind>,
    /// Absolute measure index, assigned during partitioning.
    pub measure: usize,
}

impl ParsedNote {
    /// True if this note carries the given tie marker.
    pub fn has_tie(&self, kind: TieKind) -> bool {
        self.ties.contains(&kind)
    }
}

/// A tie marker from `<notations><tied type=".."/></notations>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieKind {
    Start,
    Stop,
    Continue,
}

/// Tuplet ratio: `actual_notes` played in the time of `normal_notes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeModification {
    pub actual_notes: f64,
    pub normal_notes: f64,
}

/// A step of the diatonic scale, A through G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Step {
    /// Semitone offset of this step above C.
    pub fn semitone(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }

    pub fn from_char(c: char) -> Option<Step> {
        match c {
            'A' => Some(Step::A),
            'B' => Some(Step::B),
            'C' => Some(Step::C),
            'D' => Some(Step::D),
            'E' => Some(Step::E),
            'F' => Some(Step::F),
            'G' => Some(Step::G),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Step::A => 'A',
            Step::B => 'B',
            Step::C => 'C',
            Step::D => 'D',
            Step::E => 'E',
            Step::F => 'F',
            Step::G => 'G',
        }
    }
}

/// Pitch: diatonic step, chromatic alteration, octave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitch {
    /// Note name, A through G.
    pub step: Step,
    /// Chromatic alteration in semitones (-1 = flat, 1 = sharp). Decimal
    /// values are microtones; only the floored integer part is meaningful
    /// for keyboard playback.
    pub alter: Option<f64>,
    /// Octave 0-9, where 4 is the octave containing middle C.
    pub octave: i32,
}

/// MIDI defines C0 as note number 12.
const C0_VALUE: i32 = 12;
const OCTAVE_SEMITONES: i32 = 12;

impl Pitch {
    /// Convert to a MIDI note number. Middle C (C4) = 60.
    pub fn to_midi(&self) -> i32 {
        // Microtonal alters can't be played on a piano; floor them.
        let alter = match self.alter {
            Some(a) if a != 0.0 => a.floor() as i32,
            _ => 0,
        };
        C0_VALUE + self.octave * OCTAVE_SEMITONES + self.step.semitone() + alter
    }

    /// Format as a note name like `C4`, `F#3`, or `Eb5`.
    pub fn name(&self) -> String {
        let accidental = match self.alter.map(|a| a.floor() as i32) {
            Some(-1) => "b",
            Some(1) => "#",
            _ => "",
        };
        format!("{}{}{}", self.step.as_char(), accidental, self.octave)
    }

    /// Parse a note name like `C4`, `A#3`, or `Bb2`. Every `#` raises and
    /// every `b` lowers by one semitone.
    pub fn from_name(s: &str) -> Option<Pitch> {
        let step = Step::from_char(s.chars().next()?)?;
        let octave = s.chars().last()?.to_digit(10)? as i32;
        let sharps = s.chars().filter(|&c| c == '#').count() as f64;
        let flats = s.chars().skip(1).filter(|&c| c == 'b').count() as f64;
        let alter = sharps - flats;
        Some(Pitch {
            step,
            alter: if alter == 0.0 { None } else { Some(alter) },
            octave,
        })
    }
}
