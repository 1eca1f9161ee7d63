//! playlib — MusicXML score engine for a follow-along piano trainer.
//!
//! Loads an uncompressed MusicXML (.musicxml/.xml) document, partitions it
//! into per-hand, time-indexed note sets, and matches live keyboard events
//! against the result so the score only advances when the player plays.
//!
//! # Example
//! ```no_run
//! use playlib::{load_file, MatcherOptions, PlaybackMatcher};
//!
//! let loaded = load_file("path/to/score.musicxml").unwrap();
//! println!("length: {} units", loaded.score.length);
//! println!("warnings: {}", loaded.warnings.len());
//!
//! let mut matcher = PlaybackMatcher::new(&loaded.score, MatcherOptions::default());
//! ```

pub mod builder;
pub mod error;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod reader;

use std::path::Path;

pub use builder::{
    BuildLog, BuildOutput, BuilderOptions, PlayableScore, Player, PlayerMapping,
    ScoreBuilder,
};
pub use error::ScoreError;
pub use matcher::{KeyEvent, MatchMode, MatcherOptions, MidiSink, PlaybackMatcher};
pub use model::{ParsedScore, Pitch, Step};
pub use parser::{parse_raw_score, ParsedOutput, ParserWarning};
pub use reader::{read_file, read_str};

/// A fully built score plus everything non-fatal that came up on the way:
/// parser warnings and builder logs are carried alongside the result, never
/// instead of it.
#[derive(Debug, Clone)]
pub struct LoadedScore {
    pub score: PlayableScore,
    pub warnings: Vec<ParserWarning>,
    pub logs: Vec<BuildLog>,
}

/// Load and build a score from a file with default builder options.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<LoadedScore, ScoreError> {
    load_file_with_options(path, &BuilderOptions::default())
}

/// Load and build a score from a file.
pub fn load_file_with_options<P: AsRef<Path>>(
    path: P,
    options: &BuilderOptions,
) -> Result<LoadedScore, ScoreError> {
    let raw = reader::read_file(path)?;
    Ok(build(&raw, options))
}

/// Load and build a score from a MusicXML string with default builder
/// options.
pub fn load_str(xml: &str) -> Result<LoadedScore, ScoreError> {
    let raw = reader::read_str(xml)?;
    Ok(build(&raw, &BuilderOptions::default()))
}

fn build(raw: &reader::RawScore, options: &BuilderOptions) -> LoadedScore {
    let parsed = parser::parse_raw_score(raw);
    let built = ScoreBuilder::new(options.clone()).build(&parsed.score);
    LoadedScore {
        score: built.score,
        warnings: parsed.warnings,
        logs: built.logs,
    }
}

/// Serialize a built score to JSON for the rendering side.
pub fn playable_to_json(score: &PlayableScore) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(score)
}
