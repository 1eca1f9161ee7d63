//! Load-abort errors.
//!
//! Only three things stop a score load: a bad file extension, XML the
//! tokenizer cannot read, and a document with no `<score-partwise>`
//! container. Everything else downstream degrades to a warning carried
//! alongside the result.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' does not have a valid MusicXML file extension (.xml or .musicxml)")]
    InvalidExtension { path: String },

    #[error("unable to parse MusicXML document: {0}")]
    XmlSyntax(String),

    #[error("not a valid MusicXML file: no top-level <score-partwise> element was found")]
    MalformedDocument,
}
