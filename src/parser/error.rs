//! Error types for record loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading an input file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error("cannot read '{path}': {source}\n  Suggestion: check the path and permissions")]
    Read {
        /// Input file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The JSON input is not an array of records.
    #[error(
        "invalid JSON records in '{path}': {source}\n  Suggestion: provide an array of objects with title/authors/identifiers fields"
    )]
    Json {
        /// Input file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The file parsed but produced no usable record.
    #[error("no records found in '{path}'{detail}")]
    Empty {
        /// Input file.
        path: PathBuf,
        /// First skip message, when entries were rejected.
        detail: String,
    },
}

impl ParseError {
    /// Creates an `Empty` error, quoting the first rejected entry when present.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>, skipped: &[String]) -> Self {
        let detail = skipped
            .first()
            .map(|first| format!(": {first}"))
            .unwrap_or_default();
        Self::Empty {
            path: path.into(),
            detail,
        }
    }
}
