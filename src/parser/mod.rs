//! Record loading from bibliography files.
//!
//! # Supported formats
//!
//! - BibTeX (`@article`, `@inproceedings`, `@book`, `@misc`, `@phdthesis`,
//!   `@techreport`)
//! - JSON: an array of record objects
//! - RIS: `TY  - ` ... `ER  - ` entries (`.ris` exports from reference managers)
//!
//! # Example
//!
//! ```
//! use paperfetch_core::parser::parse_bibtex;
//!
//! let result = parse_bibtex("@article{k, title={A Paper}, doi={10.1234/x}}");
//! assert_eq!(result.records.len(), 1);
//! assert_eq!(result.records[0].doi(), Some("10.1234/x"));
//! ```

mod bibtex;
mod error;
mod json;
mod ris;

pub use bibtex::{BibtexParseResult, parse_bibtex};
pub use error::ParseError;
pub use json::{JsonParseResult, parse_json_records};
pub use ris::{RisParseResult, parse_ris};

use std::path::Path;

use tracing::{info, warn};

use crate::record::BibliographicRecord;

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// BibTeX bibliography.
    Bibtex,
    /// JSON array of records.
    Json,
    /// RIS tagged export.
    Ris,
}

impl InputFormat {
    /// Picks the format from the file extension, else from the content:
    /// a leading `[` means JSON, a leading `TY  -` tag means RIS.
    #[must_use]
    pub fn detect(path: &Path, content: &str) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("bib" | "bibtex") => Self::Bibtex,
            Some("ris") => Self::Ris,
            _ if content.trim_start().starts_with('[') => Self::Json,
            _ if content.trim_start_matches('\u{feff}').trim_start().starts_with("TY  -") => {
                Self::Ris
            }
            _ => Self::Bibtex,
        }
    }
}

/// Records loaded from one file.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    /// Records in file order.
    pub records: Vec<BibliographicRecord>,
    /// Entries that were rejected, with What/Why/Fix messages.
    pub skipped: Vec<String>,
}

/// Loads records from `path`.
///
/// # Errors
///
/// Returns [`ParseError::Read`] when the file cannot be read,
/// [`ParseError::Json`] for JSON that is not an array, and
/// [`ParseError::Empty`] when no record could be built.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn load_records(path: &Path) -> Result<LoadedRecords, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let loaded = match InputFormat::detect(path, &content) {
        InputFormat::Json => {
            let parsed = parse_json_records(&content).map_err(|source| ParseError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            LoadedRecords {
                records: parsed.records,
                skipped: parsed.skipped,
            }
        }
        InputFormat::Bibtex => {
            let parsed = parse_bibtex(&content);
            LoadedRecords {
                records: parsed.records,
                skipped: parsed.skipped,
            }
        }
        InputFormat::Ris => {
            let parsed = parse_ris(&content);
            LoadedRecords {
                records: parsed.records,
                skipped: parsed.skipped,
            }
        }
    };

    for message in &loaded.skipped {
        warn!(message = %message, "input entry skipped");
    }
    if loaded.records.is_empty() {
        return Err(ParseError::empty(path, &loaded.skipped));
    }
    info!(
        records = loaded.records.len(),
        skipped = loaded.skipped.len(),
        "records loaded"
    );
    Ok(loaded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension_then_content() {
        assert_eq!(InputFormat::detect(Path::new("a.json"), "@article{}"), InputFormat::Json);
        assert_eq!(InputFormat::detect(Path::new("a.BIB"), "[]"), InputFormat::Bibtex);
        assert_eq!(InputFormat::detect(Path::new("refs"), "  [{}]"), InputFormat::Json);
        assert_eq!(InputFormat::detect(Path::new("refs.txt"), "@misc{k,}"), InputFormat::Bibtex);
        assert_eq!(InputFormat::detect(Path::new("refs.RIS"), "@misc{k,}"), InputFormat::Ris);
        assert_eq!(
            InputFormat::detect(Path::new("export"), "\nTY  - JOUR\nER  -"),
            InputFormat::Ris
        );
    }

    #[test]
    fn test_load_records_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let bib = dir.path().join("refs.bib");
        std::fs::write(&bib, "@article{k, title={T}, doi={10.1/t}}\n@online{x, title={O}}").unwrap();
        let loaded = load_records(&bib).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.skipped.len(), 1);

        let json = dir.path().join("refs.json");
        std::fs::write(&json, r#"[{"title": "J"}]"#).unwrap();
        assert_eq!(load_records(&json).unwrap().records[0].title, "J");

        let ris = dir.path().join("refs.ris");
        std::fs::write(
            &ris,
            "TY  - JOUR\nTI  - R\nDO  - 10.1/r\nER  - \nTY  - JOUR\nPY  - 1999\nER  - \n",
        )
        .unwrap();
        let loaded = load_records(&ris).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].doi(), Some("10.1/r"));
        assert_eq!(loaded.skipped.len(), 1);
    }

    #[test]
    fn test_load_records_ris_without_usable_entries_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ris = dir.path().join("broken.ris");
        std::fs::write(&ris, "TY  - JOUR\nTI  - never closed\n").unwrap();
        assert!(matches!(load_records(&ris), Err(ParseError::Empty { .. })));
    }

    #[test]
    fn test_load_records_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_records(&dir.path().join("missing.bib")),
            Err(ParseError::Read { .. })
        ));

        let empty = dir.path().join("empty.bib");
        std::fs::write(&empty, "% nothing here").unwrap();
        assert!(matches!(load_records(&empty), Err(ParseError::Empty { .. })));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{").unwrap();
        assert!(matches!(load_records(&bad), Err(ParseError::Json { .. })));
    }
}
