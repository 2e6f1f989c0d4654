//! Failure ledger: one entry per record that exhausted every strategy.
//!
//! Append-only during a run. Exported at batch end as
//! `failed_downloads.csv` (for spreadsheets) and `failed_downloads.bib`
//! (to re-import into a reference manager and fetch by hand).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::download::sanitize_identifier;
use crate::error::{AcquisitionError, ErrorKind};
use crate::record::BibliographicRecord;

/// CSV export file name inside the output directory.
pub const FAILED_CSV_FILE: &str = "failed_downloads.csv";

/// BibTeX export file name inside the output directory.
pub const FAILED_BIB_FILE: &str = "failed_downloads.bib";

/// Why one strategy did not produce a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    /// Strategy name.
    pub strategy: String,
    /// Coarse classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

impl StrategyFailure {
    /// Captures `error` raised by `strategy`.
    #[must_use]
    pub fn new(strategy: &str, error: &AcquisitionError) -> Self {
        Self {
            strategy: strategy.to_string(),
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.strategy, self.kind, self.detail)
    }
}

/// A record nothing could acquire, with every strategy's reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The record as given.
    pub record: BibliographicRecord,
    /// Reasons in the order the strategies ran.
    pub reasons: Vec<StrategyFailure>,
}

/// Failure export errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Writing the CSV export failed.
    #[error("failed to write CSV export {path}: {source}")]
    Csv {
        /// Target file.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Writing the BibTeX export failed.
    #[error("failed to write BibTeX export {path}: {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    authors: String,
    doi: &'a str,
    pmid: &'a str,
    preprint_id: &'a str,
    url: &'a str,
    reasons: String,
}

/// Append-only collection of exhausted records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLedger {
    entries: Vec<LedgerEntry>,
}

impl FailureLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&mut self, record: BibliographicRecord, reasons: Vec<StrategyFailure>) {
        self.entries.push(LedgerEntry { record, reasons });
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the CSV export.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Csv`] when the file cannot be written.
    pub fn export_csv(&self, path: &Path) -> Result<(), LedgerError> {
        let csv_error = |source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        if self.entries.is_empty() {
            writer
                .write_record(["title", "authors", "doi", "pmid", "preprint_id", "url", "reasons"])
                .map_err(csv_error)?;
        }
        for entry in &self.entries {
            let ids = &entry.record.identifiers;
            writer
                .serialize(CsvRow {
                    title: &entry.record.title,
                    authors: entry.record.authors.join("; "),
                    doi: ids.doi.as_deref().unwrap_or_default(),
                    pmid: ids.pmid.as_deref().unwrap_or_default(),
                    preprint_id: ids.preprint_id.as_deref().unwrap_or_default(),
                    url: ids.landing_url.as_deref().unwrap_or_default(),
                    reasons: entry
                        .reasons
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" | "),
                })
                .map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|e| csv_error(csv::Error::from(e)))?;
        debug!(path = %path.display(), entries = self.entries.len(), "CSV failure export written");
        Ok(())
    }

    /// Writes the BibTeX export.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] when the file cannot be written.
    pub fn export_bibtex(&self, path: &Path) -> Result<(), LedgerError> {
        let mut out = String::new();
        for (index, entry) in self.entries.iter().enumerate() {
            out.push_str(&bibtex_entry(index, entry));
            out.push('\n');
        }
        std::fs::write(path, out).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.entries.len(), "BibTeX failure export written");
        Ok(())
    }
}

/// Braces would unbalance the field delimiters.
fn bib_value(value: &str) -> String {
    value.replace(['{', '}'], "")
}

fn bibtex_entry(index: usize, entry: &LedgerEntry) -> String {
    let record = &entry.record;
    let key = record
        .citation_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map_or_else(
            || {
                let stem = sanitize_identifier(&record.best_identifier().unwrap_or_default());
                if stem.is_empty() {
                    format!("failed{}", index + 1)
                } else {
                    stem
                }
            },
            bib_value,
        );

    let ids = &record.identifiers;
    let mut fields: Vec<(&str, String)> = Vec::new();
    if let Some(title) = record.title() {
        fields.push(("title", bib_value(title)));
    }
    if !record.authors.is_empty() {
        fields.push(("author", bib_value(&record.authors.join(" and "))));
    }
    if let Some(year) = record.year {
        fields.push(("year", year.to_string()));
    }
    for (name, value) in [
        ("doi", &ids.doi),
        ("pmid", &ids.pmid),
        ("eprint", &ids.preprint_id),
        ("url", &ids.landing_url),
    ] {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            fields.push((name, bib_value(value)));
        }
    }
    if !entry.reasons.is_empty() {
        let tried: Vec<&str> = entry.reasons.iter().map(|r| r.strategy.as_str()).collect();
        fields.push(("note", format!("PDF not acquired; tried {}", tried.join(", "))));
    }

    let mut out = format!("@misc{{{key},\n");
    for (name, value) in fields {
        let _ = writeln!(out, "  {name} = {{{value}}},");
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ledger() -> FailureLedger {
        let mut ledger = FailureLedger::new();
        ledger.record(
            BibliographicRecord::titled("A {Curly} Title")
                .with_doi("10.1234/x")
                .with_authors(["Ada Lovelace", "Alan Turing"]),
            vec![
                StrategyFailure::new("unpaywall", &AcquisitionError::not_applicable("no email")),
                StrategyFailure::new("scraper", &AcquisitionError::network("HTTP 503")),
            ],
        );
        ledger
    }

    #[test]
    fn test_strategy_failure_display() {
        let failure = StrategyFailure::new("pmc", &AcquisitionError::network("HTTP 500"));
        assert_eq!(failure.to_string(), "pmc: NetworkError (network error: HTTP 500)");
    }

    #[test]
    fn test_csv_export_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FAILED_CSV_FILE);
        ledger().export_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "title,authors,doi,pmid,preprint_id,url,reasons"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("10.1234/x"));
        assert!(row.contains("Ada Lovelace; Alan Turing"));
        assert!(row.contains("unpaywall: ResolverNotApplicable"));
        assert!(row.contains("scraper: NetworkError"));
    }

    #[test]
    fn test_empty_csv_export_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FAILED_CSV_FILE);
        FailureLedger::new().export_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            "title,authors,doi,pmid,preprint_id,url,reasons"
        );
    }

    #[test]
    fn test_bibtex_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FAILED_BIB_FILE);
        ledger().export_bibtex(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("@misc{10_1234_x,"));
        assert!(text.contains("title = {A Curly Title},"));
        assert!(text.contains("author = {Ada Lovelace and Alan Turing},"));
        assert!(text.contains("note = {PDF not acquired; tried unpaywall, scraper},"));
    }

    #[test]
    fn test_export_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(FAILED_BIB_FILE);
        assert!(matches!(
            ledger().export_bibtex(&path),
            Err(LedgerError::Io { .. })
        ));
    }
}
