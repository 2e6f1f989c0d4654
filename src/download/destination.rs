//! Destination artifact naming and atomic placement.
//!
//! Each record maps to exactly one file, `<output>/<sanitized>.pdf`, where the
//! stem is the record's best identifier with every non-alphanumeric character
//! replaced by `_`, truncated to [`MAX_STEM_CHARS`] characters. Bytes are first
//! written to a `.part` sibling and renamed into place, so a validated file is
//! never observed half-written.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use super::validate::is_valid_pdf;
use crate::record::BibliographicRecord;

/// Maximum characters kept from the identifier.
pub const MAX_STEM_CHARS: usize = 80;

/// Stem used when a record carries no identifier at all.
const FALLBACK_STEM: &str = "untitled";

/// Replaces non-alphanumeric characters with `_` and truncates.
///
/// ```
/// use paperfetch_core::download::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("2101.00001"), "2101_00001");
/// assert_eq!(sanitize_identifier("10.1234/x"), "10_1234_x");
/// ```
#[must_use]
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(MAX_STEM_CHARS)
        .collect()
}

/// Where a record's PDF lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    path: PathBuf,
}

impl Destination {
    /// Computes the destination for `record` under `output_dir`.
    #[must_use]
    pub fn for_record(output_dir: &Path, record: &BibliographicRecord) -> Self {
        let stem = record
            .best_identifier()
            .map(|id| sanitize_identifier(&id))
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| FALLBACK_STEM.to_string());
        Self {
            path: output_dir.join(format!("{stem}.pdf")),
        }
    }

    /// Final path of the artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary sibling written before the rename.
    #[must_use]
    pub fn part_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    /// True when a valid PDF already sits at the destination.
    ///
    /// # Errors
    ///
    /// Returns I/O errors other than "not found".
    pub async fn holds_valid_pdf(&self) -> io::Result<bool> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(is_valid_pdf(&bytes)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Deletes whatever is at the destination unless it is a valid PDF.
    ///
    /// Returns `true` when a valid PDF is present afterwards.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from reading or deleting the file.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn prepare(&self) -> io::Result<bool> {
        if self.holds_valid_pdf().await? {
            return Ok(true);
        }
        if tokio::fs::try_exists(&self.path).await? {
            warn!("removing invalid file left at destination");
            tokio::fs::remove_file(&self.path).await?;
        }
        remove_if_exists(&self.part_path()).await?;
        Ok(false)
    }

    /// Writes `bytes` to the `.part` sibling, then renames into place.
    ///
    /// # Errors
    ///
    /// Returns I/O errors; the `.part` file is removed on failure.
    #[instrument(skip(self, bytes), fields(path = %self.path.display(), bytes = bytes.len()))]
    pub async fn commit(&self, bytes: &[u8]) -> io::Result<u64> {
        let part = self.part_path();
        if let Err(error) = tokio::fs::write(&part, bytes).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(error);
        }
        if let Err(error) = tokio::fs::rename(&part, &self.path).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(error);
        }
        debug!("artifact committed");
        Ok(bytes.len() as u64)
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
