//! Run statistics and the end-of-run summary block.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Counters for one acquisition run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Records handed to the run.
    pub total: usize,
    /// Records whose PDF was acquired this run.
    pub success: usize,
    /// Records that exhausted every strategy.
    pub failed: usize,
    /// Records already holding a valid PDF.
    pub skipped: usize,
    /// DOIs recovered from titles through Crossref.
    pub dois_found: usize,
    /// Successes per strategy name.
    pub by_strategy: BTreeMap<String, usize>,
}

impl AcquisitionStats {
    /// Empty counters for a batch of `total` records.
    #[must_use]
    pub fn for_batch(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Counts a success by `strategy`.
    pub fn record_success(&mut self, strategy: &str) {
        self.success += 1;
        *self.by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
    }

    /// Counts an exhausted record.
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Counts a record skipped because its PDF already exists.
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Counts a DOI recovered from a title.
    pub fn record_doi_found(&mut self) {
        self.dois_found += 1;
    }

    /// Records that reached a terminal outcome.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.success + self.failed + self.skipped
    }

    #[allow(clippy::cast_precision_loss)]
    fn percent(&self, count: usize) -> f64 {
        count as f64 / self.total.max(1) as f64 * 100.0
    }

    /// Lines of the summary block written to the session log.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "DOWNLOAD SESSION SUMMARY".to_string(),
            format!("Total records: {}", self.total),
            format!(
                "Successfully downloaded: {} ({:.1}%)",
                self.success,
                self.percent(self.success)
            ),
            format!("Already downloaded (skipped): {}", self.skipped),
            format!(
                "Failed to download: {} ({:.1}%)",
                self.failed,
                self.percent(self.failed)
            ),
        ];
        if self.dois_found > 0 {
            lines.push(format!("DOIs found via Crossref: {}", self.dois_found));
        }
        if !self.by_strategy.is_empty() {
            lines.push("Downloads by method:".to_string());
            lines.extend(
                self.by_strategy
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(strategy, count)| format!("  {strategy}: {count}")),
            );
        }
        lines
    }
}

impl fmt::Display for AcquisitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed of {}",
            self.success, self.skipped, self.failed, self.total
        )
    }
}
