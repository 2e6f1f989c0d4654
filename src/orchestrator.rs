//! Acquisition orchestrator: runs the strategy cascade over a batch of records.
//!
//! Records are processed one at a time in input order. For each record the
//! orchestrator
//! 1. skips it when a valid PDF already sits at its destination,
//! 2. recovers a DOI from the title through Crossref when the record has
//!    neither a DOI nor a preprint ID,
//! 3. tries each enabled strategy in cascade order and stops at the first
//!    validated PDF, which is written atomically to the destination,
//! 4. records every strategy's failure when the cascade is exhausted.
//!
//! A record's failure never aborts the batch; only output-directory I/O is
//! fatal. The shared browser session is closed exactly once when the batch
//! ends, whatever the exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::AcquisitionConfig;
use crate::download::{Destination, HttpClient, RateLimiter};
use crate::ledger::{FAILED_BIB_FILE, FAILED_CSV_FILE, FailureLedger, StrategyFailure};
use crate::record::BibliographicRecord;
use crate::resolver::CrossrefResolver;
use crate::session_log::SessionLog;
use crate::stats::AcquisitionStats;
use crate::strategy::{Strategy, build_cascade};

/// Fatal orchestrator errors: the output directory is unusable.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The output directory could not be created or opened.
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        /// Output directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A file inside the output directory could not be written or removed.
    #[error("cannot write {path}: {source}")]
    Write {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Terminal outcome for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A strategy produced a validated PDF, now at `path`.
    Success {
        /// Strategy that succeeded.
        strategy: String,
        /// Destination file.
        path: PathBuf,
        /// Bytes written.
        byte_size: u64,
    },
    /// Every enabled strategy failed.
    Failure {
        /// One reason per strategy attempted, in cascade order.
        reasons_tried: Vec<StrategyFailure>,
    },
    /// A valid PDF was already present; nothing was fetched.
    Skipped {
        /// Existing file.
        path: PathBuf,
    },
}

impl RecordOutcome {
    /// True for [`RecordOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for progress output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "downloaded",
            Self::Failure { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionReport {
    /// One outcome per processed record, in input order.
    pub outcomes: Vec<RecordOutcome>,
    /// Exhausted records.
    pub ledger: FailureLedger,
    /// Counters and per-strategy successes.
    pub stats: AcquisitionStats,
    /// True when the batch stopped early on the cancel flag.
    pub cancelled: bool,
}

/// Per-record progress callbacks.
pub trait AcquisitionObserver: Send + Sync {
    /// Called before record `index` is processed.
    fn record_started(&self, index: usize, record: &BibliographicRecord) {
        let _ = (index, record);
    }

    /// Called after record `index` reached `outcome`.
    fn record_finished(&self, index: usize, outcome: &RecordOutcome) {
        let _ = (index, outcome);
    }
}

struct NoopObserver;

impl AcquisitionObserver for NoopObserver {}

/// Runs batches of records through the strategy cascade.
pub struct Orchestrator {
    config: AcquisitionConfig,
    strategies: Vec<Box<dyn Strategy>>,
    title_lookup: Option<CrossrefResolver>,
    browser: Option<Arc<BrowserSession>>,
    cancel: Arc<AtomicBool>,
    observer: Box<dyn AcquisitionObserver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("cancelled", &self.cancel.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds the standard cascade from `config`.
    #[must_use]
    pub fn new(config: AcquisitionConfig) -> Self {
        let client = HttpClient::new()
            .with_timeout(config.timeout)
            .with_rate_limiter(Arc::new(RateLimiter::new(config.polite_delay)));
        let browser = config
            .is_enabled("browser")
            .then(|| Arc::new(BrowserSession::chromium(config.browser.clone())));
        let strategies = build_cascade(&config, &client, browser.clone());
        let title_lookup = config.is_enabled("crossref").then(|| {
            CrossrefResolver::new(client.clone(), config.contact_email.clone())
                .with_title_thresholds(config.title_min_score, config.title_min_similarity)
        });
        Self {
            config,
            strategies,
            title_lookup,
            browser,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: Box::new(NoopObserver),
        }
    }

    /// Uses a caller-supplied cascade. `browser`, when given, is closed at batch end.
    #[must_use]
    pub fn with_strategies(
        config: AcquisitionConfig,
        strategies: Vec<Box<dyn Strategy>>,
        browser: Option<Arc<BrowserSession>>,
    ) -> Self {
        Self {
            config,
            strategies,
            title_lookup: None,
            browser,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: Box::new(NoopObserver),
        }
    }

    /// Replaces the title-to-DOI lookup.
    #[must_use]
    pub fn with_title_lookup(mut self, lookup: Option<CrossrefResolver>) -> Self {
        self.title_lookup = lookup;
        self
    }

    /// Shares an externally owned cancel flag (set by Ctrl-C in the CLI).
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Installs a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Box<dyn AcquisitionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Flag checked between records; setting it stops the batch after the
    /// current record.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Names of the strategies in the cascade, in order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Processes `records` in order.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] only when the output directory cannot be
    /// created or written; per-record failures are reported in the outcome.
    pub async fn acquire(
        &self,
        records: &[BibliographicRecord],
    ) -> Result<AcquisitionReport, OrchestratorError> {
        let result = self.run_batch(records).await;
        if let Some(browser) = &self.browser {
            browser.close().await;
        }
        result
    }

    async fn run_batch(
        &self,
        records: &[BibliographicRecord],
    ) -> Result<AcquisitionReport, OrchestratorError> {
        let output_dir = self.config.output_dir.clone();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| OrchestratorError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;
        let log = SessionLog::open(&output_dir).map_err(|source| OrchestratorError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        log.block([
            "NEW ACQUISITION SESSION STARTED".to_string(),
            format!("Records: {}", records.len()),
            format!("Output directory: {}", output_dir.display()),
            format!("Strategies: {}", self.strategy_names().join(", ")),
        ]);
        info!(
            records = records.len(),
            output_dir = %output_dir.display(),
            "acquisition batch started"
        );

        let mut report = AcquisitionReport {
            stats: AcquisitionStats::for_batch(records.len()),
            ..AcquisitionReport::default()
        };

        for (index, record) in records.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(remaining = records.len() - index, "batch cancelled");
                log.warn(&format!(
                    "Cancelled; {} record(s) not processed",
                    records.len() - index
                ));
                report.cancelled = true;
                break;
            }
            self.observer.record_started(index, record);
            let outcome = self.process_record(record, &log, &mut report).await?;
            self.observer.record_finished(index, &outcome);
            report.outcomes.push(outcome);
        }

        if !report.ledger.is_empty() {
            for (file, result) in [
                (FAILED_CSV_FILE, report.ledger.export_csv(&output_dir.join(FAILED_CSV_FILE))),
                (FAILED_BIB_FILE, report.ledger.export_bibtex(&output_dir.join(FAILED_BIB_FILE))),
            ] {
                match result {
                    Ok(()) => log.info(&format!("Failed records written to {file}")),
                    Err(error) => {
                        warn!(error = %error, "failure export not written");
                        log.warn(&error.to_string());
                    }
                }
            }
        }

        log.block(report.stats.summary_lines());
        info!(summary = %report.stats, "acquisition batch finished");
        Ok(report)
    }

    #[tracing::instrument(skip_all, fields(record = %record.display_label()))]
    async fn process_record(
        &self,
        record: &BibliographicRecord,
        log: &SessionLog,
        report: &mut AcquisitionReport,
    ) -> Result<RecordOutcome, OrchestratorError> {
        let destination = Destination::for_record(&self.config.output_dir, record);
        let write_error = |source| OrchestratorError::Write {
            path: destination.path().to_path_buf(),
            source,
        };

        if destination.prepare().await.map_err(write_error)? {
            info!(path = %destination.path().display(), "already downloaded");
            log.info(&format!("SKIP: {}", record.display_label()));
            report.stats.record_skip();
            return Ok(RecordOutcome::Skipped {
                path: destination.path().to_path_buf(),
            });
        }

        log.info(&format!("PROCESSING: {}", record.display_label()));
        let working = self.with_recovered_doi(record, log, &mut report.stats).await;
        if let Some(doi) = working.doi() {
            log.info(&format!("  DOI: {doi}"));
        }

        let mut reasons = Vec::new();
        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = name, "attempting");
            match strategy.attempt(&working).await {
                Ok(pdf) => {
                    let byte_size = destination.commit(&pdf.bytes).await.map_err(write_error)?;
                    info!(strategy = name, bytes = byte_size, source = %pdf.source_url, "acquired");
                    log.info(&format!(
                        "  SUCCESS via {name}: {} ({byte_size} bytes) from {}",
                        destination.path().display(),
                        pdf.source_url
                    ));
                    report.stats.record_success(name);
                    return Ok(RecordOutcome::Success {
                        strategy: name.to_string(),
                        path: destination.path().to_path_buf(),
                        byte_size,
                    });
                }
                Err(error) => {
                    if error.is_not_applicable() {
                        debug!(strategy = name, error = %error, "not applicable");
                    } else {
                        info!(strategy = name, kind = %error.kind(), error = %error, "strategy failed");
                        log.info(&format!("  {name}: {error}"));
                    }
                    reasons.push(StrategyFailure::new(name, &error));
                }
            }
        }

        warn!("no strategy produced a PDF");
        log.error("  FAILED: could not acquire from any source");
        if !record.has_doi_or_preprint() {
            log.error("  -> No DOI or preprint ID available");
        }
        report.stats.record_failure();
        report.ledger.record(record.clone(), reasons.clone());
        Ok(RecordOutcome::Failure {
            reasons_tried: reasons,
        })
    }

    /// Copy of `record` with a DOI recovered from its title, when one is
    /// missing and Crossref returns a confident match.
    async fn with_recovered_doi(
        &self,
        record: &BibliographicRecord,
        log: &SessionLog,
        stats: &mut AcquisitionStats,
    ) -> BibliographicRecord {
        let mut working = record.clone();
        let Some(lookup) = &self.title_lookup else {
            return working;
        };
        if record.has_doi_or_preprint() {
            return working;
        }
        let Some(title) = record.title() else {
            return working;
        };

        match lookup.lookup_doi_by_title(title).await {
            Ok(Some(found)) => {
                info!(doi = %found.doi, score = found.score, similarity = found.similarity, "DOI recovered from title");
                log.info(&format!("  DOI found via Crossref: {}", found.doi));
                working.identifiers.doi = Some(found.doi);
                stats.record_doi_found();
            }
            Ok(None) => debug!("no confident Crossref title match"),
            Err(error) => {
                warn!(error = %error, "Crossref title lookup failed");
                log.warn(&format!("  Crossref title lookup failed: {error}"));
            }
        }
        working
    }
}
