//! Paperfetch Core Library
//!
//! Acquires full-text PDFs for bibliographic records through an ordered
//! cascade of retrieval strategies, with a headless-browser fallback for
//! publishers that only serve rendered pages.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`record`] - Bibliographic record model and identifier helpers
//! - [`parser`] - BibTeX, RIS and JSON record loading
//! - [`download`] - Fetch utility, content gate, destination handling
//! - [`resolver`] - Candidate-URL resolvers, one per acquisition route
//! - [`browser`] - Browser session controller and publisher recipes
//! - [`strategy`] - Resolve-fetch-validate strategies and the cascade
//! - [`orchestrator`] - Batch driver, outcomes, cancellation
//! - [`ledger`] - Failure ledger with CSV and BibTeX exports
//! - [`stats`], [`session_log`] - Run statistics and the plain-text session log
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::{AcquisitionConfig, BibliographicRecord, Orchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AcquisitionConfig::new("papers").with_contact_email("me@example.org");
//! let records = vec![BibliographicRecord::titled("Attention Is All You Need")];
//! let report = Orchestrator::new(config).acquire(&records).await?;
//! println!("{}", report.stats);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod config;
pub mod download;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod parser;
pub mod record;
pub mod resolver;
pub mod session_log;
pub mod stats;
pub mod strategy;
pub(crate) mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use browser::{BrowserError, BrowserOptions, BrowserSession, SessionMode, SessionState};
pub use config::{AcquisitionConfig, STRATEGY_ORDER};
pub use download::{Destination, FetchError, HttpClient, RateLimiter, ValidationError, validate_pdf};
pub use error::{AcquisitionError, ErrorKind};
pub use ledger::{FailureLedger, LedgerEntry, StrategyFailure};
pub use orchestrator::{
    AcquisitionObserver, AcquisitionReport, Orchestrator, OrchestratorError, RecordOutcome,
};
pub use parser::{LoadedRecords, ParseError, load_records};
pub use record::{BibliographicRecord, Identifiers};
pub use stats::AcquisitionStats;
pub use strategy::{AcquiredPdf, Strategy, build_cascade};
