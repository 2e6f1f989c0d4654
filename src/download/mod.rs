//! Fetch utility, content validation and destination handling.
//!
//! # Features
//!
//! - One pooled [`HttpClient`] with a browser-like header set
//! - Per-request timeout (15s for arXiv, 30s elsewhere by default)
//! - Bounded exponential backoff on HTTP 429 ([`BackoffPolicy`])
//! - Per-host polite delay ([`RateLimiter`])
//! - PDF gate ([`validate_pdf`]): more than 5000 bytes and a `%PDF` signature
//! - One [`Destination`] per record, written via a `.part` rename
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::download::{HttpClient, validate_pdf};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let body = client.fetch("https://arxiv.org/pdf/2101.00001").await?;
//! validate_pdf(&body.bytes)?;
//! # Ok(())
//! # }
//! ```

mod client;
mod destination;
mod error;
pub mod rate_limiter;
mod retry;
mod validate;

pub use client::{
    DEFAULT_POLITE_DELAY, DEFAULT_TIMEOUT, FetchedBody, HttpClient, JsonReply, MAX_TIMEOUT,
    MIN_TIMEOUT, clamp_timeout,
};
pub use destination::{Destination, MAX_STEM_CHARS, sanitize_identifier};
pub use error::FetchError;
pub use rate_limiter::{RateLimiter, extract_domain};
pub use retry::{BackoffPolicy, DEFAULT_MAX_RETRIES, RetryDecision};
pub use validate::{MIN_PDF_BYTES, PDF_SIGNATURE, ValidationError, is_valid_pdf, validate_pdf};

// Note: no module-local Result aliases. Use `Result<T, FetchError>` explicitly.
