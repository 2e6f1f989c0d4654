//! Error taxonomy shared by every acquisition strategy.
//!
//! Strategy failures are values, not control flow: each resolver or browser
//! step produces an [`AcquisitionError`], the orchestrator records its
//! [`ErrorKind`] against the strategy name and moves on.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::browser::BrowserError;
use crate::download::{FetchError, ValidationError};

/// Coarse classification recorded in failure reasons and ledger exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Timeout, connection refusal, or non-2xx status.
    NetworkError,
    /// Wrong signature or undersized payload.
    ContentValidationError,
    /// Paywall or login wall detected.
    AuthRequired,
    /// Browser navigation or render capture failed.
    RenderCaptureError,
    /// The record's identifiers are insufficient for this strategy.
    ResolverNotApplicable,
}

impl ErrorKind {
    /// Stable label used in logs and exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "NetworkError",
            Self::ContentValidationError => "ContentValidationError",
            Self::AuthRequired => "AuthRequired",
            Self::RenderCaptureError => "RenderCaptureError",
            Self::ResolverNotApplicable => "ResolverNotApplicable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure of a single strategy attempt.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Network-level failure or unexpected HTTP status.
    #[error("network error: {detail}")]
    Network {
        /// What failed, including the URL.
        detail: String,
    },

    /// A payload came back but is not an acceptable PDF.
    #[error("content rejected from {url}: {reason}")]
    ContentValidation {
        /// Where the payload came from.
        url: String,
        /// Why it was rejected.
        #[source]
        reason: ValidationError,
    },

    /// The resource sits behind a login or paywall.
    #[error("authentication required for {domain}: {detail}")]
    AuthRequired {
        /// Domain that demanded credentials.
        domain: String,
        /// What signalled the wall (status code, login redirect).
        detail: String,
    },

    /// Browser navigation or rendering failed.
    #[error("browser capture failed: {detail}")]
    RenderCapture {
        /// What went wrong in the browser session.
        detail: String,
    },

    /// The strategy cannot run for this record.
    #[error("not applicable: {reason}")]
    NotApplicable {
        /// Which identifier or setting is missing.
        reason: String,
    },
}

impl AcquisitionError {
    /// Creates a network error.
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    /// Creates a content validation error.
    pub fn content(url: impl Into<String>, reason: ValidationError) -> Self {
        Self::ContentValidation {
            url: url.into(),
            reason,
        }
    }

    /// Creates an auth-required error.
    pub fn auth_required(domain: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::AuthRequired {
            domain: domain.into(),
            detail: detail.into(),
        }
    }

    /// Creates a render capture error.
    pub fn render_capture(detail: impl Into<String>) -> Self {
        Self::RenderCapture {
            detail: detail.into(),
        }
    }

    /// Creates a not-applicable marker.
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable {
            reason: reason.into(),
        }
    }

    /// Returns the coarse classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::NetworkError,
            Self::ContentValidation { .. } => ErrorKind::ContentValidationError,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::RenderCapture { .. } => ErrorKind::RenderCaptureError,
            Self::NotApplicable { .. } => ErrorKind::ResolverNotApplicable,
        }
    }

    /// True for the not-applicable marker.
    #[must_use]
    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Self::NotApplicable { .. })
    }
}

impl From<FetchError> for AcquisitionError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::AuthRequired { domain, status, url } => {
                let detail = if status == 0 {
                    format!("redirected to a login page while fetching {url}")
                } else {
                    format!("HTTP {status} fetching {url}")
                };
                Self::AuthRequired { domain, detail }
            }
            other => Self::network(other.to_string()),
        }
    }
}

impl From<BrowserError> for AcquisitionError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Validation { url, reason } => Self::ContentValidation { url, reason },
            other => Self::render_capture(other.to_string()),
        }
    }
}
