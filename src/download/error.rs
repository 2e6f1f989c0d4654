//! Error types for the fetch utility.
//!
//! Every variant carries the URL it concerns so failure reasons stay readable
//! once they are flattened into the failure ledger.

use thiserror::Error;

/// Errors that can occur while fetching a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response other than rate limiting and auth walls.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server kept answering 429 after every retry.
    #[error("HTTP 429 fetching {url}: still rate limited after {attempts} attempts")]
    RateLimited {
        /// The URL that was rate limited.
        url: String,
        /// Total attempts made, including the first.
        attempts: u32,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Authentication or authorization required to access the resource.
    #[error("authentication required for {domain} (HTTP {status}) fetching {url}")]
    AuthRequired {
        /// The URL that requires authentication.
        url: String,
        /// The HTTP status code (401, 403, 407, or 0 for login redirect).
        status: u16,
        /// The domain requiring authentication.
        domain: String,
    },

    /// Response body could not be decoded as the expected JSON shape.
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a rate-limit exhaustion error.
    pub fn rate_limited(url: impl Into<String>, attempts: u32) -> Self {
        Self::RateLimited {
            url: url.into(),
            attempts,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an authentication-required error.
    pub fn auth_required(url: impl Into<String>, status: u16, domain: impl Into<String>) -> Self {
        Self::AuthRequired {
            url: url.into(),
            status,
            domain: domain.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::AuthRequired { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
