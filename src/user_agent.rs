//! Browser-like request identity shared by every outbound HTTP request.
//!
//! Publisher sites routinely reject obvious tool traffic, so all fetches present
//! the same desktop Chrome fingerprint. Keeping it in one place stops the header
//! set drifting between resolvers.

use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, DNT, HeaderMap, HeaderValue, REFERER, UPGRADE_INSECURE_REQUESTS,
};

/// Desktop Chrome User-Agent sent with every request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header preferring PDF payloads over HTML.
const ACCEPT_PDF: &str = "application/pdf,application/octet-stream,text/html;q=0.9,*/*;q=0.8";

/// Builds the default header set applied to the shared HTTP client.
#[must_use]
pub(crate) fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_PDF));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.google.com/"));
    headers
}
