//! Shared HTTP fetch utility.
//!
//! Every resolver goes through [`HttpClient`] so that they all present the
//! same browser-like identity, respect the same per-host polite delay, and
//! classify failures the same way:
//!
//! - 2xx returns the body
//! - 429 is retried with bounded exponential backoff ([`BackoffPolicy`])
//! - 401/403/407 and HTML login redirects become [`FetchError::AuthRequired`]
//! - any other status fails immediately with [`FetchError::HttpStatus`]

use std::panic::catch_unwind;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder, Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::FetchError;
use super::rate_limiter::RateLimiter;
use super::retry::{BackoffPolicy, RetryDecision};
use crate::user_agent::{BROWSER_USER_AGENT, browser_headers};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound for any configured request timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for any configured request timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to arXiv hosts, which either answer quickly or not at all.
const ARXIV_TIMEOUT: Duration = Duration::from_secs(15);

/// Default polite delay between requests to one host.
pub const DEFAULT_POLITE_DELAY: Duration = Duration::from_millis(500);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the cheap reachability probe of local collaborators.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Common URL fragments of login and SSO pages.
const LOGIN_PATTERNS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth/",
    "/sso",
    "/cas/login",
    "/saml",
    "/oauth",
    "/openid",
    "/idp/",
    "/shibboleth",
];

/// A successful response body with the metadata resolvers care about.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL after redirects.
    pub final_url: String,
    /// Value of the Content-Type header, if any.
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub bytes: Vec<u8>,
}

impl FetchedBody {
    /// True when the server labelled the body as HTML.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// JSON reply from an endpoint that may answer 300 Multiple Choices.
#[derive(Debug, Clone)]
pub struct JsonReply {
    /// HTTP status (2xx or 300).
    pub status: u16,
    /// Decoded body.
    pub body: serde_json::Value,
}

/// Pooled HTTP client with polite delay and 429 backoff.
///
/// Cheap to clone; clones share the connection pool, cookie store and
/// rate limiter.
///
/// # Example
///
/// ```no_run
/// use paperfetch_core::download::HttpClient;
///
/// # async fn example() -> Result<(), paperfetch_core::download::FetchError> {
/// let client = HttpClient::new();
/// let body = client.fetch("https://arxiv.org/pdf/2101.00001").await?;
/// println!("{} bytes from {}", body.bytes.len(), body.final_url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default timeout, polite delay and backoff.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration,
    /// which only happens when no TLS backend can be initialised.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = build_client().expect("failed to build HTTP client with static configuration");
        Self {
            client,
            limiter: Arc::new(RateLimiter::new(DEFAULT_POLITE_DELAY)),
            backoff: BackoffPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-request timeout, clamped to 15..=30 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    /// Replaces the polite-delay limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replaces the 429 backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Configured base timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout used for a request to `url`.
    #[must_use]
    pub fn timeout_for(&self, url: &str) -> Duration {
        if is_arxiv_host(url) {
            self.timeout.min(ARXIV_TIMEOUT)
        } else {
            self.timeout
        }
    }

    /// GETs `url` and returns the body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for invalid URLs, network failures, timeouts,
    /// non-2xx statuses, exhausted 429 retries, and login walls.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let response = self.execute(url, || self.client.get(url)).await?;
        let response = ensure_success(url, response)?;
        if let Some(auth) = detect_login_redirect(url, &response) {
            return Err(auth);
        }
        read_body(url, response).await
    }

    /// GETs `url` and decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch), plus [`FetchError::Decode`] when the
    /// body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body.bytes).map_err(|e| FetchError::decode(url, e))
    }

    /// POSTs a JSON body; 300 Multiple Choices is returned rather than failed.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    #[instrument(skip(self, payload), fields(url = %url))]
    pub async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<JsonReply, FetchError> {
        let response = self
            .execute(url, || self.client.post(url).json(payload))
            .await?;
        json_reply(url, response).await
    }

    /// POSTs a `text/plain` body; 300 Multiple Choices is returned rather than failed.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    #[instrument(skip(self, text), fields(url = %url))]
    pub async fn post_text(&self, url: &str, text: &str) -> Result<JsonReply, FetchError> {
        let response = self
            .execute(url, || {
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, "text/plain")
                    .body(text.to_string())
            })
            .await?;
        json_reply(url, response).await
    }

    /// True when anything answers HTTP at `url`, whatever the status.
    ///
    /// Skips the polite delay and backoff; used to probe optional local services.
    #[instrument(skip(self))]
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self.client.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "service reachable");
                true
            }
            Err(error) => {
                debug!(error = %error, "service unreachable");
                false
            }
        }
    }

    /// Sends the request built by `build`, retrying on 429.
    async fn execute<F>(&self, url: &str, build: F) -> Result<Response, FetchError>
    where
        F: Fn() -> RequestBuilder,
    {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let timeout = self.timeout_for(url);
        let mut retries_done = 0;

        loop {
            self.limiter.acquire(url).await;
            let response = build()
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify_send_error(url, e))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            match self.backoff.should_retry(retries_done) {
                RetryDecision::Retry { delay, retry } => {
                    warn!(
                        url = %url,
                        retry,
                        delay_ms = delay.as_millis(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retries_done = retry;
                }
                RetryDecision::GiveUp => {
                    return Err(FetchError::rate_limited(url, retries_done + 1));
                }
            }
        }
    }
}

/// Clamps a configured timeout into the supported 15..=30 second window.
#[must_use]
pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

fn is_arxiv_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == "arxiv.org" || host.ends_with(".arxiv.org"))
}

fn classify_send_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn ensure_success(url: &str, response: Response) -> Result<Response, FetchError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }
    if matches!(status, 401 | 403 | 407) {
        return Err(FetchError::auth_required(url, status, host_of(url)));
    }
    Err(FetchError::http_status(url, status))
}

async fn read_body(url: &str, response: Response) -> Result<FetchedBody, FetchError> {
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_send_error(url, e))?
        .to_vec();
    debug!(bytes = bytes.len(), final_url = %final_url, "fetched body");
    Ok(FetchedBody {
        final_url,
        content_type,
        bytes,
    })
}

async fn json_reply(url: &str, response: Response) -> Result<JsonReply, FetchError> {
    let status = response.status().as_u16();
    let response = if status == 300 {
        response
    } else {
        ensure_success(url, response)?
    };
    let body = read_body(url, response).await?;
    let value = serde_json::from_slice(&body.bytes).map_err(|e| FetchError::decode(url, e))?;
    Ok(JsonReply {
        status,
        body: value,
    })
}

/// HTML served from a login or SSO URL after redirects means an auth wall.
fn detect_login_redirect(original_url: &str, response: &Response) -> Option<FetchError> {
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !is_html {
        return None;
    }

    let final_url = response.url().as_str();
    if final_url == original_url {
        return None;
    }
    let lowered = final_url.to_ascii_lowercase();
    if !LOGIN_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        return None;
    }

    let domain = response
        .url()
        .host_str()
        .map_or_else(|| host_of(original_url), ToString::to_string);
    debug!(url = %original_url, final_url = %final_url, domain = %domain, "login redirect detected");
    Some(FetchError::auth_required(original_url, 0, domain))
}

/// Where the pooled client takes its proxy settings from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxySource {
    /// reqwest's own lookup (environment plus platform settings).
    System,
    /// Only `HTTPS_PROXY`/`HTTP_PROXY`/`ALL_PROXY`, read here.
    Environment,
}

fn build_client() -> Result<Client, reqwest::Error> {
    build_client_with(|| client_builder(ProxySource::System).build())
}

/// Runs `primary`; if it panics (platform proxy discovery on some hosts),
/// builds again from the environment proxy variables only.
fn build_client_with<F>(primary: F) -> Result<Client, reqwest::Error>
where
    F: FnOnce() -> Result<Client, reqwest::Error> + std::panic::UnwindSafe,
{
    catch_unwind(primary).unwrap_or_else(|_| {
        warn!("HTTP client builder panicked reading system proxy settings; using environment proxies");
        client_builder(ProxySource::Environment).build()
    })
}

fn client_builder(proxies: ProxySource) -> ClientBuilder {
    let builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .gzip(true)
        .cookie_store(true)
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(browser_headers());
    match proxies {
        ProxySource::System => builder,
        ProxySource::Environment => env_proxy_urls(|name| std::env::var(name).ok())
            .into_iter()
            .fold(builder.no_proxy(), |builder, (scheme, url)| {
                let proxy = if scheme == "https" {
                    Proxy::https(&url)
                } else {
                    Proxy::http(&url)
                };
                match proxy {
                    Ok(proxy) => builder.proxy(proxy),
                    Err(error) => {
                        warn!(scheme, url = %url, error = %error, "ignoring unusable proxy setting");
                        builder
                    }
                }
            }),
    }
}

/// `(scheme, proxy url)` pairs from the conventional variables. A
/// scheme-specific variable wins over `ALL_PROXY`; upper case over lower.
fn env_proxy_urls(var: impl Fn(&str) -> Option<String>) -> Vec<(&'static str, String)> {
    [
        ("https", ["HTTPS_PROXY", "https_proxy"]),
        ("http", ["HTTP_PROXY", "http_proxy"]),
    ]
    .into_iter()
    .filter_map(|(scheme, names)| {
        names
            .iter()
            .chain(&["ALL_PROXY", "all_proxy"])
            .find_map(|&name| {
                var(name)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
            .map(|url| (scheme, url))
    })
    .collect()
}
