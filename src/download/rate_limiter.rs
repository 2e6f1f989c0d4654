//! Per-domain polite delay between outbound requests.
//!
//! Resolvers for one record often hit the same API host back to back (Crossref
//! title lookup, then Crossref works, then the publisher). [`RateLimiter`]
//! spaces consecutive requests to one host by at least the configured delay.
//! Requests to a host never seen before go out immediately.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use paperfetch_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(500));
//! limiter.acquire("https://api.crossref.org/works/10.1/x").await;
//! // waits ~500ms before returning
//! limiter.acquire("https://api.crossref.org/works/10.1/y").await;
//! // different host: immediate
//! limiter.acquire("https://api.unpaywall.org/v2/10.1/x").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Cumulative politeness wait per host that earns a warning.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(60);

/// Per-host polite delay, shared by every clone of the HTTP client.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    disabled: bool,
    /// Arc values so the map shard lock is released before awaiting the inner mutex.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// `None` until the first request to this host.
    last_request: Mutex<Option<Instant>>,
    waited_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            waited_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_wait(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self.waited_ms.fetch_add(delay_ms, Ordering::SeqCst) + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter enforcing `delay` between requests to one host.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            disabled: delay.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            delay: Duration::ZERO,
            disabled: true,
            hosts: DashMap::new(),
        }
    }

    /// Returns whether the limiter is a no-op.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Configured delay between requests to one host.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until a request to `url`'s host is allowed, then claims the slot.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.disabled {
            return;
        }

        let host = extract_domain(url);
        tracing::Span::current().record("host", host.as_str());

        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone();

        let mut last = state.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay.saturating_sub(elapsed);
                let total = state.add_wait(wait);
                debug!(host = %host, wait_ms = wait.as_millis(), "polite delay");
                if total >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                    warn!(
                        host = %host,
                        waited_secs = total.as_secs(),
                        "spent a long time waiting on one host"
                    );
                }
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Lower-cased host of `url`, or `"unknown"` when it cannot be parsed.
///
/// ```
/// use paperfetch_core::download::rate_limiter::extract_domain;
///
/// assert_eq!(extract_domain("https://Example.COM/path"), "example.com");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
