//! Bounded exponential backoff for rate-limited requests.
//!
//! Only HTTP 429 is retried. Every other failure is surfaced immediately so the
//! orchestrator can move on to the next strategy rather than hammering a
//! server that already said no.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use paperfetch_core::download::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for(0), Duration::from_secs(1));
//! assert_eq!(policy.delay_for(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_for(5), Duration::from_secs(10));
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

/// Default number of retries after the initial 429.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (10 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Decision on whether to retry a rate-limited request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which retry this will be (1-indexed).
        retry: u32,
    },

    /// Give up.
    GiveUp,
}

/// Backoff configuration: `delay(n) = min(base * 2^n, max_delay)`.
///
/// With defaults the three retries wait 1s, 2s and 4s; the cap only matters
/// for larger retry budgets or base delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with custom settings.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry_index` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_index).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decides whether to retry after `retries_done` retries have already happened.
    #[instrument(level = "debug", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, retries_done: u32) -> RetryDecision {
        if retries_done >= self.max_retries {
            debug!("retry budget exhausted");
            return RetryDecision::GiveUp;
        }
        let delay = self.delay_for(retries_done);
        debug!(delay_ms = delay.as_millis(), "scheduling retry");
        RetryDecision::Retry {
            delay,
            retry: retries_done + 1,
        }
    }
}
