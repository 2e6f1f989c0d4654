//! Runtime configuration for an acquisition run.
//!
//! [`AcquisitionConfig`] carries everything the orchestrator and the
//! strategy cascade need. The binary fills it from the config file and CLI
//! flags; library users build it with the `with_*` setters.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::BrowserOptions;
use crate::download::{DEFAULT_POLITE_DELAY, DEFAULT_TIMEOUT, clamp_timeout};
use crate::resolver::{DEFAULT_TITLE_MIN_SCORE, DEFAULT_TITLE_MIN_SIMILARITY, DEFAULT_ZOTERO_URL};

/// Strategy names in cascade order.
pub const STRATEGY_ORDER: [&str; 11] = [
    "direct_pdf",
    "metadata_service",
    "preprint",
    "unpaywall",
    "crossref",
    "pmc",
    "publisher",
    "social",
    "scraper",
    "browser",
    "mirror",
];

/// Upper bound for the polite per-domain delay.
pub const MAX_POLITE_DELAY: Duration = Duration::from_secs(60);

/// Settings for one acquisition run.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Directory receiving PDFs, the session log and failure exports.
    pub output_dir: PathBuf,
    /// Contact email sent to Unpaywall and Crossref.
    pub contact_email: Option<String>,
    /// Zotero translation server base URL.
    pub zotero_url: String,
    /// Mirror base URL; the mirror strategy needs it and `enable_mirror`.
    pub mirror_url: Option<String>,
    /// Opt-in switch for the mirror strategy.
    pub enable_mirror: bool,
    /// Strategy names to skip.
    pub disabled_strategies: BTreeSet<String>,
    /// Whether the browser strategy runs.
    pub browser_enabled: bool,
    /// Browser session tuning.
    pub browser: BrowserOptions,
    /// Per-request HTTP timeout (clamped to the supported range).
    pub timeout: Duration,
    /// Minimum spacing between requests to one domain.
    pub polite_delay: Duration,
    /// Crossref relevance score a title match must exceed.
    pub title_min_score: f64,
    /// Jaro-Winkler similarity a title match must reach; 0 disables the check.
    pub title_min_similarity: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("papers"),
            contact_email: None,
            zotero_url: DEFAULT_ZOTERO_URL.to_string(),
            mirror_url: None,
            enable_mirror: false,
            disabled_strategies: BTreeSet::new(),
            browser_enabled: true,
            browser: BrowserOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            polite_delay: DEFAULT_POLITE_DELAY,
            title_min_score: DEFAULT_TITLE_MIN_SCORE,
            title_min_similarity: DEFAULT_TITLE_MIN_SIMILARITY,
        }
    }
}

impl AcquisitionConfig {
    /// Default settings writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the contact email; blank values are ignored.
    #[must_use]
    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        self.contact_email = (!email.trim().is_empty()).then(|| email.trim().to_string());
        self
    }

    /// Sets the Zotero translation server URL.
    #[must_use]
    pub fn with_zotero_url(mut self, url: impl Into<String>) -> Self {
        self.zotero_url = url.into();
        self
    }

    /// Enables the mirror strategy against `url`.
    #[must_use]
    pub fn with_mirror(mut self, url: impl Into<String>) -> Self {
        self.mirror_url = Some(url.into());
        self.enable_mirror = true;
        self
    }

    /// Skips the named strategy.
    #[must_use]
    pub fn with_disabled_strategy(mut self, name: impl Into<String>) -> Self {
        self.disabled_strategies.insert(name.into());
        self
    }

    /// Turns the browser strategy on or off.
    #[must_use]
    pub fn with_browser_enabled(mut self, enabled: bool) -> Self {
        self.browser_enabled = enabled;
        self
    }

    /// Replaces the browser options.
    #[must_use]
    pub fn with_browser_options(mut self, options: BrowserOptions) -> Self {
        self.browser = options;
        self
    }

    /// Sets the HTTP timeout, clamped to the supported range.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    /// Sets the polite per-domain delay, capped at [`MAX_POLITE_DELAY`].
    #[must_use]
    pub fn with_polite_delay(mut self, delay: Duration) -> Self {
        self.polite_delay = delay.min(MAX_POLITE_DELAY);
        self
    }

    /// Sets the title lookup thresholds.
    #[must_use]
    pub fn with_title_thresholds(mut self, min_score: f64, min_similarity: f64) -> Self {
        self.title_min_score = min_score;
        self.title_min_similarity = min_similarity.clamp(0.0, 1.0);
        self
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// True when the named strategy takes part in the cascade.
    #[must_use]
    pub fn is_enabled(&self, strategy: &str) -> bool {
        if self.disabled_strategies.contains(strategy) {
            return false;
        }
        match strategy {
            "browser" => self.browser_enabled,
            "mirror" => {
                self.enable_mirror
                    && self
                        .mirror_url
                        .as_deref()
                        .is_some_and(|url| !url.trim().is_empty())
            }
            _ => true,
        }
    }

    /// Enabled strategy names in cascade order.
    #[must_use]
    pub fn enabled_strategies(&self) -> Vec<&'static str> {
        STRATEGY_ORDER
            .iter()
            .copied()
            .filter(|name| self.is_enabled(name))
            .collect()
    }
}
