//! Application configuration loading for CLI defaults.
//!
//! File values fill in whatever the command line leaves unset; flags always
//! win. The merged result is the library's [`AcquisitionConfig`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use paperfetch_core::browser::BrowserOptions;
use paperfetch_core::{AcquisitionConfig, STRATEGY_ORDER};

use crate::cli::RunArgs;

/// TOML-backed file configuration for paperfetch defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default output directory.
    pub output_dir: Option<PathBuf>,
    /// Contact email for Unpaywall and Crossref.
    pub contact_email: Option<String>,
    /// Zotero translation server base URL.
    pub zotero_url: Option<String>,
    /// Mirror base URL.
    pub mirror_url: Option<String>,
    /// Opt-in switch for the mirror strategy.
    pub enable_mirror: Option<bool>,
    /// Strategy names to skip.
    pub disabled_strategies: Option<Vec<String>>,
    /// Whether the browser strategy runs.
    pub browser: Option<bool>,
    /// Launch the browser without a window.
    pub browser_headless: Option<bool>,
    /// Persistent browser profile directory.
    pub browser_profile_dir: Option<PathBuf>,
    /// Remote debugging endpoint (`host:port`).
    pub browser_debug_addr: Option<String>,
    /// Upper bound for one browser navigation, in seconds.
    pub navigation_budget_secs: Option<u64>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Per-domain polite delay in milliseconds.
    pub polite_delay_ms: Option<u64>,
    /// Crossref score threshold for title lookups.
    pub title_min_score: Option<f64>,
    /// Title similarity threshold for title lookups.
    pub title_min_similarity: Option<f64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.timeout_secs
            && !(15..=30).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 15..=30");
        }
        if let Some(delay) = self.polite_delay_ms
            && delay > 60_000
        {
            bail!("Invalid config value for `polite_delay_ms`: {delay}. Expected range: 0..=60000");
        }
        if let Some(budget) = self.navigation_budget_secs
            && !(1..=300).contains(&budget)
        {
            bail!(
                "Invalid config value for `navigation_budget_secs`: {budget}. Expected range: 1..=300"
            );
        }
        if let Some(similarity) = self.title_min_similarity
            && !(0.0..=1.0).contains(&similarity)
        {
            bail!(
                "Invalid config value for `title_min_similarity`: {similarity}. Expected range: 0.0..=1.0"
            );
        }
        if let Some(score) = self.title_min_score
            && score < 0.0
        {
            bail!("Invalid config value for `title_min_score`: {score}. Expected a non-negative number");
        }
        for name in self.disabled_strategies.iter().flatten() {
            if !STRATEGY_ORDER.contains(&name.as_str()) {
                bail!(
                    "Invalid strategy name in `disabled_strategies`: '{name}'. Expected one of: {}",
                    STRATEGY_ORDER.join(", ")
                );
            }
        }
        Ok(())
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/paperfetch/config.toml`
/// 2. `$HOME/.config/paperfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("paperfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("paperfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Merges CLI flags over file values into the library configuration.
pub fn build_acquisition_config(
    args: &RunArgs,
    file: Option<&FileConfig>,
) -> Result<AcquisitionConfig> {
    let file = file.cloned().unwrap_or_default();

    let output_dir = args
        .output_dir
        .clone()
        .or(file.output_dir)
        .unwrap_or_else(|| AcquisitionConfig::default().output_dir);
    let mut config = AcquisitionConfig::new(output_dir);

    if let Some(email) = args.email.clone().or(file.contact_email) {
        config = config.with_contact_email(email);
    }
    if let Some(url) = args.zotero_url.clone().or(file.zotero_url) {
        config = config.with_zotero_url(url);
    }

    let enable_mirror = args.enable_mirror || file.enable_mirror.unwrap_or(false);
    let mirror_url = args.mirror_url.clone().or(file.mirror_url);
    match (enable_mirror, mirror_url) {
        (true, Some(url)) => config = config.with_mirror(url),
        (true, None) => bail!("The mirror strategy is enabled but no mirror URL is configured.\n  Suggestion: pass --mirror-url or set `mirror_url` in the config file"),
        (false, Some(url)) => config.mirror_url = Some(url),
        (false, None) => {}
    }

    for name in file
        .disabled_strategies
        .into_iter()
        .flatten()
        .chain(args.disable.iter().cloned())
    {
        config = config.with_disabled_strategy(name);
    }

    let browser_enabled = !args.no_browser && file.browser.unwrap_or(true);
    let defaults = BrowserOptions::default();
    let browser = BrowserOptions {
        debug_addr: args
            .debug_addr
            .clone()
            .or(file.browser_debug_addr)
            .unwrap_or(defaults.debug_addr),
        profile_dir: args
            .profile_dir
            .clone()
            .or(file.browser_profile_dir)
            .unwrap_or(defaults.profile_dir),
        headless: !args.headful && file.browser_headless.unwrap_or(true),
        navigation_budget: file
            .navigation_budget_secs
            .map_or(defaults.navigation_budget, Duration::from_secs),
        poll_interval: defaults.poll_interval,
    };
    config = config
        .with_browser_enabled(browser_enabled)
        .with_browser_options(browser);

    if let Some(secs) = args.timeout_secs.or(file.timeout_secs) {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(ms) = args.polite_delay_ms.or(file.polite_delay_ms) {
        config = config.with_polite_delay(Duration::from_millis(ms));
    }

    let score = args
        .title_min_score
        .or(file.title_min_score)
        .unwrap_or(config.title_min_score);
    let similarity = args
        .title_min_similarity
        .or(file.title_min_similarity)
        .unwrap_or(config.title_min_similarity);
    if !(0.0..=1.0).contains(&similarity) {
        bail!("Invalid --title-min-similarity {similarity}. Expected range: 0.0..=1.0");
    }
    Ok(config.with_title_thresholds(score, similarity))
}
