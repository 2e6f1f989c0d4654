//! CLI entry point for paperfetch.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paperfetch_core::browser::BrowserOptions;
use paperfetch_core::{
    AcquisitionObserver, BibliographicRecord, BrowserSession, Orchestrator, RecordOutcome,
    load_records,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, build_acquisition_config, load_config};
use cli::{Cli, Command, DEFAULT_LOGIN_URL, LoginArgs, RunArgs};

/// Process outcome mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// Every record downloaded or already present.
    Success,
    /// Some records failed, some succeeded.
    Partial,
    /// Nothing could be acquired.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => Self::SUCCESS,
            ProcessExit::Partial => Self::from(2),
            ProcessExit::Failure => Self::FAILURE,
        }
    }
}

/// Determines the process exit outcome from acquired and failed counts.
fn determine_exit_outcome(acquired: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if acquired > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    init_tracing(default_level);
    debug!(?cli, "CLI arguments parsed");

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
}

async fn run(cli: Cli) -> Result<ProcessExit> {
    let file_config = load_config(cli.config.as_deref())?;
    let quiet = cli.quiet;
    match cli.into_command() {
        Command::Run(args) => run_acquisition(&args, file_config.as_ref(), quiet).await,
        Command::Login(args) => run_login(&args, file_config.as_ref()).await,
    }
}

fn load_inputs(inputs: &[impl AsRef<Path>]) -> Result<Vec<BibliographicRecord>> {
    let mut records = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        let loaded = load_records(input)
            .with_context(|| format!("Failed to load records from '{}'", input.display()))?;
        records.extend(loaded.records);
    }
    Ok(records)
}

async fn run_acquisition(
    args: &RunArgs,
    file_config: Option<&FileConfig>,
    quiet: bool,
) -> Result<ProcessExit> {
    if args.inputs.is_empty() {
        bail!(
            "No input files given.\n  Example: paperfetch refs.bib --email you@example.org"
        );
    }
    let records = load_inputs(&args.inputs)?;
    let config = build_acquisition_config(args, file_config)?;
    info!(
        records = records.len(),
        output_dir = %config.output_dir.display(),
        strategies = ?config.enabled_strategies(),
        "Paperfetch starting"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing the current record");
            cancel_signal.store(true, Ordering::SeqCst);
        }
    });

    let progress = should_show_progress(io::stderr().is_terminal(), quiet, is_dumb_terminal())
        .then(|| progress_bar(records.len()));
    let mut orchestrator = Orchestrator::new(config.clone()).with_cancel_flag(cancel);
    if let Some(bar) = &progress {
        orchestrator = orchestrator.with_observer(Box::new(ProgressObserver(bar.clone())));
    }

    let report = orchestrator.acquire(&records).await?;
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    if !quiet {
        for line in report.stats.summary_lines() {
            println!("{line}");
        }
        if !report.ledger.is_empty() {
            println!(
                "Failed records: {}",
                config.output_dir.join(paperfetch_core::ledger::FAILED_CSV_FILE).display()
            );
        }
        if report.cancelled {
            println!("Run interrupted before every record was processed.");
        }
    }

    let acquired = report.stats.success + report.stats.skipped;
    let exit = determine_exit_outcome(acquired, report.stats.failed);
    if report.cancelled && exit == ProcessExit::Success {
        return Ok(ProcessExit::Partial);
    }
    Ok(exit)
}

async fn run_login(args: &LoginArgs, file_config: Option<&FileConfig>) -> Result<ProcessExit> {
    let defaults = BrowserOptions::default();
    let options = BrowserOptions {
        profile_dir: args
            .profile_dir
            .clone()
            .or_else(|| file_config.and_then(|c| c.browser_profile_dir.clone()))
            .unwrap_or(defaults.profile_dir),
        debug_addr: file_config
            .and_then(|c| c.browser_debug_addr.clone())
            .unwrap_or(defaults.debug_addr),
        headless: false,
        ..defaults
    };
    let url = args.url.as_deref().unwrap_or(DEFAULT_LOGIN_URL);
    info!(url, profile_dir = %options.profile_dir.display(), "Opening browser for sign-in");

    let session = BrowserSession::chromium(options);
    let result = login_flow(&session, url).await;
    session.close().await;
    result?;
    println!("Browser closed; the session is saved in the profile.");
    Ok(ProcessExit::Success)
}

async fn login_flow(session: &BrowserSession, url: &str) -> Result<()> {
    session
        .navigate(url)
        .await
        .with_context(|| format!("Failed to open '{url}' in the browser"))?;
    println!("Sign in within the browser window, then press Enter here to close it.");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(())
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

fn should_show_progress(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Advances the progress bar as records finish.
struct ProgressObserver(ProgressBar);

impl AcquisitionObserver for ProgressObserver {
    fn record_started(&self, _index: usize, record: &BibliographicRecord) {
        self.0.set_message(record.display_label());
    }

    fn record_finished(&self, _index: usize, outcome: &RecordOutcome) {
        if let RecordOutcome::Failure { .. } = outcome {
            self.0.println(format!("failed: {}", self.0.message()));
        }
        self.0.inc(1);
    }
}
