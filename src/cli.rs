//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use paperfetch_core::STRATEGY_ORDER;

/// Default page opened by `paperfetch login`.
pub const DEFAULT_LOGIN_URL: &str = "https://www.sciencedirect.com";

/// Acquire full-text PDFs for bibliographic records.
///
/// Paperfetch reads BibTeX, RIS or JSON records and tries an ordered cascade of
/// retrieval strategies for each, falling back to a browser for publishers
/// that only serve rendered pages.
#[derive(Parser, Debug)]
#[command(name = "paperfetch")]
#[command(author, version, about)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/paperfetch/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// The subcommand to execute; bare invocation means `run`.
    #[must_use]
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire PDFs for the records in the input files (default)
    Run(RunArgs),
    /// Open a visible browser on the persistent profile to sign in once
    Login(LoginArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// BibTeX (.bib), RIS (.ris) or JSON (.json) record files
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving PDFs, download.log and failure exports
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Contact email for Unpaywall and Crossref polite pools
    #[arg(short, long)]
    pub email: Option<String>,

    /// Zotero translation server base URL
    #[arg(long, value_name = "URL")]
    pub zotero_url: Option<String>,

    /// Enable the opt-in mirror strategy (needs a mirror URL)
    #[arg(long)]
    pub enable_mirror: bool,

    /// Mirror base URL
    #[arg(long, value_name = "URL")]
    pub mirror_url: Option<String>,

    /// Skip strategies (comma-separated or repeated)
    #[arg(long, value_delimiter = ',', value_name = "STRATEGY",
          value_parser = clap::builder::PossibleValuesParser::new(STRATEGY_ORDER))]
    pub disable: Vec<String>,

    /// Never start or attach to a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Remote debugging endpoint to attach to before launching a browser
    #[arg(long, value_name = "HOST:PORT")]
    pub debug_addr: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Show the launched browser window
    #[arg(long)]
    pub headful: bool,

    /// Per-request timeout in seconds (15-30)
    #[arg(long, value_parser = clap::value_parser!(u64).range(15..=30))]
    pub timeout_secs: Option<u64>,

    /// Minimum delay between requests to one domain in milliseconds (0-60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60_000))]
    pub polite_delay_ms: Option<u64>,

    /// Crossref relevance score a title match must exceed
    #[arg(long)]
    pub title_min_score: Option<f64>,

    /// Title similarity (0-1) a Crossref match must reach
    #[arg(long)]
    pub title_min_similarity: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LoginArgs {
    /// Page to open (default: ScienceDirect)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_bare_invocation_is_run() {
        let cli = parse(&["paperfetch", "refs.bib", "-o", "out"]);
        let Command::Run(run) = cli.into_command() else {
            panic!("expected run");
        };
        assert_eq!(run.inputs, vec![PathBuf::from("refs.bib")]);
        assert_eq!(run.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        assert_eq!(parse(&["paperfetch", "-v"]).verbose, 1);
        assert_eq!(parse(&["paperfetch", "-vv"]).verbose, 2);
        assert!(parse(&["paperfetch", "--quiet"]).quiet);
    }

    #[test]
    fn test_cli_disable_accepts_lists_and_rejects_unknown() {
        let cli = parse(&["paperfetch", "--disable", "social,mirror", "--disable", "browser"]);
        assert_eq!(cli.run.disable, vec!["social", "mirror", "browser"]);

        let err = Cli::try_parse_from(["paperfetch", "--disable", "nope"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_cli_timeout_range() {
        assert_eq!(parse(&["paperfetch", "--timeout-secs", "20"]).run.timeout_secs, Some(20));
        let err = Cli::try_parse_from(["paperfetch", "--timeout-secs", "5"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_login_subcommand() {
        let cli = parse(&["paperfetch", "login", "https://pubs.example.org"]);
        let Command::Login(login) = cli.into_command() else {
            panic!("expected login");
        };
        assert_eq!(login.url.as_deref(), Some("https://pubs.example.org"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["paperfetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Cli::try_parse_from(["paperfetch", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
