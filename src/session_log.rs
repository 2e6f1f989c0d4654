//! Plain-text session log (`download.log`) in the output directory.
//!
//! Separate from `tracing` output: an append-only, human-readable trail of
//! each run that survives across runs. Lines are
//! `<HTTP-date> [LEVEL] message`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::warn;

/// Session log file name inside the output directory.
pub const SESSION_LOG_FILE: &str = "download.log";

const RULE: &str = "================================================================================";

/// Severity of a session log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Progress.
    Info,
    /// Recoverable problem.
    Warn,
    /// A record failed.
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Appends timestamped lines to the session log.
///
/// Write failures are reported through `tracing` once and otherwise ignored;
/// the log never aborts a run.
#[derive(Debug)]
pub struct SessionLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl SessionLog {
    /// Opens (appending) `download.log` in `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be opened.
    pub fn open(output_dir: &Path) -> io::Result<Self> {
        let path = output_dir.join(SESSION_LOG_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// A log that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: Mutex::new(None),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one line at `level`.
    pub fn line(&self, level: LogLevel, message: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        let Some(file) = guard.as_mut() else {
            return;
        };
        let stamp = httpdate::fmt_http_date(SystemTime::now());
        if let Err(error) = writeln!(file, "{stamp} [{}] {message}", level.label()) {
            warn!(path = %self.path.display(), error = %error, "session log write failed; disabling");
            *guard = None;
        }
    }

    /// Writes an info line.
    pub fn info(&self, message: &str) {
        self.line(LogLevel::Info, message);
    }

    /// Writes a warning line.
    pub fn warn(&self, message: &str) {
        self.line(LogLevel::Warn, message);
    }

    /// Writes an error line.
    pub fn error(&self, message: &str) {
        self.line(LogLevel::Error, message);
    }

    /// Writes a block framed by rules.
    pub fn block<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.info(RULE);
        for line in lines {
            self.info(line.as_ref());
        }
        self.info(RULE);
    }
}
