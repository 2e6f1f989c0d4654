//! Backend seam between the session controller and a concrete browser.
//!
//! [`BrowserLauncher`] opens a page either by attaching to a running browser
//! or by launching one on a profile directory. [`BrowserPage`] is the small
//! set of page operations the controller and recipes need.

use std::path::PathBuf;

use async_trait::async_trait;

use super::BrowserError;

/// How a fresh browser instance is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Persistent profile directory holding cookies and login state.
    pub profile_dir: PathBuf,
    /// Run without a visible window.
    pub headless: bool,
}

/// Opens browser pages.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Attaches to an already-running browser's remote debugging endpoint
    /// (`host:port`). The browser is not owned and must survive `close`.
    async fn attach(&self, endpoint: &str) -> Result<Box<dyn BrowserPage>, BrowserError>;

    /// Launches a browser owned by this process.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

/// One controllable page (tab).
#[async_trait]
pub trait BrowserPage: Send {
    /// Starts navigation to `url`.
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Current document URL.
    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// `document.contentType` of the current document.
    async fn content_type(&mut self) -> Result<Option<String>, BrowserError>;

    /// Serialized DOM of the current document.
    async fn html(&mut self) -> Result<String, BrowserError>;

    /// Fetches `url` from within the page, sending the session's cookies.
    async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, BrowserError>;

    /// Renders the current document to PDF.
    async fn print_to_pdf(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Releases the page. Attached browsers are disconnected; launched ones
    /// are terminated.
    async fn close(&mut self) -> Result<(), BrowserError>;
}
