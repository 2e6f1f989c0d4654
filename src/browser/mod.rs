//! Browser session controller: render-capture fallback for pages that only
//! yield a PDF inside an authenticated, script-driven browser session.
//!
//! One [`BrowserSession`] is owned per batch. It is opened lazily on first
//! use, either by attaching to a browser already listening on the remote
//! debugging endpoint (reusing the operator's logged-in session) or by
//! launching one on the persistent profile directory. If opening fails the
//! session becomes [`SessionState::Unavailable`] and every later call fails
//! fast.
//!
//! ```text
//! Uninitialized -> Connected | Launched -> Navigating -> Rendered -> Captured
//!                     \-> Unavailable                       ^           |
//!                                                           \-----------/
//! ```

mod backend;
mod chromium;
pub mod recipes;

pub use backend::{BrowserLauncher, BrowserPage, LaunchOptions};
pub use chromium::ChromiumLauncher;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::download::{ValidationError, validate_pdf};
use crate::resolver::utils::{host_matches_suffix, host_of};

/// Default remote debugging endpoint probed before launching.
pub const DEFAULT_DEBUG_ADDR: &str = "127.0.0.1:9222";

/// Default persistent profile directory.
pub const DEFAULT_PROFILE_DIR: &str = ".browser_data";

/// Default time allowed for a navigation to settle.
pub const DEFAULT_NAVIGATION_BUDGET: Duration = Duration::from_secs(30);

/// Interval between URL reads while waiting for navigation to settle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connect timeout for the remote debugging probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised by the browser session.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// An earlier open attempt failed; the browser is not retried this batch.
    #[error("browser unavailable: {detail}")]
    Unavailable {
        /// Why the open attempt failed.
        detail: String,
    },

    /// A fresh browser could not be started.
    #[error("failed to launch browser: {detail}")]
    Launch {
        /// Launcher error.
        detail: String,
    },

    /// The remote debugging endpoint accepted TCP but the attach failed.
    #[error("failed to attach to browser at {endpoint}: {detail}")]
    Attach {
        /// `host:port` of the endpoint.
        endpoint: String,
        /// Protocol error.
        detail: String,
    },

    /// Navigation did not reach a usable page.
    #[error("navigation to {url} failed: {detail}")]
    Navigation {
        /// Target URL.
        url: String,
        /// What went wrong.
        detail: String,
    },

    /// Reading or rendering the page failed.
    #[error("capture failed: {detail}")]
    Capture {
        /// What went wrong.
        detail: String,
    },

    /// Captured bytes are not an acceptable PDF.
    #[error("captured content from {url} rejected: {reason}")]
    Validation {
        /// Page the bytes were captured from.
        url: String,
        /// Validator verdict.
        reason: ValidationError,
    },

    /// Low-level DevTools protocol failure.
    #[error("browser protocol error: {detail}")]
    Protocol {
        /// Protocol error text.
        detail: String,
    },
}

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not opened yet.
    Uninitialized,
    /// Attached to an externally owned browser.
    Connected,
    /// Running a browser launched by this session.
    Launched,
    /// A navigation is in flight.
    Navigating,
    /// The last navigation settled.
    Rendered,
    /// A PDF was captured from the current page.
    Captured,
    /// Opening failed; not retried.
    Unavailable,
    /// Closed at batch end.
    Closed,
}

/// Whether the session owns the browser process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Attached over the remote debugging endpoint.
    Attached,
    /// Launched on the profile directory.
    Launched,
}

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserOptions {
    /// `host:port` of the remote debugging endpoint.
    pub debug_addr: String,
    /// Persistent profile directory used when launching.
    pub profile_dir: PathBuf,
    /// Launch without a window.
    pub headless: bool,
    /// Upper bound for one navigation to settle.
    pub navigation_budget: Duration,
    /// Interval between URL reads while settling.
    pub poll_interval: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            debug_addr: DEFAULT_DEBUG_ADDR.to_string(),
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            headless: true,
            navigation_budget: DEFAULT_NAVIGATION_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct SessionInner {
    state: SessionState,
    mode: Option<SessionMode>,
    page: Option<Box<dyn BrowserPage>>,
    unavailable_reason: Option<String>,
}

impl SessionInner {
    fn page(&mut self) -> Result<&mut Box<dyn BrowserPage>, BrowserError> {
        self.page.as_mut().ok_or_else(|| BrowserError::Unavailable {
            detail: "session is not open".to_string(),
        })
    }
}

/// Owns at most one browser page for the lifetime of a batch.
pub struct BrowserSession {
    launcher: Box<dyn BrowserLauncher>,
    options: BrowserOptions,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Creates an unopened session.
    #[must_use]
    pub fn new(launcher: Box<dyn BrowserLauncher>, options: BrowserOptions) -> Self {
        Self {
            launcher,
            options,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                mode: None,
                page: None,
                unavailable_reason: None,
            }),
        }
    }

    /// Creates an unopened session backed by Chromium.
    #[must_use]
    pub fn chromium(options: BrowserOptions) -> Self {
        Self::new(Box::new(ChromiumLauncher::new()), options)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Whether the open session attached or launched; `None` before opening.
    pub async fn mode(&self) -> Option<SessionMode> {
        self.inner.lock().await.mode
    }

    /// Navigates to `url` and waits for the URL to settle. Returns the settled URL.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Unavailable`] when the browser cannot be opened.
    pub async fn navigate(&self, url: &str) -> Result<String, BrowserError> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&mut inner).await?;
        self.navigate_locked(&mut inner, url).await
    }

    /// Captures the current page as validated PDF bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Capture`] when the current document is not a
    /// PDF, and [`BrowserError::Validation`] when neither its body nor its
    /// rendering is an acceptable PDF.
    pub async fn capture_pdf(&self) -> Result<Vec<u8>, BrowserError> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&mut inner).await?;
        Self::capture_locked(&mut inner, false).await
    }

    /// Navigates to `url`, follows a publisher recipe or the generic in-page
    /// PDF link, and captures the result.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Capture`] when the page offers no PDF, and
    /// other [`BrowserError`]s when the browser is unavailable, navigation
    /// fails or the captured bytes fail validation.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, url: &str) -> Result<Vec<u8>, BrowserError> {
        let mut inner = self.inner.lock().await;
        self.ensure_open(&mut inner).await?;

        let landed = self.navigate_locked(&mut inner, url).await?;
        let content_type = inner.page()?.content_type().await.ok().flatten();
        if content_type.as_deref().is_some_and(is_pdf_content_type) {
            return Self::capture_locked(&mut inner, false).await;
        }

        let html = inner.page()?.html().await.unwrap_or_default();
        if let Some(recipe) = recipes::recipe_for(&landed)
            && let Some(viewer) = recipe.locate_viewer(&landed, &html)
        {
            debug!(recipe = recipe.name, viewer = %viewer, "following publisher recipe");
            let settled = self.navigate_locked(&mut inner, &viewer).await?;
            if let Some(asset_host) = recipe.asset_host {
                self.wait_for_host(&mut inner, &settled, asset_host).await?;
            }
            return Self::capture_locked(&mut inner, true).await;
        }

        let Some(link) = recipes::generic_pdf_link(&landed, &html) else {
            return Err(BrowserError::Capture {
                detail: format!("no PDF link on {landed}"),
            });
        };
        debug!(link = %link, "following in-page PDF link");
        self.navigate_locked(&mut inner, &link).await?;
        Self::capture_locked(&mut inner, false).await
    }

    /// Releases the browser: disconnects an attached one, terminates a
    /// launched one. Safe to call more than once.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut page) = inner.page.take() {
            if let Err(error) = page.close().await {
                warn!(error = %error, "browser close reported an error");
            }
            info!(mode = ?inner.mode, "browser session closed");
        }
        if inner.state != SessionState::Unavailable {
            inner.state = SessionState::Closed;
        }
    }

    async fn ensure_open(&self, inner: &mut SessionInner) -> Result<(), BrowserError> {
        match inner.state {
            SessionState::Unavailable => {
                return Err(BrowserError::Unavailable {
                    detail: inner
                        .unavailable_reason
                        .clone()
                        .unwrap_or_else(|| "earlier open attempt failed".to_string()),
                });
            }
            SessionState::Closed => {
                return Err(BrowserError::Unavailable {
                    detail: "session already closed".to_string(),
                });
            }
            _ if inner.page.is_some() => return Ok(()),
            _ => {}
        }

        let opened = if endpoint_reachable(&self.options.debug_addr).await {
            info!(endpoint = %self.options.debug_addr, "attaching to running browser");
            self.launcher
                .attach(&self.options.debug_addr)
                .await
                .map(|page| (page, SessionMode::Attached))
        } else {
            info!(profile = %self.options.profile_dir.display(), "launching browser");
            let launch = LaunchOptions {
                profile_dir: self.options.profile_dir.clone(),
                headless: self.options.headless,
            };
            self.launcher
                .launch(&launch)
                .await
                .map(|page| (page, SessionMode::Launched))
        };

        match opened {
            Ok((page, mode)) => {
                inner.page = Some(page);
                inner.mode = Some(mode);
                inner.state = match mode {
                    SessionMode::Attached => SessionState::Connected,
                    SessionMode::Launched => SessionState::Launched,
                };
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "browser unavailable for the rest of the batch");
                inner.state = SessionState::Unavailable;
                inner.unavailable_reason = Some(error.to_string());
                Err(BrowserError::Unavailable {
                    detail: error.to_string(),
                })
            }
        }
    }

    async fn navigate_locked(
        &self,
        inner: &mut SessionInner,
        url: &str,
    ) -> Result<String, BrowserError> {
        inner.state = SessionState::Navigating;
        let page = inner.page()?;
        if let Err(error) = page.goto(url).await {
            debug!(error = %error, "navigation reported an error; checking where the page landed");
        }

        let deadline = Instant::now() + self.options.navigation_budget;
        let mut previous = page.current_url().await.ok();
        loop {
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.options.poll_interval).await;
            let current = page.current_url().await.ok();
            if current.is_some() && current == previous {
                break;
            }
            previous = current;
        }

        let settled = previous.filter(|u| !u.is_empty() && u != "about:blank");
        match settled {
            Some(settled) => {
                inner.state = SessionState::Rendered;
                debug!(url = %settled, "navigation settled");
                Ok(settled)
            }
            None => Err(BrowserError::Navigation {
                url: url.to_string(),
                detail: "page never reached a document".to_string(),
            }),
        }
    }

    async fn wait_for_host(
        &self,
        inner: &mut SessionInner,
        current: &str,
        asset_host: &str,
    ) -> Result<(), BrowserError> {
        let on_asset_host =
            |url: &str| host_of(url).is_some_and(|host| host_matches_suffix(&host, asset_host));
        if on_asset_host(current) {
            return Ok(());
        }
        let page = inner.page()?;
        let deadline = Instant::now() + self.options.navigation_budget;
        while Instant::now() < deadline {
            tokio::time::sleep(self.options.poll_interval).await;
            if let Ok(url) = page.current_url().await
                && on_asset_host(&url)
            {
                return Ok(());
            }
        }
        Err(BrowserError::Navigation {
            url: current.to_string(),
            detail: format!("viewer never reached {asset_host}"),
        })
    }

    async fn capture_locked(
        inner: &mut SessionInner,
        via_recipe: bool,
    ) -> Result<Vec<u8>, BrowserError> {
        let page = inner.page()?;
        let url = page.current_url().await.unwrap_or_default();

        // Only a PDF document or a recipe's PDF viewer is ever rendered.
        if !via_recipe {
            let content_type = page.content_type().await.ok().flatten();
            if !content_type.as_deref().is_some_and(is_pdf_content_type) {
                return Err(BrowserError::Capture {
                    detail: format!(
                        "no PDF found at {url} (content type {})",
                        content_type.as_deref().unwrap_or("unknown")
                    ),
                });
            }
            match page.fetch_bytes(&url).await {
                Ok(bytes) if validate_pdf(&bytes).is_ok() => {
                    inner.state = SessionState::Captured;
                    return Ok(bytes);
                }
                Ok(bytes) => {
                    debug!(size = bytes.len(), "document body is not a valid PDF; rendering");
                }
                Err(error) => debug!(error = %error, "reading document body failed; rendering"),
            }
        }

        let bytes = page.print_to_pdf().await?;
        validate_pdf(&bytes).map_err(|reason| BrowserError::Validation {
            url: url.clone(),
            reason,
        })?;
        inner.state = SessionState::Captured;
        Ok(bytes)
    }
}

fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("application/pdf")
}

async fn endpoint_reachable(addr: &str) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pdf_bytes() -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(8_000, b'x');
        bytes
    }

    /// Scripted page: `goto` looks the target up in `redirects`.
    #[derive(Default)]
    struct ScriptedPage {
        url: String,
        redirects: HashMap<String, String>,
        content_types: HashMap<String, String>,
        pages: HashMap<String, String>,
        bodies: HashMap<String, Vec<u8>>,
        rendered: Vec<u8>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserPage for ScriptedPage {
        async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
            self.url = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
            Ok(())
        }
        async fn current_url(&mut self) -> Result<String, BrowserError> {
            Ok(self.url.clone())
        }
        async fn content_type(&mut self) -> Result<Option<String>, BrowserError> {
            Ok(Some(
                self.content_types
                    .get(&self.url)
                    .cloned()
                    .unwrap_or_else(|| "text/html".to_string()),
            ))
        }
        async fn html(&mut self) -> Result<String, BrowserError> {
            Ok(self.pages.get(&self.url).cloned().unwrap_or_default())
        }
        async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, BrowserError> {
            Ok(self
                .bodies
                .get(url)
                .cloned()
                .unwrap_or_else(|| b"%PDF tiny".to_vec()))
        }
        async fn print_to_pdf(&mut self) -> Result<Vec<u8>, BrowserError> {
            Ok(self.rendered.clone())
        }
        async fn close(&mut self) -> Result<(), BrowserError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedLauncher {
        page: std::sync::Mutex<Option<ScriptedPage>>,
        launches: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl BrowserLauncher for ScriptedLauncher {
        async fn attach(&self, _endpoint: &str) -> Result<Box<dyn BrowserPage>, BrowserError> {
            Err(BrowserError::Attach {
                endpoint: "unused".to_string(),
                detail: "not scripted".to_string(),
            })
        }
        async fn launch(
            &self,
            _options: &LaunchOptions,
        ) -> Result<Box<dyn BrowserPage>, BrowserError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BrowserError::Launch {
                    detail: "no chrome".to_string(),
                });
            }
            let page = self.page.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(page))
        }
    }

    fn options() -> BrowserOptions {
        BrowserOptions {
            // Port 9 (discard) on loopback is not a debugging endpoint.
            debug_addr: "127.0.0.1:9".to_string(),
            navigation_budget: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..BrowserOptions::default()
        }
    }

    fn session(page: ScriptedPage, fail: bool) -> (BrowserSession, Arc<AtomicUsize>) {
        let launches = Arc::new(AtomicUsize::new(0));
        let launcher = ScriptedLauncher {
            page: std::sync::Mutex::new(Some(page)),
            launches: Arc::clone(&launches),
            fail,
        };
        (BrowserSession::new(Box::new(launcher), options()), launches)
    }

    #[tokio::test]
    async fn test_launch_failure_makes_session_unavailable_once() {
        let (session, launches) = session(ScriptedPage::default(), true);
        assert!(matches!(
            session.acquire("https://a.test/x").await,
            Err(BrowserError::Unavailable { .. })
        ));
        assert!(matches!(
            session.acquire("https://a.test/y").await,
            Err(BrowserError::Unavailable { .. })
        ));
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(session.state().await, SessionState::Unavailable);
    }

    fn pdf_document(url: &str) -> HashMap<String, String> {
        HashMap::from([(url.to_string(), "application/pdf".to_string())])
    }

    #[tokio::test]
    async fn test_html_page_without_pdf_link_is_not_captured() {
        let paywall = "https://journal.test/paywall";
        let page = ScriptedPage {
            redirects: HashMap::from([("https://doi.org/10.1/x".to_string(), paywall.to_string())]),
            pages: HashMap::from([(
                paywall.to_string(),
                "<html><body>Log in to access this article. Purchase $39.95</body></html>"
                    .to_string(),
            )]),
            rendered: pdf_bytes(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let err = session.acquire("https://doi.org/10.1/x").await.unwrap_err();
        assert!(matches!(err, BrowserError::Capture { .. }), "{err}");
        assert_ne!(session.state().await, SessionState::Captured);
        assert_eq!(session.mode().await, Some(SessionMode::Launched));
    }

    #[tokio::test]
    async fn test_capture_pdf_refuses_html_document() {
        let page = ScriptedPage {
            rendered: pdf_bytes(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        session.navigate("https://journal.test/abstract").await.unwrap();
        assert!(matches!(
            session.capture_pdf().await,
            Err(BrowserError::Capture { .. })
        ));
    }

    #[tokio::test]
    async fn test_pdf_document_body_is_read_with_session_cookies() {
        let url = "https://journal.test/files/x.pdf";
        let page = ScriptedPage {
            content_types: pdf_document(url),
            bodies: HashMap::from([(url.to_string(), pdf_bytes())]),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let bytes = session.acquire(url).await.unwrap();
        assert_eq!(bytes, pdf_bytes());
        assert_eq!(session.state().await, SessionState::Captured);
    }

    #[tokio::test]
    async fn test_pdf_viewer_with_unreadable_body_is_rendered() {
        let url = "https://journal.test/viewer/x";
        let page = ScriptedPage {
            content_types: pdf_document(url),
            rendered: pdf_bytes(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let bytes = session.acquire(url).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_generic_pdf_link_is_followed() {
        let article = "https://journal.test/article/x";
        let pdf = "https://journal.test/article/x/fulltext.pdf";
        let page = ScriptedPage {
            pages: HashMap::from([(
                article.to_string(),
                r#"<html><body><a class="pdf-download" href="/article/x/fulltext.pdf">PDF</a></body></html>"#
                    .to_string(),
            )]),
            content_types: pdf_document(pdf),
            bodies: HashMap::from([(pdf.to_string(), pdf_bytes())]),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let bytes = session.acquire(article).await.unwrap();
        assert_eq!(bytes, pdf_bytes());
        assert_eq!(session.state().await, SessionState::Captured);
    }

    #[tokio::test]
    async fn test_undersized_render_is_rejected() {
        let url = "https://journal.test/a";
        let page = ScriptedPage {
            content_types: pdf_document(url),
            rendered: b"%PDF-1.4 short".to_vec(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let err = session.acquire(url).await.unwrap_err();
        assert!(matches!(
            err,
            BrowserError::Validation {
                reason: ValidationError::TooSmall { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_sciencedirect_recipe_waits_for_asset_host() {
        let article = "https://www.sciencedirect.com/science/article/pii/S1";
        let viewer = "https://www.sciencedirect.com/science/article/pii/S1/pdfft?isDTMRedir=true&download=true";
        let page = ScriptedPage {
            redirects: HashMap::from([(
                viewer.to_string(),
                "https://pdf.sciencedirectassets.com/1/main.pdf".to_string(),
            )]),
            rendered: pdf_bytes(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let bytes = session.acquire(article).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_recipe_without_asset_redirect_fails() {
        let page = ScriptedPage {
            rendered: pdf_bytes(),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        let err = session
            .acquire("https://www.sciencedirect.com/science/article/pii/S2")
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let page = ScriptedPage {
            content_types: pdf_document("https://journal.test/a"),
            rendered: pdf_bytes(),
            closes: Arc::clone(&closes),
            ..ScriptedPage::default()
        };
        let (session, _) = session(page, false);
        session.acquire("https://journal.test/a").await.unwrap();
        session.close().await;
        session.close().await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_without_open_does_nothing() {
        let (session, launches) = session(ScriptedPage::default(), false);
        session.close().await;
        assert_eq!(launches.load(Ordering::SeqCst), 0);
    }
}
