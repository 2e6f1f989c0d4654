//! Chrome DevTools Protocol backend built on `chromiumoxide`.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::Handler;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::BrowserError;
use super::backend::{BrowserLauncher, BrowserPage, LaunchOptions};

/// In-page fetch returning the body as a byte array; carries the page's cookies.
const FETCH_BYTES_JS: &str = r"(async (target) => {
    const response = await fetch(target, { credentials: 'include' });
    const buffer = await response.arrayBuffer();
    return Array.from(new Uint8Array(buffer));
})";

fn protocol_error(error: impl std::fmt::Display) -> BrowserError {
    BrowserError::Protocol {
        detail: error.to_string(),
    }
}

/// Opens Chromium pages through the DevTools protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Creates the launcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn drive_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(error) = event {
                debug!(error = %error, "browser handler stopped");
                break;
            }
        }
    })
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    #[tracing::instrument(skip(self))]
    async fn attach(&self, endpoint: &str) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let (browser, handler) = Browser::connect(format!("http://{endpoint}"))
            .await
            .map_err(|e| BrowserError::Attach {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            })?;
        let handler = drive_handler(handler);
        let page = browser.new_page("about:blank").await.map_err(|e| {
            handler.abort();
            BrowserError::Attach {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            }
        })?;
        debug!("attached to running browser");
        Ok(Box::new(ChromiumPage {
            browser,
            page: Some(page),
            handler,
            owned: false,
        }))
    }

    #[tracing::instrument(skip(self, options), fields(profile = %options.profile_dir.display()))]
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>, BrowserError> {
        std::fs::create_dir_all(&options.profile_dir).map_err(|e| BrowserError::Launch {
            detail: format!(
                "cannot create profile dir {}: {e}",
                options.profile_dir.display()
            ),
        })?;

        let mut builder = BrowserConfig::builder().user_data_dir(&options.profile_dir);
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|detail| BrowserError::Launch { detail })?;

        let (mut browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch {
                detail: e.to_string(),
            })?;
        let handler = drive_handler(handler);
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(error) => {
                if let Err(close_error) = browser.close().await {
                    warn!(error = %close_error, "failed to terminate browser after launch error");
                }
                handler.abort();
                return Err(BrowserError::Launch {
                    detail: error.to_string(),
                });
            }
        };
        debug!(headless = options.headless, "launched browser");
        Ok(Box::new(ChromiumPage {
            browser,
            page: Some(page),
            handler,
            owned: true,
        }))
    }
}

/// A single tab plus the browser connection that owns it.
struct ChromiumPage {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
    owned: bool,
}

impl ChromiumPage {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page.as_ref().ok_or_else(|| BrowserError::Protocol {
            detail: "page already closed".to_string(),
        })
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page()?
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                detail: e.to_string(),
            })
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self
            .page()?
            .url()
            .await
            .map_err(protocol_error)?
            .unwrap_or_default())
    }

    async fn content_type(&mut self) -> Result<Option<String>, BrowserError> {
        let result = self
            .page()?
            .evaluate("document.contentType")
            .await
            .map_err(protocol_error)?;
        Ok(result.into_value::<String>().ok())
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        self.page()?.content().await.map_err(protocol_error)
    }

    async fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, BrowserError> {
        let target = serde_json::to_string(url).map_err(protocol_error)?;
        let params = EvaluateParams::builder()
            .expression(format!("{FETCH_BYTES_JS}({target})"))
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|detail| BrowserError::Protocol { detail })?;
        let result = self
            .page()?
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Capture {
                detail: format!("in-page fetch of {url} failed: {e}"),
            })?;
        result
            .into_value::<Vec<u8>>()
            .map_err(|e| BrowserError::Capture {
                detail: format!("in-page fetch of {url} returned no bytes: {e}"),
            })
    }

    async fn print_to_pdf(&mut self) -> Result<Vec<u8>, BrowserError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            scale: Some(1.0),
            ..PrintToPdfParams::default()
        };
        self.page()?
            .pdf(params)
            .await
            .map_err(|e| BrowserError::Capture {
                detail: format!("printToPDF failed: {e}"),
            })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        if let Err(error) = page.close().await {
            debug!(error = %error, "page close failed");
        }
        let result = if self.owned {
            let closed = self.browser.close().await.map(|_| ()).map_err(protocol_error);
            if let Err(error) = self.browser.wait().await {
                debug!(error = %error, "browser process wait failed");
            }
            closed
        } else {
            Ok(())
        };
        self.handler.abort();
        result
    }
}
