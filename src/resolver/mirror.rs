//! Mirror resolver - opt-in lookup of a DOI on a configured mirror site.
//!
//! Disabled unless both enabled and given a base URL. The mirror's page for
//! `<base>/<doi>` embeds the PDF in an `<embed>` or `<iframe id="pdf">`.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::utils::{absolutize_url, citation_pdf_url, compile_static_selector};
use super::{PdfCandidate, Resolver};
use crate::download::HttpClient;
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

static EMBED_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"embed[type="application/pdf"][src]"#));

static IFRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("iframe#pdf[src]"));

/// Looks a DOI up on a user-configured mirror.
#[derive(Debug, Clone)]
pub struct MirrorResolver {
    client: HttpClient,
    base_url: Option<String>,
}

impl MirrorResolver {
    /// Creates the resolver. `None` or a blank base URL leaves it inert.
    #[must_use]
    pub fn new(client: HttpClient, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        }
    }
}

fn embedded_pdf_url(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    let embedded = document
        .select(&EMBED_SELECTOR)
        .chain(document.select(&IFRAME_SELECTOR))
        .filter_map(|element| element.value().attr("src"))
        .map(|src| src.split('#').next().unwrap_or(src).trim())
        .find(|src| !src.is_empty())
        .and_then(|src| absolutize_url(src, &base));
    embedded.or_else(|| citation_pdf_url(html, page_url))
}

#[async_trait]
impl Resolver for MirrorResolver {
    fn name(&self) -> &'static str {
        "mirror"
    }

    #[tracing::instrument(skip_all, fields(resolver = "mirror"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(base) = self.base_url.as_deref() else {
            return Err(AcquisitionError::not_applicable("no mirror URL configured"));
        };
        let Some(doi) = record.doi() else {
            return Err(AcquisitionError::not_applicable("no DOI"));
        };

        let page = self.client.fetch(&format!("{base}/{doi}")).await?;
        if !page.is_html() {
            return Err(AcquisitionError::not_applicable(
                "mirror did not serve an HTML page",
            ));
        }
        embedded_pdf_url(&page.text(), &page.final_url)
            .map(|url| {
                debug!(pdf_url = %url, "mirror PDF located");
                PdfCandidate::direct(url)
            })
            .ok_or_else(|| AcquisitionError::not_applicable("mirror page embeds no PDF"))
    }
}
