//! Generic landing-page scraper.
//!
//! Fetches the record's landing URL and looks for a PDF link, in order:
//! 1. `citation_pdf_url` meta tag
//! 2. anchors whose class or href mentions `pdf`, `download` or `fulltext`
//!    and whose href points at a PDF
//! 3. absolute PDF URLs inside inline scripts
//!
//! Links are only accepted on the landing page's own site (second-level
//! domain match).

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::utils::{
    absolutize_url, citation_pdf_url, compile_static_regex, compile_static_selector, same_site,
};
use super::{PdfCandidate, Resolver};
use crate::download::HttpClient;
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("script"));

static SCRIPT_PDF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"https?://[^"'\s<>]+\.pdf"#));

const LINK_HINTS: [&str; 3] = ["pdf", "download", "fulltext"];

/// Scrapes publisher landing pages for a PDF link.
#[derive(Debug, Clone)]
pub struct ScraperResolver {
    client: HttpClient,
}

impl ScraperResolver {
    /// Creates the resolver.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

fn mentions_pdf_hint(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    LINK_HINTS.iter().any(|hint| lowered.contains(hint))
}

fn points_at_pdf(url: &str) -> bool {
    url.to_ascii_lowercase().contains(".pdf")
}

fn anchor_candidates(document: &Html, page_url: &Url) -> Vec<String> {
    document
        .select(&ANCHOR_SELECTOR)
        .filter(|anchor| {
            let class = anchor.value().attr("class").unwrap_or_default();
            let href = anchor.value().attr("href").unwrap_or_default();
            mentions_pdf_hint(class) || mentions_pdf_hint(href)
        })
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| absolutize_url(href, page_url))
        .filter(|href| points_at_pdf(href))
        .collect()
}

fn script_candidates(document: &Html) -> Vec<String> {
    document
        .select(&SCRIPT_SELECTOR)
        .flat_map(|script| {
            let text: String = script.text().collect();
            SCRIPT_PDF_RE
                .find_iter(&text)
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// First same-site PDF link on the page, following the documented order.
pub(crate) fn find_pdf_link(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;

    if let Some(meta) = citation_pdf_url(html, page_url)
        && same_site(&meta, page_url)
    {
        return Some(meta);
    }

    let document = Html::parse_document(html);
    anchor_candidates(&document, &base)
        .into_iter()
        .chain(script_candidates(&document))
        .find(|link| same_site(link, page_url))
}

#[async_trait]
impl Resolver for ScraperResolver {
    fn name(&self) -> &'static str {
        "scraper"
    }

    #[tracing::instrument(skip_all, fields(resolver = "scraper"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(landing) = record.landing_url() else {
            return Err(AcquisitionError::not_applicable("no landing URL"));
        };

        let page = self.client.fetch(landing).await?;
        if !page.is_html() {
            return Err(AcquisitionError::not_applicable(
                "landing URL did not serve HTML",
            ));
        }

        find_pdf_link(&page.text(), &page.final_url)
            .map(|link| {
                debug!(pdf_url = %link, "PDF link scraped from landing page");
                PdfCandidate::direct(link)
            })
            .ok_or_else(|| AcquisitionError::not_applicable("no PDF link on landing page"))
    }
}
