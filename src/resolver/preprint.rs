//! Preprint resolver - builds canonical preprint URLs without any lookup.
//!
//! - arXiv: `https://arxiv.org/abs/<id>` with the version stripped. The
//!   abstract page normally redirects to the PDF; when it serves HTML the
//!   strategy may follow its `citation_pdf_url` once.
//! - bioRxiv / medRxiv: `10.1101/<digits>` plus an optional `vN` (default
//!   `v1`) becomes `{base}/content/10.1101/<id><vN>.full.pdf`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::utils::compile_static_regex;
use super::{PdfCandidate, Resolver};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

const DEFAULT_ARXIV_BASE: &str = "https://arxiv.org";
const DEFAULT_BIORXIV_BASE: &str = "https://www.biorxiv.org";
const DEFAULT_MEDRXIV_BASE: &str = "https://www.medrxiv.org";

/// `10.1101/<dotted digits>` with an optional version suffix. Greedy, so a
/// trailing `.full` leaves a dot on the DOI that is trimmed afterwards.
static CSHL_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(10\.1101/[\d.]+)(v\d+)?"));

/// Builds arXiv and bioRxiv/medRxiv PDF candidates.
#[derive(Debug, Clone)]
pub struct PreprintResolver {
    arxiv_base: String,
    biorxiv_base: String,
    medrxiv_base: String,
}

impl PreprintResolver {
    /// Creates a resolver targeting the public preprint servers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_urls(DEFAULT_ARXIV_BASE, DEFAULT_BIORXIV_BASE, DEFAULT_MEDRXIV_BASE)
    }

    /// Creates a resolver with custom server bases (for testing with wiremock).
    #[must_use]
    pub fn with_base_urls(
        arxiv_base: impl Into<String>,
        biorxiv_base: impl Into<String>,
        medrxiv_base: impl Into<String>,
    ) -> Self {
        Self {
            arxiv_base: arxiv_base.into().trim_end_matches('/').to_string(),
            biorxiv_base: biorxiv_base.into().trim_end_matches('/').to_string(),
            medrxiv_base: medrxiv_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn arxiv_candidate(&self, record: &BibliographicRecord) -> Option<PdfCandidate> {
        record
            .arxiv_id()
            .map(|id| PdfCandidate::via_landing(format!("{}/abs/{id}", self.arxiv_base)))
    }

    fn cshl_candidate(&self, record: &BibliographicRecord) -> Option<PdfCandidate> {
        let from_url = record.landing_url().and_then(|url| {
            let lowered = url.to_ascii_lowercase();
            let base = if lowered.contains("medrxiv") {
                &self.medrxiv_base
            } else if lowered.contains("biorxiv") {
                &self.biorxiv_base
            } else {
                return None;
            };
            build_cshl_pdf_url(base, url)
        });
        from_url
            .or_else(|| {
                record
                    .doi()
                    .and_then(|doi| build_cshl_pdf_url(&self.biorxiv_base, doi))
            })
            .map(PdfCandidate::direct)
    }
}

/// `{base}/content/<doi><version>.full.pdf` when `text` carries a `10.1101/` DOI.
fn build_cshl_pdf_url(base: &str, text: &str) -> Option<String> {
    let caps = CSHL_DOI_RE.captures(text)?;
    let doi = caps.get(1)?.as_str().trim_end_matches('.');
    let version = caps.get(2).map_or("v1", |m| m.as_str());
    Some(format!("{base}/content/{doi}{version}.full.pdf"))
}

impl Default for PreprintResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resolver for PreprintResolver {
    fn name(&self) -> &'static str {
        "preprint"
    }

    #[tracing::instrument(skip_all, fields(resolver = "preprint"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        if let Some(candidate) = self.arxiv_candidate(record) {
            debug!(url = %candidate.url, "constructed arXiv abstract URL");
            return Ok(candidate);
        }
        if let Some(candidate) = self.cshl_candidate(record) {
            debug!(url = %candidate.url, "constructed bioRxiv/medRxiv PDF URL");
            return Ok(candidate);
        }
        Err(AcquisitionError::not_applicable(
            "no arXiv ID or bioRxiv/medRxiv DOI",
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn resolver() -> PreprintResolver {
        PreprintResolver::new()
    }

    #[tokio::test]
    async fn test_preprint_id_builds_abstract_url() {
        let record = BibliographicRecord::default().with_preprint_id("2101.00001v3");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(candidate.url, "https://arxiv.org/abs/2101.00001");
        assert!(candidate.landing_hop);
    }

    #[tokio::test]
    async fn test_arxiv_doi_builds_abstract_url() {
        let record = BibliographicRecord::default().with_doi("10.48550/arXiv.2203.04567");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(candidate.url, "https://arxiv.org/abs/2203.04567");
    }

    #[tokio::test]
    async fn test_arxiv_pdf_url_builds_abstract_url() {
        let record =
            BibliographicRecord::default().with_landing_url("https://arxiv.org/pdf/2101.00001v2");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(candidate.url, "https://arxiv.org/abs/2101.00001");
    }

    #[tokio::test]
    async fn test_biorxiv_url_keeps_version() {
        let record = BibliographicRecord::default()
            .with_landing_url("https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2.full.pdf"
        );
        assert!(!candidate.landing_hop);
    }

    #[tokio::test]
    async fn test_biorxiv_full_text_page_keeps_version() {
        for landing in [
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2.full",
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2.full.pdf",
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2.full-text",
        ] {
            let record = BibliographicRecord::default().with_landing_url(landing);
            let candidate = resolver().resolve(&record).await.unwrap();
            assert_eq!(
                candidate.url,
                "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v2.full.pdf",
                "{landing}"
            );
        }
    }

    #[tokio::test]
    async fn test_biorxiv_full_text_page_without_version_defaults_to_v1() {
        let record = BibliographicRecord::default()
            .with_landing_url("https://www.biorxiv.org/content/10.1101/2021.01.01.000001.full");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v1.full.pdf"
        );
    }

    #[tokio::test]
    async fn test_medrxiv_url_defaults_to_v1() {
        let record = BibliographicRecord::default()
            .with_landing_url("https://www.medrxiv.org/content/10.1101/2020.05.12.20099999");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            "https://www.medrxiv.org/content/10.1101/2020.05.12.20099999v1.full.pdf"
        );
    }

    #[tokio::test]
    async fn test_cshl_doi_without_url_uses_biorxiv() {
        let record = BibliographicRecord::default().with_doi("10.1101/2021.01.01.000001");
        let candidate = resolver().resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            "https://www.biorxiv.org/content/10.1101/2021.01.01.000001v1.full.pdf"
        );
    }

    #[tokio::test]
    async fn test_other_records_are_not_applicable() {
        let record = BibliographicRecord::titled("x").with_doi("10.1234/x");
        let err = resolver().resolve(&record).await.unwrap_err();
        assert!(err.is_not_applicable());
    }
}
