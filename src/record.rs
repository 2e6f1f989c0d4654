//! Bibliographic record model consumed by the acquisition pipeline.
//!
//! Records are produced upstream (search, filtering, bibliography import) and
//! are read-only to the pipeline. Identifier helpers here derive the secondary
//! identifiers the resolvers need (arXiv IDs hidden in URLs or DOIs, PMIDs in
//! `PubMed` links) without mutating the record.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolver::utils::compile_static_regex;

/// Modern (`2101.00001`) and legacy (`hep-th/9901001`) arXiv identifiers, optional version.
static ARXIV_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)^(?:\d{4}\.\d{4,5}|[a-z\-]+(?:\.[a-z]{2})?/\d{7})(?:v\d+)?$")
});

/// arXiv identifier inside an `arxiv.org/abs/...` or `arxiv.org/pdf/...` URL.
static ARXIV_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)arxiv\.org/(?:abs|pdf)/((?:\d{4}\.\d{4,5}|[a-z\-]+(?:\.[a-z]{2})?/\d{7})(?:v\d+)?)",
    )
});

/// PMID inside a `pubmed.ncbi.nlm.nih.gov/<pmid>` URL.
static PUBMED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)pubmed\.ncbi\.nlm\.nih\.gov/(\d+)"));

/// Trailing `v<N>` version marker on arXiv identifiers.
static ARXIV_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"v\d+$"));

/// DOI prefix assigned by arXiv (`10.48550/arXiv.<id>`).
const ARXIV_DOI_PREFIX: &str = "10.48550/arxiv.";

/// Identifiers attached to a record. All optional; at least one is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    /// Bare DOI (`10.1234/abc`).
    #[serde(default)]
    pub doi: Option<String>,
    /// `PubMed` identifier.
    #[serde(default)]
    pub pmid: Option<String>,
    /// Preprint server identifier (arXiv ID).
    #[serde(default, alias = "arxiv_id")]
    pub preprint_id: Option<String>,
    /// Publisher landing page or direct link.
    #[serde(default, alias = "url")]
    pub landing_url: Option<String>,
}

/// One bibliographic record to acquire a PDF for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    /// Title as given by the upstream source.
    #[serde(default)]
    pub title: String,
    /// Ordered author list.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Record identifiers.
    #[serde(default)]
    pub identifiers: Identifiers,
    /// Abstract text, when known.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Publication year, when known.
    #[serde(default)]
    pub year: Option<u16>,
    /// Citation key from the source bibliography, when known.
    #[serde(default)]
    pub citation_key: Option<String>,
}

impl BibliographicRecord {
    /// Creates a record with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the DOI.
    #[must_use]
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.identifiers.doi = Some(doi.into());
        self
    }

    /// Sets the PMID.
    #[must_use]
    pub fn with_pmid(mut self, pmid: impl Into<String>) -> Self {
        self.identifiers.pmid = Some(pmid.into());
        self
    }

    /// Sets the preprint identifier.
    #[must_use]
    pub fn with_preprint_id(mut self, id: impl Into<String>) -> Self {
        self.identifiers.preprint_id = Some(id.into());
        self
    }

    /// Sets the landing page URL.
    #[must_use]
    pub fn with_landing_url(mut self, url: impl Into<String>) -> Self {
        self.identifiers.landing_url = Some(url.into());
        self
    }

    /// Sets the author list.
    #[must_use]
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Non-empty, trimmed DOI.
    #[must_use]
    pub fn doi(&self) -> Option<&str> {
        non_empty(self.identifiers.doi.as_deref())
    }

    /// Non-empty, trimmed landing URL.
    #[must_use]
    pub fn landing_url(&self) -> Option<&str> {
        non_empty(self.identifiers.landing_url.as_deref())
    }

    /// Non-empty, trimmed title.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        non_empty(Some(self.title.as_str()))
    }

    /// arXiv identifier without version, from the explicit field, an arXiv DOI, or an arXiv URL.
    #[must_use]
    pub fn arxiv_id(&self) -> Option<String> {
        if let Some(id) = non_empty(self.identifiers.preprint_id.as_deref()) {
            let id = id.trim_start_matches("arXiv:").trim_start_matches("arxiv:");
            if ARXIV_ID_RE.is_match(id) {
                return Some(strip_arxiv_version(id));
            }
        }

        if let Some(doi) = self.doi()
            && doi.to_ascii_lowercase().starts_with(ARXIV_DOI_PREFIX)
        {
            let id = &doi[ARXIV_DOI_PREFIX.len()..];
            if ARXIV_ID_RE.is_match(id) {
                return Some(strip_arxiv_version(id));
            }
        }

        self.landing_url()
            .and_then(|url| ARXIV_URL_RE.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|m| strip_arxiv_version(m.as_str().trim_end_matches(".pdf")))
    }

    /// PMID from the explicit field or a `PubMed` landing URL.
    #[must_use]
    pub fn pmid(&self) -> Option<String> {
        if let Some(pmid) = non_empty(self.identifiers.pmid.as_deref()) {
            let pmid = pmid
                .trim_start_matches("PMID:")
                .trim_start_matches("pmid:")
                .trim();
            if !pmid.is_empty() && pmid.chars().all(|c| c.is_ascii_digit()) {
                return Some(pmid.to_string());
            }
        }
        self.landing_url()
            .and_then(|url| PUBMED_URL_RE.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// True when the record carries a DOI or any preprint identifier.
    #[must_use]
    pub fn has_doi_or_preprint(&self) -> bool {
        self.doi().is_some()
            || non_empty(self.identifiers.preprint_id.as_deref()).is_some()
            || self.arxiv_id().is_some()
    }

    /// Best identifier for naming the destination file: DOI, preprint ID,
    /// derived arXiv ID, `PMID:<n>`, title, then URL.
    #[must_use]
    pub fn best_identifier(&self) -> Option<String> {
        self.doi()
            .map(str::to_string)
            .or_else(|| non_empty(self.identifiers.preprint_id.as_deref()).map(str::to_string))
            .or_else(|| self.arxiv_id())
            .or_else(|| self.pmid().map(|pmid| format!("PMID:{pmid}")))
            .or_else(|| self.title().map(str::to_string))
            .or_else(|| self.landing_url().map(str::to_string))
    }

    /// Short label for logs.
    #[must_use]
    pub fn display_label(&self) -> String {
        let label = self
            .title()
            .map(str::to_string)
            .or_else(|| self.best_identifier())
            .unwrap_or_else(|| "<untitled record>".to_string());
        label.chars().take(80).collect()
    }
}

fn strip_arxiv_version(id: &str) -> String {
    ARXIV_VERSION_RE.replace(id.trim(), "").into_owned()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_arxiv_id_from_explicit_field_strips_version() {
        let record = BibliographicRecord::titled("x").with_preprint_id("2101.00001v3");
        assert_eq!(record.arxiv_id().as_deref(), Some("2101.00001"));
    }

    #[test]
    fn test_arxiv_id_from_prefixed_field() {
        let record = BibliographicRecord::titled("x").with_preprint_id("arXiv:2101.00001");
        assert_eq!(record.arxiv_id().as_deref(), Some("2101.00001"));
    }

    #[test]
    fn test_arxiv_id_from_arxiv_doi() {
        let record = BibliographicRecord::titled("x").with_doi("10.48550/arXiv.2305.12345");
        assert_eq!(record.arxiv_id().as_deref(), Some("2305.12345"));
    }

    #[test]
    fn test_arxiv_id_from_pdf_url() {
        let record =
            BibliographicRecord::titled("x").with_landing_url("https://arxiv.org/pdf/2101.00001v2.pdf");
        assert_eq!(record.arxiv_id().as_deref(), Some("2101.00001"));
    }

    #[test]
    fn test_arxiv_id_legacy_format() {
        let record =
            BibliographicRecord::titled("x").with_landing_url("https://arxiv.org/abs/hep-th/9901001");
        assert_eq!(record.arxiv_id().as_deref(), Some("hep-th/9901001"));
    }

    #[test]
    fn test_arxiv_id_absent_for_publisher_record() {
        let record = BibliographicRecord::titled("x")
            .with_doi("10.1234/x")
            .with_landing_url("https://www.nature.com/articles/s41586");
        assert!(record.arxiv_id().is_none());
    }

    #[test]
    fn test_pmid_from_pubmed_url() {
        let record = BibliographicRecord::titled("x")
            .with_landing_url("https://pubmed.ncbi.nlm.nih.gov/31452104/");
        assert_eq!(record.pmid().as_deref(), Some("31452104"));
    }

    #[test]
    fn test_pmid_rejects_non_numeric() {
        let record = BibliographicRecord::titled("x").with_pmid("PMC123");
        assert!(record.pmid().is_none());
    }

    #[test]
    fn test_best_identifier_priority() {
        let record = BibliographicRecord::titled("Some Title")
            .with_doi("10.1/a")
            .with_preprint_id("2101.00001");
        assert_eq!(record.best_identifier().as_deref(), Some("10.1/a"));

        let record = BibliographicRecord::titled("Some Title").with_preprint_id("2101.00001");
        assert_eq!(record.best_identifier().as_deref(), Some("2101.00001"));

        let record = BibliographicRecord::titled("Some Title").with_pmid("31452104");
        assert_eq!(record.best_identifier().as_deref(), Some("PMID:31452104"));

        let record = BibliographicRecord::default()
            .with_landing_url("https://pubmed.ncbi.nlm.nih.gov/31452104/");
        assert_eq!(record.best_identifier().as_deref(), Some("PMID:31452104"));

        let record = BibliographicRecord::titled("Some Title").with_landing_url("https://e.org/a");
        assert_eq!(record.best_identifier().as_deref(), Some("Some Title"));

        let record = BibliographicRecord::default().with_landing_url("https://e.org/a");
        assert_eq!(record.best_identifier().as_deref(), Some("https://e.org/a"));

        assert!(BibliographicRecord::default().best_identifier().is_none());
    }

    #[test]
    fn test_record_deserializes_with_aliases() {
        let json = serde_json::json!({
            "title": "Paper",
            "authors": ["A. One", "B. Two"],
            "identifiers": {"doi": "10.1/x", "url": "https://e.org/p", "arxiv_id": "2101.00001"},
            "abstract": "text"
        });
        let record: BibliographicRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.identifiers.landing_url.as_deref(), Some("https://e.org/p"));
        assert_eq!(record.identifiers.preprint_id.as_deref(), Some("2101.00001"));
        assert_eq!(record.abstract_text.as_deref(), Some("text"));
        assert_eq!(record.authors.len(), 2);
    }

    #[test]
    fn test_has_doi_or_preprint() {
        assert!(!BibliographicRecord::titled("t").has_doi_or_preprint());
        assert!(BibliographicRecord::titled("t").with_doi("10.1/x").has_doi_or_preprint());
        assert!(
            BibliographicRecord::titled("t")
                .with_landing_url("https://arxiv.org/abs/2101.00001")
                .has_doi_or_preprint()
        );
    }
}
