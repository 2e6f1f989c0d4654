//! Crossref resolver - PDF links from the Crossref works API, plus the
//! title-to-DOI lookup the orchestrator runs for records without a DOI.
//!
//! All requests carry `mailto` to land in Crossref's polite pool.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::utils::normalize_doi;
use super::{PdfCandidate, Resolver};
use crate::download::{FetchError, HttpClient};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

/// Default Crossref API base URL.
const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

/// Default relevance score a title match must exceed.
pub const DEFAULT_TITLE_MIN_SCORE: f64 = 50.0;

/// Default Jaro-Winkler similarity the returned title must reach.
pub const DEFAULT_TITLE_MIN_SIMILARITY: f64 = 0.70;

// ==================== Crossref API Response Types ====================

#[derive(Debug, Deserialize)]
struct WorkResponse {
    message: WorkMessage,
}

#[derive(Debug, Deserialize)]
struct WorkMessage {
    #[serde(default)]
    link: Vec<CrossrefLink>,
    resource: Option<CrossrefResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossrefLink {
    /// The URL field is uppercase in the Crossref response.
    #[serde(rename = "URL")]
    url: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefResource {
    primary: Option<PrimaryResource>,
}

#[derive(Debug, Deserialize)]
struct PrimaryResource {
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    message: SearchMessage,
}

#[derive(Debug, Deserialize)]
struct SearchMessage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    score: f64,
}

/// Accepted result of a title-to-DOI lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleMatch {
    /// DOI of the matched work.
    pub doi: String,
    /// Title Crossref returned.
    pub title: String,
    /// Crossref relevance score.
    pub score: f64,
    /// Jaro-Winkler similarity between the query and returned titles.
    pub similarity: f64,
}

// ==================== CrossrefResolver ====================

/// Resolves DOIs to PDF links via the Crossref REST API.
#[derive(Debug, Clone)]
pub struct CrossrefResolver {
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
    min_score: f64,
    min_similarity: f64,
}

impl CrossrefResolver {
    /// Creates a resolver using the public API.
    #[must_use]
    pub fn new(client: HttpClient, mailto: Option<String>) -> Self {
        Self::with_base_url(client, mailto, DEFAULT_BASE_URL)
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(
        client: HttpClient,
        mailto: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.trim().is_empty()),
            min_score: DEFAULT_TITLE_MIN_SCORE,
            min_similarity: DEFAULT_TITLE_MIN_SIMILARITY,
        }
    }

    /// Sets the title lookup thresholds. A similarity of 0 disables the title check.
    #[must_use]
    pub fn with_title_thresholds(mut self, min_score: f64, min_similarity: f64) -> Self {
        self.min_score = min_score;
        self.min_similarity = min_similarity;
        self
    }

    fn mailto_param(&self) -> String {
        self.mailto
            .as_deref()
            .map(|m| format!("mailto={}", urlencoding::encode(m)))
            .unwrap_or_default()
    }

    /// Looks up the DOI of the best Crossref match for `title`.
    ///
    /// Returns `Ok(None)` when the top hit scores too low or its title is
    /// too dissimilar.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the search request fails.
    #[tracing::instrument(skip(self), fields(resolver = "crossref"))]
    pub async fn lookup_doi_by_title(&self, title: &str) -> Result<Option<TitleMatch>, FetchError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let mut url = format!(
            "{}/works?query.bibliographic={}&rows=1&select=DOI,title,score",
            self.base_url,
            urlencoding::encode(title)
        );
        let mailto = self.mailto_param();
        if !mailto.is_empty() {
            url.push('&');
            url.push_str(&mailto);
        }

        let response: SearchResponse = self.client.get_json(&url).await?;
        let Some(item) = response.message.items.into_iter().next() else {
            debug!("no Crossref match for title");
            return Ok(None);
        };
        let Some(doi) = item.doi.map(|d| normalize_doi(&d)).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };

        if item.score <= self.min_score {
            debug!(score = item.score, min = self.min_score, "Crossref match score too low");
            return Ok(None);
        }

        let returned_title = item.title.into_iter().next().unwrap_or_default();
        let similarity = title_similarity(title, &returned_title);
        if self.min_similarity > 0.0 && similarity < self.min_similarity {
            debug!(
                similarity,
                min = self.min_similarity,
                returned_title = %returned_title,
                "Crossref match title too dissimilar"
            );
            return Ok(None);
        }

        info!(doi = %doi, score = item.score, similarity, "found DOI via Crossref title search");
        Ok(Some(TitleMatch {
            doi,
            title: returned_title,
            score: item.score,
            similarity,
        }))
    }
}

/// Jaro-Winkler similarity of two titles after lower-casing and collapsing whitespace.
#[must_use]
pub fn title_similarity(lhs: &str, rhs: &str) -> f64 {
    let normalize = |s: &str| {
        s.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    strsim::jaro_winkler(&normalize(lhs), &normalize(rhs))
}

#[async_trait]
impl Resolver for CrossrefResolver {
    fn name(&self) -> &'static str {
        "crossref"
    }

    #[tracing::instrument(skip_all, fields(resolver = "crossref", doi))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(doi) = record.doi() else {
            return Err(AcquisitionError::not_applicable("no DOI"));
        };
        if self.mailto.is_none() {
            return Err(AcquisitionError::not_applicable("no contact email configured"));
        }
        tracing::Span::current().record("doi", doi);

        let url = format!(
            "{}/works/{}?{}",
            self.base_url,
            urlencoding::encode(doi),
            self.mailto_param()
        );
        debug!(api_url = %url, "calling Crossref API");

        let response: WorkResponse = match self.client.get_json(&url).await {
            Ok(parsed) => parsed,
            Err(FetchError::HttpStatus { status: 404, .. }) => {
                return Err(AcquisitionError::not_applicable(
                    "DOI not found in Crossref",
                ));
            }
            Err(error) => return Err(error.into()),
        };

        extract_pdf_url(&response.message)
            .map(PdfCandidate::direct)
            .ok_or_else(|| AcquisitionError::not_applicable("Crossref lists no PDF link"))
    }
}

// ==================== Extraction Helpers ====================

/// First `link` with a PDF content type, else a primary resource URL containing `.pdf`.
fn extract_pdf_url(message: &WorkMessage) -> Option<String> {
    message
        .link
        .iter()
        .find(|link| link.content_type.as_deref().is_some_and(is_pdf_content_type))
        .map(|link| link.url.clone())
        .or_else(|| {
            message
                .resource
                .as_ref()
                .and_then(|r| r.primary.as_ref())
                .and_then(|p| p.url.clone())
                .filter(|url| url.to_ascii_lowercase().contains(".pdf"))
        })
}

fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|mime| mime.eq_ignore_ascii_case("application/pdf"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::RateLimiter;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new().with_rate_limiter(Arc::new(RateLimiter::disabled()))
    }

    fn message(json: serde_json::Value) -> WorkMessage {
        serde_json::from_value::<WorkResponse>(json).unwrap().message
    }

    #[test]
    fn test_extract_pdf_url_prefers_pdf_link() {
        let msg = message(serde_json::json!({
            "status": "ok",
            "message": {
                "link": [
                    {"URL": "https://pub.example/x.xml", "content-type": "text/xml"},
                    {"URL": "https://pub.example/x.pdf", "content-type": "application/pdf; charset=binary"}
                ],
                "resource": {"primary": {"URL": "https://pub.example/landing.pdf"}}
            }
        }));
        assert_eq!(extract_pdf_url(&msg).as_deref(), Some("https://pub.example/x.pdf"));
    }

    #[test]
    fn test_extract_pdf_url_falls_back_to_primary_resource() {
        let msg = message(serde_json::json!({
            "message": {"resource": {"primary": {"URL": "https://pub.example/Paper.PDF"}}}
        }));
        assert_eq!(
            extract_pdf_url(&msg).as_deref(),
            Some("https://pub.example/Paper.PDF")
        );
    }

    #[test]
    fn test_extract_pdf_url_ignores_html_primary_resource() {
        let msg = message(serde_json::json!({
            "message": {"resource": {"primary": {"URL": "https://pub.example/article/1"}}}
        }));
        assert!(extract_pdf_url(&msg).is_none());
    }

    #[test]
    fn test_title_similarity_normalizes_case_and_spacing() {
        let sim = title_similarity("Deep  Learning for Cats", "deep learning for cats");
        assert!((sim - 1.0).abs() < f64::EPSILON);
        assert!(title_similarity("Deep learning", "Medieval pottery glazes") < 0.7);
    }

    #[tokio::test]
    async fn test_resolve_requires_mailto() {
        let resolver = CrossrefResolver::new(client(), None);
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        assert!(resolver.resolve(&record).await.unwrap_err().is_not_applicable());
    }

    #[tokio::test]
    async fn test_resolve_returns_pdf_link() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/works/10.1234%2Fx"))
            .and(query_param("mailto", "me@example.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": {"link": [{"URL": "https://pub.example/x.pdf", "content-type": "application/pdf"}]}
            })))
            .mount(&server)
            .await;

        let resolver =
            CrossrefResolver::with_base_url(client(), Some("me@example.org".into()), server.uri());
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        let candidate = resolver.resolve(&record).await.unwrap();
        assert_eq!(candidate.url, "https://pub.example/x.pdf");
    }

    #[tokio::test]
    async fn test_title_lookup_accepts_good_match() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("query.bibliographic", "Attention Is All You Need"))
            .and(query_param("rows", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"items": [{
                    "DOI": "10.5555/attention",
                    "title": ["Attention is all you need"],
                    "score": 88.2
                }]}
            })))
            .mount(&server)
            .await;

        let resolver = CrossrefResolver::with_base_url(client(), None, server.uri());
        let found = resolver
            .lookup_doi_by_title("Attention Is All You Need")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.doi, "10.5555/attention");
        assert!(found.similarity > 0.9);
    }

    #[tokio::test]
    async fn test_title_lookup_rejects_low_score() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"items": [{"DOI": "10.1/x", "title": ["Same title"], "score": 50.0}]}
            })))
            .mount(&server)
            .await;

        let resolver = CrossrefResolver::with_base_url(client(), None, server.uri());
        assert!(resolver.lookup_doi_by_title("Same title").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_title_lookup_rejects_dissimilar_title_unless_disabled() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"items": [{"DOI": "10.1/x", "title": ["Medieval pottery glazes"], "score": 120.0}]}
            })))
            .mount(&server)
            .await;

        let strict = CrossrefResolver::with_base_url(client(), None, server.uri());
        assert!(strict.lookup_doi_by_title("Quantum error correction").await.unwrap().is_none());

        let lenient = strict.with_title_thresholds(50.0, 0.0);
        let found = lenient.lookup_doi_by_title("Quantum error correction").await.unwrap();
        assert_eq!(found.unwrap().doi, "10.1/x");
    }
}
