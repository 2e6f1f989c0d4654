//! Unpaywall resolver - best open-access PDF location for a DOI.
//!
//! Calls `GET {base}/v2/<doi>?email=<contact>` and takes
//! `best_oa_location.url_for_pdf`. Unpaywall requires a contact email, so a
//! record is not applicable when none is configured.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{PdfCandidate, Resolver};
use crate::download::{FetchError, HttpClient};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

/// Default Unpaywall API base URL.
const DEFAULT_BASE_URL: &str = "https://api.unpaywall.org";

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<OaLocation>,
}

#[derive(Debug, Deserialize)]
struct OaLocation {
    url_for_pdf: Option<String>,
}

/// Looks up open-access PDF locations via the Unpaywall API.
#[derive(Debug, Clone)]
pub struct UnpaywallResolver {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
}

impl UnpaywallResolver {
    /// Creates a resolver using the public API.
    #[must_use]
    pub fn new(client: HttpClient, email: Option<String>) -> Self {
        Self::with_base_url(client, email, DEFAULT_BASE_URL)
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(
        client: HttpClient,
        email: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.filter(|e| !e.trim().is_empty()),
        }
    }
}

#[async_trait]
impl Resolver for UnpaywallResolver {
    fn name(&self) -> &'static str {
        "unpaywall"
    }

    #[tracing::instrument(skip_all, fields(resolver = "unpaywall", doi))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(doi) = record.doi() else {
            return Err(AcquisitionError::not_applicable("no DOI"));
        };
        let Some(email) = self.email.as_deref() else {
            return Err(AcquisitionError::not_applicable("no contact email configured"));
        };
        tracing::Span::current().record("doi", doi);

        let url = format!(
            "{}/v2/{}?email={}",
            self.base_url,
            doi,
            urlencoding::encode(email)
        );
        let response: UnpaywallResponse = match self.client.get_json(&url).await {
            Ok(parsed) => parsed,
            Err(FetchError::HttpStatus { status: 404, .. }) => {
                return Err(AcquisitionError::not_applicable(
                    "DOI unknown to Unpaywall",
                ));
            }
            Err(error) => return Err(error.into()),
        };

        response
            .best_oa_location
            .and_then(|location| location.url_for_pdf)
            .filter(|pdf| !pdf.trim().is_empty())
            .map(|pdf| {
                debug!(pdf_url = %pdf, "open-access PDF located");
                PdfCandidate::direct(pdf)
            })
            .ok_or_else(|| AcquisitionError::not_applicable("no open-access PDF location"))
    }
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

    #[tokio::test]
    async fn test_missing_email_is_not_applicable() {
        let resolver = UnpaywallResolver::new(client(), Some("  ".to_string()));
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        assert!(resolver.resolve(&record).await.unwrap_err().is_not_applicable());
    }

    #[tokio::test]
    async fn test_missing_doi_is_not_applicable() {
        let resolver = UnpaywallResolver::new(client(), Some("me@example.org".to_string()));
        let record = BibliographicRecord::titled("No DOI here");
        assert!(resolver.resolve(&record).await.unwrap_err().is_not_applicable());
    }

    #[tokio::test]
    async fn test_best_oa_location_is_returned() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/v2/10.1234/x"))
            .and(query_param("email", "me@example.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "doi": "10.1234/x",
                "best_oa_location": {"url_for_pdf": "https://repo.example/x.pdf"}
            })))
            .mount(&server)
            .await;

        let resolver = UnpaywallResolver::with_base_url(
            client(),
            Some("me@example.org".to_string()),
            server.uri(),
        );
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        let candidate = resolver.resolve(&record).await.unwrap();
        assert_eq!(candidate.url, "https://repo.example/x.pdf");
    }

    #[tokio::test]
    async fn test_closed_access_is_not_applicable() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"best_oa_location": null})),
            )
            .mount(&server)
            .await;

        let resolver = UnpaywallResolver::with_base_url(
            client(),
            Some("me@example.org".to_string()),
            server.uri(),
        );
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        assert!(resolver.resolve(&record).await.unwrap_err().is_not_applicable());
    }
}
