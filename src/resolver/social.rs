//! Academic social network resolver (`ResearchGate`).
//!
//! Searches the publication index by title and scans the result page for an
//! author-uploaded PDF link. The search page must stay on the network's own
//! site; a redirect elsewhere (consent wall, login) yields no candidate.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::utils::{absolutize_url, compile_static_regex, same_site};
use super::{PdfCandidate, Resolver};
use crate::download::HttpClient;
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

const DEFAULT_BASE_URL: &str = "https://www.researchgate.net";

/// Characters of the title sent as the search query.
const MAX_QUERY_CHARS: usize = 80;

/// Link patterns tried in order against the search page.
static PDF_LINK_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        compile_static_regex(r#"href=["']([^"']*(?:download|pdf)[^"']*\.pdf[^"']*)["']"#),
        compile_static_regex(r#""fullText"["']?\s*:\s*"([^"]+\.pdf[^"]*)""#),
        compile_static_regex(r#"data-ua-action-data="([^"]*\.pdf[^"]*)""#),
    ]
});

/// Looks for author-shared PDFs on `ResearchGate`.
#[derive(Debug, Clone)]
pub struct SocialResolver {
    client: HttpClient,
    base_url: String,
}

impl SocialResolver {
    /// Creates a resolver targeting the public site.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    /// Creates a resolver with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// First PDF link in `html`, absolutized against `page_url`.
fn extract_pdf_link(html: &str, page_url: &Url) -> Option<String> {
    PDF_LINK_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .and_then(|m| absolutize_url(&m.as_str().replace("&amp;", "&"), page_url))
    })
}

#[async_trait]
impl Resolver for SocialResolver {
    fn name(&self) -> &'static str {
        "social"
    }

    #[tracing::instrument(skip_all, fields(resolver = "social"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(title) = record.title() else {
            return Err(AcquisitionError::not_applicable("no title"));
        };
        let query: String = title.chars().take(MAX_QUERY_CHARS).collect();
        let search_url = format!(
            "{}/publication/search?q={}",
            self.base_url,
            urlencoding::encode(query.trim())
        );

        let page = self.client.fetch(&search_url).await?;
        if !same_site(&page.final_url, &self.base_url) {
            debug!(final_url = %page.final_url, "search redirected off-site");
            return Err(AcquisitionError::not_applicable(
                "search page redirected off-site",
            ));
        }

        let page_url = Url::parse(&page.final_url)
            .map_err(|_| AcquisitionError::network(format!("invalid URL {}", page.final_url)))?;
        extract_pdf_link(&page.text(), &page_url)
            .map(|link| {
                debug!(pdf_url = %link, "shared PDF found");
                PdfCandidate::direct(link)
            })
            .ok_or_else(|| AcquisitionError::not_applicable("no shared PDF on search page"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::RateLimiter;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new().with_rate_limiter(Arc::new(RateLimiter::disabled()))
    }

    #[test]
    fn test_extract_relative_download_href() {
        let base = Url::parse("https://www.researchgate.net/publication/search?q=x").unwrap();
        let html = r#"<a class="x" href="/publication/1_Title/download/file.pdf">PDF</a>"#;
        assert_eq!(
            extract_pdf_link(html, &base).as_deref(),
            Some("https://www.researchgate.net/publication/1_Title/download/file.pdf")
        );
    }

    #[test]
    fn test_extract_full_text_json() {
        let base = Url::parse("https://www.researchgate.net/").unwrap();
        let html = r#"<script>var d = {"fullText": "https://cdn.example/paper.pdf?v=1"};</script>"#;
        assert_eq!(
            extract_pdf_link(html, &base).as_deref(),
            Some("https://cdn.example/paper.pdf?v=1")
        );
    }

    #[test]
    fn test_no_link_yields_none() {
        let base = Url::parse("https://www.researchgate.net/").unwrap();
        assert!(extract_pdf_link("<html><a href=\"/profile\">x</a></html>", &base).is_none());
    }

    #[tokio::test]
    async fn test_untitled_record_is_not_applicable() {
        let record = BibliographicRecord::default().with_doi("10.1234/x");
        let err = SocialResolver::new(client()).resolve(&record).await.unwrap_err();
        assert!(err.is_not_applicable());
    }

    #[tokio::test]
    async fn test_search_page_link_is_returned() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/publication/search"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<html><a href="/publication/9_Deep/download/deep.pdf">Download</a></html>"#,
                "text/html",
            ))
            .mount(&server)
            .await;

        let resolver = SocialResolver::with_base_url(client(), server.uri());
        let record = BibliographicRecord::titled("Deep learning for things");
        let candidate = resolver.resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            format!("{}/publication/9_Deep/download/deep.pdf", server.uri())
        );
    }

    #[tokio::test]
    async fn test_page_without_links_is_not_applicable() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>nothing</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let resolver = SocialResolver::with_base_url(client(), server.uri());
        let err = resolver
            .resolve(&BibliographicRecord::titled("Some title"))
            .await
            .unwrap_err();
        assert!(err.is_not_applicable());
    }
}
