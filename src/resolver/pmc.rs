//! PubMed Central resolver with a Europe PMC fallback.
//!
//! 1. NCBI ID converter: `<pmid>` to `pmcid`, giving
//!    `{ncbi}/pmc/articles/<pmcid>/pdf/`.
//! 2. Europe PMC search `EXT_ID:<pmid>`: when `hasPDF == "Y"`, giving
//!    `{europepmc}/articles/<pmcid>?pdf=render`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{PdfCandidate, Resolver};
use crate::download::{FetchError, HttpClient};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

const DEFAULT_NCBI_BASE: &str = "https://www.ncbi.nlm.nih.gov";
const DEFAULT_EBI_BASE: &str = "https://www.ebi.ac.uk";
const DEFAULT_EUROPEPMC_BASE: &str = "https://europepmc.org";

#[derive(Debug, Deserialize)]
struct IdConvResponse {
    #[serde(default)]
    records: Vec<IdConvRecord>,
}

#[derive(Debug, Deserialize)]
struct IdConvRecord {
    pmcid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResponse {
    result_list: Option<EuropePmcResultList>,
}

#[derive(Debug, Deserialize)]
struct EuropePmcResultList {
    #[serde(default)]
    result: Vec<EuropePmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResult {
    pmcid: Option<String>,
    #[serde(rename = "hasPDF")]
    has_pdf: Option<String>,
}

/// Locates open-access PDFs in `PubMed` Central and Europe PMC.
#[derive(Debug, Clone)]
pub struct PmcResolver {
    client: HttpClient,
    ncbi_base: String,
    ebi_base: String,
    europepmc_base: String,
}

impl PmcResolver {
    /// Creates a resolver using the public NCBI and EBI endpoints.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_urls(client, DEFAULT_NCBI_BASE, DEFAULT_EBI_BASE, DEFAULT_EUROPEPMC_BASE)
    }

    /// Creates a resolver with custom endpoints (for testing with wiremock).
    #[must_use]
    pub fn with_base_urls(
        client: HttpClient,
        ncbi_base: impl Into<String>,
        ebi_base: impl Into<String>,
        europepmc_base: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ncbi_base: ncbi_base.into().trim_end_matches('/').to_string(),
            ebi_base: ebi_base.into().trim_end_matches('/').to_string(),
            europepmc_base: europepmc_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn pmc_pdf(&self, pmid: &str) -> Result<Option<String>, FetchError> {
        let url = format!(
            "{}/pmc/utils/idconv/v1.0/?ids={pmid}&format=json",
            self.ncbi_base
        );
        let response: IdConvResponse = self.client.get_json(&url).await?;
        Ok(response
            .records
            .into_iter()
            .find_map(|r| r.pmcid.filter(|id| !id.is_empty()))
            .map(|pmcid| {
                debug!(pmcid = %pmcid, "found PMC ID");
                format!("{}/pmc/articles/{pmcid}/pdf/", self.ncbi_base)
            }))
    }

    async fn europepmc_pdf(&self, pmid: &str) -> Result<Option<String>, FetchError> {
        let url = format!(
            "{}/europepmc/webservices/rest/search?query={}&format=json&resultType=core",
            self.ebi_base,
            urlencoding::encode(&format!("EXT_ID:{pmid}"))
        );
        let response: EuropePmcResponse = self.client.get_json(&url).await?;
        let Some(first) = response
            .result_list
            .and_then(|list| list.result.into_iter().next())
        else {
            return Ok(None);
        };
        if first.has_pdf.as_deref() != Some("Y") {
            debug!("in Europe PMC but no PDF available");
            return Ok(None);
        }
        Ok(first
            .pmcid
            .filter(|id| !id.is_empty())
            .map(|pmcid| format!("{}/articles/{pmcid}?pdf=render", self.europepmc_base)))
    }
}

#[async_trait]
impl Resolver for PmcResolver {
    fn name(&self) -> &'static str {
        "pmc"
    }

    #[tracing::instrument(skip_all, fields(resolver = "pmc", pmid))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(pmid) = record.pmid() else {
            return Err(AcquisitionError::not_applicable("no PMID"));
        };
        tracing::Span::current().record("pmid", pmid.as_str());

        let pmc_error = match self.pmc_pdf(&pmid).await {
            Ok(Some(url)) => return Ok(PdfCandidate::direct(url)),
            Ok(None) => None,
            Err(error) => {
                debug!(error = %error, "PMC ID conversion failed; trying Europe PMC");
                Some(error)
            }
        };

        match self.europepmc_pdf(&pmid).await {
            Ok(Some(url)) => Ok(PdfCandidate::direct(url)),
            Ok(None) => match pmc_error {
                Some(error) => Err(error.into()),
                None => Err(AcquisitionError::not_applicable(
                    "not available in PMC or Europe PMC",
                )),
            },
            Err(error) => Err(error.into()),
        }
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
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer) -> PmcResolver {
        let client = HttpClient::new().with_rate_limiter(Arc::new(RateLimiter::disabled()));
        PmcResolver::with_base_urls(client, server.uri(), server.uri(), server.uri())
    }

    #[tokio::test]
    async fn test_missing_pmid_is_not_applicable() {
        let client = HttpClient::new();
        let err = PmcResolver::new(client)
            .resolve(&BibliographicRecord::titled("x"))
            .await
            .unwrap_err();
        assert!(err.is_not_applicable());
    }

    #[tokio::test]
    async fn test_pmcid_from_id_converter() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/pmc/utils/idconv/v1.0/"))
            .and(query_param("ids", "12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{"pmid": "12345", "pmcid": "PMC777"}]
            })))
            .mount(&server)
            .await;

        let record = BibliographicRecord::default().with_pmid("12345");
        let candidate = resolver(&server).resolve(&record).await.unwrap();
        assert_eq!(candidate.url, format!("{}/pmc/articles/PMC777/pdf/", server.uri()));
    }

    #[tokio::test]
    async fn test_europe_pmc_fallback_requires_has_pdf() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/pmc/utils/idconv/v1.0/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{"pmid": "12345"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/europepmc/webservices/rest/search"))
            .and(query_param("query", "EXT_ID:12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultList": {"result": [{"pmcid": "PMC888", "hasPDF": "Y"}]}
            })))
            .mount(&server)
            .await;

        let record = BibliographicRecord::default()
            .with_landing_url("https://pubmed.ncbi.nlm.nih.gov/12345/");
        let candidate = resolver(&server).resolve(&record).await.unwrap();
        assert_eq!(
            candidate.url,
            format!("{}/articles/PMC888?pdf=render", server.uri())
        );
    }

    #[tokio::test]
    async fn test_no_pdf_anywhere_is_not_applicable() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/pmc/utils/idconv/v1.0/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"records": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/europepmc/webservices/rest/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resultList": {"result": [{"pmcid": "PMC888", "hasPDF": "N"}]}
            })))
            .mount(&server)
            .await;

        let record = BibliographicRecord::default().with_pmid("12345");
        let err = resolver(&server).resolve(&record).await.unwrap_err();
        assert!(err.is_not_applicable());
    }
}
