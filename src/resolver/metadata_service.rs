//! Metadata-service resolver backed by a local Zotero translation server.
//!
//! The server exposes two operations used here:
//!
//! - `POST /web` with `{"url", "session"}` translates a landing page
//! - `POST /search` with a `text/plain` identifier translates a DOI, PMID or
//!   arXiv ID
//!
//! Both return a list of Zotero items; the first item's PDF attachment is the
//! candidate. The server is optional: its availability is probed once per
//! run and an unreachable server makes this route not applicable.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{PdfCandidate, Resolver};
use crate::download::{FetchError, HttpClient};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

/// Default translation server address.
pub const DEFAULT_ZOTERO_URL: &str = "http://localhost:1969";

/// Session label sent with `/web` translations.
const SESSION_ID: &str = "paperfetch";

/// Resolves PDF attachments through a Zotero translation server.
#[derive(Debug)]
pub struct MetadataServiceResolver {
    client: HttpClient,
    base_url: String,
    available: OnceCell<bool>,
}

impl MetadataServiceResolver {
    /// Creates a resolver for the server at `base_url`.
    #[must_use]
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            available: OnceCell::new(),
        }
    }

    /// True when the server answered the one-time probe.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let up = self.client.is_reachable(&self.base_url).await;
                if up {
                    info!(url = %self.base_url, "metadata service available");
                } else {
                    info!(url = %self.base_url, "metadata service unavailable; skipping it for this run");
                }
                up
            })
            .await
    }

    async fn translate_url(&self, url: &str) -> Result<Option<Value>, FetchError> {
        let endpoint = format!("{}/web", self.base_url);
        let reply = self
            .client
            .post_json(&endpoint, &json!({ "url": url, "session": SESSION_ID }))
            .await?;
        if reply.status != 300 {
            return Ok(first_item(&reply.body));
        }

        debug!("multiple choices returned; selecting the first");
        let Some(narrowed) = narrow_to_first_choice(reply.body) else {
            return Ok(None);
        };
        let reply = self.client.post_json(&endpoint, &narrowed).await?;
        Ok(first_item(&reply.body))
    }

    async fn translate_identifier(&self, identifier: &str) -> Result<Option<Value>, FetchError> {
        let endpoint = format!("{}/search", self.base_url);
        let reply = self.client.post_text(&endpoint, identifier).await?;
        if reply.status == 300 {
            return Ok(first_choice_item(&reply.body));
        }
        Ok(first_item(&reply.body))
    }

    /// Tries the landing URL, then each identifier; the last error is kept
    /// only when nothing produced a PDF.
    async fn lookup(&self, record: &BibliographicRecord) -> Result<Option<String>, FetchError> {
        let mut last_error = None;

        if let Some(url) = record.landing_url() {
            match self.translate_url(url).await {
                Ok(Some(item)) => {
                    if let Some(pdf) = pdf_attachment_url(&item) {
                        return Ok(Some(pdf));
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(error = %error, "URL translation failed");
                    last_error = Some(error);
                }
            }
        }

        let identifiers = [record.doi().map(str::to_string), record.pmid(), record.arxiv_id()];
        for identifier in identifiers.into_iter().flatten() {
            match self.translate_identifier(&identifier).await {
                Ok(Some(item)) => {
                    if let Some(pdf) = pdf_attachment_url(&item) {
                        return Ok(Some(pdf));
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(identifier = %identifier, error = %error, "identifier translation failed");
                    last_error = Some(error);
                }
            }
        }

        last_error.map_or(Ok(None), Err)
    }
}

#[async_trait]
impl Resolver for MetadataServiceResolver {
    fn name(&self) -> &'static str {
        "metadata_service"
    }

    #[tracing::instrument(skip_all, fields(resolver = "metadata_service"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        if record.landing_url().is_none()
            && record.doi().is_none()
            && record.pmid().is_none()
            && record.arxiv_id().is_none()
        {
            return Err(AcquisitionError::not_applicable(
                "no URL, DOI, PMID or arXiv ID to translate",
            ));
        }
        if !self.is_available().await {
            return Err(AcquisitionError::not_applicable(
                "metadata service unavailable",
            ));
        }

        match self.lookup(record).await {
            Ok(Some(url)) => Ok(PdfCandidate::direct(url)),
            Ok(None) => Err(AcquisitionError::not_applicable(
                "metadata service returned no PDF attachment",
            )),
            // 501 means no translator for the input
            Err(FetchError::HttpStatus { status: 501, .. }) => Err(
                AcquisitionError::not_applicable("no translator for this record"),
            ),
            Err(error) => Err(error.into()),
        }
    }
}

/// First element of a JSON array body.
fn first_item(body: &Value) -> Option<Value> {
    body.as_array().and_then(|items| items.first()).cloned()
}

/// For `/web` 300 replies: keep only the first entry of `items` for the follow-up request.
fn narrow_to_first_choice(mut body: Value) -> Option<Value> {
    let object = body.as_object_mut()?;
    let (key, value) = object
        .get("items")?
        .as_object()?
        .iter()
        .next()
        .map(|(k, v)| (k.clone(), v.clone()))?;
    let mut narrowed = Map::new();
    narrowed.insert(key, value);
    object.insert("items".to_string(), Value::Object(narrowed));
    Some(body)
}

/// For `/search` 300 replies: the first full item among the choices.
fn first_choice_item(body: &Value) -> Option<Value> {
    let items = body.get("items").unwrap_or(body);
    match items {
        Value::Object(map) => map.values().find(|v| v.is_object()).cloned(),
        Value::Array(list) => list.first().cloned(),
        _ => None,
    }
}

/// PDF URL from a translated item: attachments first, then item-level links.
fn pdf_attachment_url(item: &Value) -> Option<String> {
    let attachments = item
        .get("attachments")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    let string_field = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    for attachment in attachments {
        let is_pdf = ["mimeType", "contentType"].iter().any(|key| {
            string_field(attachment, key).is_some_and(|t| t.eq_ignore_ascii_case("application/pdf"))
        });
        if is_pdf && let Some(url) = string_field(attachment, "url") {
            return Some(url);
        }
    }

    for attachment in attachments {
        let title = string_field(attachment, "title")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if (title.contains("pdf") || title.contains("full text"))
            && let Some(url) = string_field(attachment, "url")
            && url.to_ascii_lowercase().contains(".pdf")
        {
            return Some(url);
        }
    }

    string_field(item, "url")
        .filter(|url| url.to_ascii_lowercase().ends_with(".pdf"))
        .or_else(|| string_field(item, "pdfUrl"))
}
