//! Strategies: one acquisition route each, producing validated PDF bytes.
//!
//! [`ResolverStrategy`] wraps a [`Resolver`]: locate a candidate, fetch it
//! through the shared [`HttpClient`], and pass the bytes through the content
//! gate. [`BrowserStrategy`] drives the shared [`BrowserSession`].
//! [`build_cascade`] assembles the enabled strategies in cascade order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::AcquisitionConfig;
use crate::download::{FetchedBody, HttpClient, validate_pdf};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;
use crate::resolver::utils::citation_pdf_url;
use crate::resolver::{
    CrossrefResolver, DirectPdfResolver, MetadataServiceResolver, MirrorResolver, PdfCandidate,
    PmcResolver, PreprintResolver, PublisherResolver, Resolver, ScraperResolver, SocialResolver,
    UnpaywallResolver,
};

/// Validated PDF bytes and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredPdf {
    /// Bytes that passed the content gate.
    pub bytes: Vec<u8>,
    /// URL the bytes were read from.
    pub source_url: String,
}

/// One route in the cascade.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Stable name recorded in outcomes, logs and statistics.
    fn name(&self) -> &'static str;

    /// Tries to obtain a validated PDF for `record`.
    async fn attempt(&self, record: &BibliographicRecord) -> Result<AcquiredPdf, AcquisitionError>;
}

/// Resolve, fetch, validate.
#[derive(Debug, Clone)]
pub struct ResolverStrategy<R> {
    resolver: R,
    client: HttpClient,
}

impl<R: Resolver> ResolverStrategy<R> {
    /// Wraps `resolver`, fetching candidates with `client`.
    #[must_use]
    pub fn new(resolver: R, client: HttpClient) -> Self {
        Self { resolver, client }
    }

    async fn follow_candidate(
        &self,
        candidate: PdfCandidate,
    ) -> Result<AcquiredPdf, AcquisitionError> {
        let body = self.client.fetch(&candidate.url).await?;
        if candidate.landing_hop
            && body.is_html()
            && let Some(pdf_url) = citation_pdf_url(&body.text(), &body.final_url)
        {
            debug!(landing = %body.final_url, pdf_url = %pdf_url, "following citation_pdf_url");
            let pdf = self.client.fetch(&pdf_url).await?;
            return accept(pdf);
        }
        accept(body)
    }
}

/// Passes a fetched body through the content gate.
fn accept(body: FetchedBody) -> Result<AcquiredPdf, AcquisitionError> {
    match validate_pdf(&body.bytes) {
        Ok(()) => Ok(AcquiredPdf {
            bytes: body.bytes,
            source_url: body.final_url,
        }),
        Err(reason) => Err(AcquisitionError::content(body.final_url, reason)),
    }
}

#[async_trait]
impl<R: Resolver> Strategy for ResolverStrategy<R> {
    fn name(&self) -> &'static str {
        self.resolver.name()
    }

    async fn attempt(&self, record: &BibliographicRecord) -> Result<AcquiredPdf, AcquisitionError> {
        let candidate = self.resolver.resolve(record).await?;
        debug!(strategy = self.name(), url = %candidate.url, "candidate located");
        self.follow_candidate(candidate).await
    }
}

/// Render-capture fallback through the shared browser session.
#[derive(Debug, Clone)]
pub struct BrowserStrategy {
    session: Arc<BrowserSession>,
}

impl BrowserStrategy {
    /// Uses `session` for every attempt.
    #[must_use]
    pub fn new(session: Arc<BrowserSession>) -> Self {
        Self { session }
    }
}

/// Landing URL, else the DOI resolver URL.
fn browser_target(record: &BibliographicRecord) -> Option<String> {
    record
        .landing_url()
        .map(str::to_string)
        .or_else(|| record.doi().map(|doi| format!("https://doi.org/{doi}")))
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn attempt(&self, record: &BibliographicRecord) -> Result<AcquiredPdf, AcquisitionError> {
        let Some(target) = browser_target(record) else {
            return Err(AcquisitionError::not_applicable("no landing URL or DOI"));
        };
        let bytes = self.session.acquire(&target).await?;
        Ok(AcquiredPdf {
            bytes,
            source_url: target,
        })
    }
}

fn via<R: Resolver + 'static>(resolver: R, client: &HttpClient) -> Box<dyn Strategy> {
    Box::new(ResolverStrategy::new(resolver, client.clone()))
}

/// Builds the enabled strategies in cascade order.
///
/// `browser` is only included when a session is supplied.
#[must_use]
pub fn build_cascade(
    config: &AcquisitionConfig,
    client: &HttpClient,
    browser: Option<Arc<BrowserSession>>,
) -> Vec<Box<dyn Strategy>> {
    let email = config.contact_email.clone();
    let mut cascade: Vec<Box<dyn Strategy>> = Vec::new();
    for name in config.enabled_strategies() {
        let strategy: Box<dyn Strategy> = match name {
            "direct_pdf" => via(DirectPdfResolver::new(), client),
            "metadata_service" => via(
                MetadataServiceResolver::new(client.clone(), config.zotero_url.clone()),
                client,
            ),
            "preprint" => via(PreprintResolver::new(), client),
            "unpaywall" => via(UnpaywallResolver::new(client.clone(), email.clone()), client),
            "crossref" => via(CrossrefResolver::new(client.clone(), email.clone()), client),
            "pmc" => via(PmcResolver::new(client.clone()), client),
            "publisher" => via(PublisherResolver::new(), client),
            "social" => via(SocialResolver::new(client.clone()), client),
            "scraper" => via(ScraperResolver::new(client.clone()), client),
            "browser" => match &browser {
                Some(session) => Box::new(BrowserStrategy::new(Arc::clone(session))),
                None => continue,
            },
            "mirror" => via(MirrorResolver::new(client.clone(), config.mirror_url.clone()), client),
            _ => continue,
        };
        cascade.push(strategy);
    }
    cascade
}
