//! Resolvers: turn a bibliographic record into a candidate PDF URL.
//!
//! Each resolver implements one acquisition route. A resolver only *locates*
//! a candidate; fetching and validating the bytes is done by
//! [`ResolverStrategy`](crate::strategy::ResolverStrategy) so every route goes
//! through the same fetch utility and content gate.
//!
//! # Architecture
//!
//! - [`Resolver`] - async trait every route implements
//! - [`PdfCandidate`] - URL plus whether one landing-page hop is allowed
//! - [`DirectPdfResolver`] - landing URL already points at a PDF
//! - [`MetadataServiceResolver`] - local Zotero translation server
//! - [`PreprintResolver`] - arXiv and bioRxiv/medRxiv URL construction
//! - [`UnpaywallResolver`] - open-access location lookup by DOI
//! - [`CrossrefResolver`] - Crossref works links by DOI, plus title lookup
//! - [`PmcResolver`] - `PubMed` Central and Europe PMC
//! - [`PublisherResolver`] - host-specific URL rewrites
//! - [`SocialResolver`] - `ResearchGate` search page
//! - [`ScraperResolver`] - generic landing-page scraping
//! - [`MirrorResolver`] - opt-in mirror lookup by DOI
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::record::BibliographicRecord;
//! use paperfetch_core::resolver::{PreprintResolver, Resolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = PreprintResolver::new();
//! let record = BibliographicRecord::default().with_preprint_id("2101.00001");
//! let candidate = resolver.resolve(&record).await?;
//! assert_eq!(candidate.url, "https://arxiv.org/abs/2101.00001");
//! # Ok(())
//! # }
//! ```

mod crossref;
mod direct;
mod metadata_service;
mod mirror;
mod pmc;
mod preprint;
mod publisher;
mod scrape;
mod social;
mod unpaywall;
pub mod utils;

pub use crossref::{
    CrossrefResolver, DEFAULT_TITLE_MIN_SCORE, DEFAULT_TITLE_MIN_SIMILARITY, TitleMatch,
    title_similarity,
};
pub use direct::DirectPdfResolver;
pub use metadata_service::{DEFAULT_ZOTERO_URL, MetadataServiceResolver};
pub use mirror::MirrorResolver;
pub use pmc::PmcResolver;
pub use preprint::PreprintResolver;
pub use publisher::{PublisherResolver, rewrite_publisher_url};
pub use scrape::ScraperResolver;
pub use social::SocialResolver;
pub use unpaywall::UnpaywallResolver;

use async_trait::async_trait;

use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

/// A located PDF URL, not yet fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfCandidate {
    /// URL expected to serve the PDF.
    pub url: String,
    /// When the URL serves HTML instead, one `citation_pdf_url` hop is allowed.
    pub landing_hop: bool,
}

impl PdfCandidate {
    /// Candidate expected to serve the PDF directly.
    #[must_use]
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            landing_hop: false,
        }
    }

    /// Candidate that may be a landing page declaring its PDF.
    #[must_use]
    pub fn via_landing(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            landing_hop: true,
        }
    }
}

/// Trait that all resolvers must implement.
///
/// Returning [`AcquisitionError::NotApplicable`] means the record lacks what
/// this route needs; it is recorded but is not a failure of the route.
///
/// # Object Safety
///
/// Uses `async_trait` so resolvers can be boxed behind `dyn Resolver` in the
/// strategy cascade.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Stable strategy name recorded in outcomes and logs.
    fn name(&self) -> &'static str;

    /// Locates a PDF candidate for `record`.
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError>;
}
