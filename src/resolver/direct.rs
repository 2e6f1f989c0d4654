//! Direct PDF resolver - the landing URL already names a PDF.

use async_trait::async_trait;

use super::utils::is_pdf_path;
use super::{PdfCandidate, Resolver};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

/// Passes through landing URLs whose path ends in `.pdf`.
#[derive(Debug, Default)]
pub struct DirectPdfResolver;

impl DirectPdfResolver {
    /// Creates a new `DirectPdfResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for DirectPdfResolver {
    fn name(&self) -> &'static str {
        "direct_pdf"
    }

    #[tracing::instrument(skip_all, fields(resolver = "direct_pdf"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        match record.landing_url() {
            Some(url) if is_pdf_path(url) => Ok(PdfCandidate::direct(url)),
            Some(_) => Err(AcquisitionError::not_applicable(
                "landing URL does not point at a .pdf",
            )),
            None => Err(AcquisitionError::not_applicable("no landing URL")),
        }
    }
}
