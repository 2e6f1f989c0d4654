//! Publisher resolver - host-specific landing URL to PDF URL rewrites.
//!
//! Each rule matches on the landing URL's host and rewrites the URL into the
//! publisher's PDF endpoint. Hosts without a rule are not applicable.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::utils::{compile_static_regex, host_matches_suffix, host_of};
use super::{PdfCandidate, Resolver};
use crate::error::AcquisitionError;
use crate::record::BibliographicRecord;

static IEEE_DOCUMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/document/(\d+)"));

static ACM_DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/doi/(?:abs/|full/)?(10\.\d{4,9}/[^?#]+)"));

struct RewriteRule {
    publisher: &'static str,
    host_suffix: &'static str,
    rewrite: fn(&str) -> Option<String>,
}

const RULES: &[RewriteRule] = &[
    RewriteRule {
        publisher: "mdpi",
        host_suffix: "mdpi.com",
        rewrite: rewrite_mdpi,
    },
    RewriteRule {
        publisher: "frontiers",
        host_suffix: "frontiersin.org",
        rewrite: rewrite_frontiers,
    },
    RewriteRule {
        publisher: "nature",
        host_suffix: "nature.com",
        rewrite: rewrite_nature,
    },
    RewriteRule {
        publisher: "ieee",
        host_suffix: "ieeexplore.ieee.org",
        rewrite: rewrite_ieee,
    },
    RewriteRule {
        publisher: "sciencedirect",
        host_suffix: "sciencedirect.com",
        rewrite: rewrite_sciencedirect,
    },
    RewriteRule {
        publisher: "springer",
        host_suffix: "link.springer.com",
        rewrite: rewrite_springer,
    },
    RewriteRule {
        publisher: "plos",
        host_suffix: "journals.plos.org",
        rewrite: rewrite_plos,
    },
    RewriteRule {
        publisher: "acm",
        host_suffix: "dl.acm.org",
        rewrite: rewrite_acm,
    },
];

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

fn rewrite_mdpi(url: &str) -> Option<String> {
    if url.contains("/pdf") {
        return None;
    }
    Some(format!("{}/pdf", strip_query(url).trim_end_matches('/')))
}

fn rewrite_frontiers(url: &str) -> Option<String> {
    if !url.contains("/full") || url.contains("/pdf") {
        return None;
    }
    Some(url.replacen("/full", "/pdf", 1))
}

fn rewrite_nature(url: &str) -> Option<String> {
    let base = strip_query(url).trim_end_matches('/');
    if base.ends_with(".pdf") || !base.contains("/articles/") {
        return None;
    }
    Some(format!("{base}.pdf"))
}

fn rewrite_ieee(url: &str) -> Option<String> {
    let arnumber = IEEE_DOCUMENT_RE.captures(url)?.get(1)?.as_str();
    Some(format!(
        "https://ieeexplore.ieee.org/stampPDF/getPDF.jsp?tp=&arnumber={arnumber}"
    ))
}

fn rewrite_sciencedirect(url: &str) -> Option<String> {
    if !url.contains("/pii/") {
        return None;
    }
    Some(format!(
        "{}/pdfft?isDTMRedir=true&download=true",
        strip_query(url).trim_end_matches('/')
    ))
}

fn rewrite_springer(url: &str) -> Option<String> {
    let base = strip_query(url).trim_end_matches('/');
    if base.ends_with(".pdf") || !(base.contains("/article/") || base.contains("/chapter/")) {
        return None;
    }
    Some(format!("{base}.pdf"))
}

fn rewrite_plos(url: &str) -> Option<String> {
    if !url.contains("/article?") {
        return None;
    }
    Some(format!("{}&type=printable", url.replacen("/article?", "/article/file?", 1)))
}

fn rewrite_acm(url: &str) -> Option<String> {
    if url.contains("/doi/pdf/") {
        return None;
    }
    let doi = ACM_DOI_RE.captures(url)?.get(1)?.as_str();
    Some(format!("https://dl.acm.org/doi/pdf/{doi}"))
}

/// Rewrites a known publisher landing URL into its PDF endpoint.
///
/// Returns `None` when the host has no rule or the URL is already a PDF
/// endpoint for that publisher.
///
/// # Example
///
/// ```
/// use paperfetch_core::resolver::rewrite_publisher_url;
///
/// assert_eq!(
///     rewrite_publisher_url("https://www.mdpi.com/2076-3417/11/1/1").as_deref(),
///     Some("https://www.mdpi.com/2076-3417/11/1/1/pdf")
/// );
/// assert!(rewrite_publisher_url("https://example.org/paper").is_none());
/// ```
#[must_use]
pub fn rewrite_publisher_url(url: &str) -> Option<String> {
    let host = host_of(url)?;
    let rule = RULES
        .iter()
        .find(|rule| host_matches_suffix(&host, rule.host_suffix))?;
    let rewritten = (rule.rewrite)(url.trim())?;
    debug!(publisher = rule.publisher, url = %rewritten, "publisher rewrite applied");
    Some(rewritten)
}

/// Rewrites landing URLs of known publishers into their PDF endpoints.
#[derive(Debug, Clone, Default)]
pub struct PublisherResolver;

impl PublisherResolver {
    /// Creates the resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for PublisherResolver {
    fn name(&self) -> &'static str {
        "publisher"
    }

    #[tracing::instrument(skip_all, fields(resolver = "publisher"))]
    async fn resolve(&self, record: &BibliographicRecord) -> Result<PdfCandidate, AcquisitionError> {
        let Some(url) = record.landing_url() else {
            return Err(AcquisitionError::not_applicable("no landing URL"));
        };
        rewrite_publisher_url(url)
            .map(PdfCandidate::direct)
            .ok_or_else(|| AcquisitionError::not_applicable("no publisher rule for landing URL"))
    }
}
