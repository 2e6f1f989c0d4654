//! Shared utilities for resolver modules: host normalization, site matching,
//! DOI cleanup and `citation_pdf_url` extraction.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Parses a CSS selector at static init; panics on invalid selector.
pub fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

static CITATION_PDF_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector(r#"meta[name="citation_pdf_url"], meta[property="citation_pdf_url"]"#)
});

/// Leading noise on DOIs copied from links or citations.
static DOI_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)")
});

/// Normalizes a host string: trim, strip leading "www.", trailing '.', and lowercases.
#[must_use]
pub fn canonical_host(host: &str) -> String {
    host.trim()
        .trim_start_matches("www.")
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Canonical host of `url`, if it parses.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(canonical_host))
}

/// Last two labels of a host (`pdf.sciencedirectassets.com` gives `sciencedirectassets.com`).
#[must_use]
pub fn second_level_domain(host: &str) -> String {
    let host = canonical_host(host);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}

/// True when both URLs share a second-level domain.
#[must_use]
pub fn same_site(lhs: &str, rhs: &str) -> bool {
    match (host_of(lhs), host_of(rhs)) {
        (Some(a), Some(b)) => second_level_domain(&a) == second_level_domain(&b),
        _ => false,
    }
}

/// True when `host` equals `suffix` or is a subdomain of it.
#[must_use]
pub fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let host = canonical_host(host);
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Resolves a possibly relative URL string against a base URL.
///
/// Returns the value as-is if it already starts with `http://` or `https://`;
/// normalizes `//...` to `https:...`; otherwise joins with `base_url`.
#[must_use]
pub fn absolutize_url(value: &str, base_url: &Url) -> Option<String> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(value.to_string());
    }
    if value.starts_with("//") {
        return Some(format!("https:{value}"));
    }
    base_url.join(value).ok().map(|url| url.to_string())
}

/// True when the URL path (ignoring query and fragment) ends in `.pdf`.
#[must_use]
pub fn is_pdf_path(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Strips `https://doi.org/` and `doi:` prefixes and surrounding whitespace.
#[must_use]
pub fn normalize_doi(doi: &str) -> String {
    DOI_PREFIX_RE.replace(doi.trim(), "").trim().to_string()
}

/// Absolute `citation_pdf_url` declared in an HTML document, if any.
#[must_use]
pub fn citation_pdf_url(html: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&CITATION_PDF_SELECTOR)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .and_then(|content| absolutize_url(content, &base))
}
