//! Publisher navigation recipes and the generic in-page PDF link search.
//!
//! A recipe is selected by the host of the page the browser landed on. It
//! inspects the rendered page and returns the URL of the publisher's PDF
//! viewer; some platforms then hop to an asset host before the PDF renders.
//! Pages without a recipe use [`generic_pdf_link`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::resolver::utils::{
    absolutize_url, compile_static_regex, compile_static_selector, host_matches_suffix, host_of,
    same_site,
};

/// Publisher-specific override of the generic browser flow.
#[derive(Debug)]
pub struct Recipe {
    /// Name used in logs.
    pub name: &'static str,
    /// Hosts (and their subdomains) this recipe applies to.
    pub host_suffixes: &'static [&'static str],
    /// Host the viewer redirects to before the PDF is rendered, if any.
    pub asset_host: Option<&'static str>,
    locate: fn(&Url, &Html) -> Option<String>,
}

impl Recipe {
    /// Viewer URL for the rendered page at `page_url`, if the recipe finds one.
    #[must_use]
    pub fn locate_viewer(&self, page_url: &str, html: &str) -> Option<String> {
        let base = Url::parse(page_url).ok()?;
        let document = Html::parse_document(html);
        (self.locate)(&base, &document)
    }

    fn matches(&self, host: &str) -> bool {
        self.host_suffixes
            .iter()
            .any(|suffix| host_matches_suffix(host, suffix))
    }
}

static RECIPES: &[Recipe] = &[
    Recipe {
        name: "sciencedirect",
        host_suffixes: &["sciencedirect.com", "linkinghub.elsevier.com"],
        asset_host: Some("pdf.sciencedirectassets.com"),
        locate: locate_sciencedirect,
    },
    Recipe {
        name: "sage",
        host_suffixes: &["journals.sagepub.com"],
        asset_host: None,
        locate: locate_sage,
    },
    Recipe {
        name: "iop",
        host_suffixes: &["iopscience.iop.org"],
        asset_host: None,
        locate: locate_iop,
    },
    Recipe {
        name: "aip",
        host_suffixes: &["pubs.aip.org"],
        asset_host: None,
        locate: locate_aip,
    },
];

/// Recipe registered for the host of `url`.
#[must_use]
pub fn recipe_for(url: &str) -> Option<&'static Recipe> {
    let host = host_of(url)?;
    RECIPES.iter().find(|recipe| recipe.matches(&host))
}

static PII_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/pii/([^/?#]+)"));

static SD_PDFFT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="pdfft"]"#));

static SAGE_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"a[href*="/doi/pdf/"]"#,
        r#"a[href*="/doi/pdfdirect/"]"#,
        r#"a[href*="/doi/reader/"]"#,
    ]
    .into_iter()
    .map(compile_static_selector)
    .collect()
});

static IOP_PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/pdf"]"#));

static AIP_PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/article-pdf/"]"#));

/// Anchors tried in order by the generic flow.
static GENERIC_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "a.download-files-pdf",
        r#"a[data-testid="download-pdf"]"#,
        "a.ArticlePdf",
        r#"a[data-track-action="download pdf"]"#,
        "a.c-pdf-download__link",
        "a#downloadPdf",
        "a.pdf-download",
        "a.pdf-download-btn-link",
        r#"a[id*="pdfLink"]"#,
        "a.pdf-button",
        r#"a[href*="/article/"][href$="/pdf"]"#,
        "a.download-pdf",
        "a#pdfLink",
        r#"a[href*="/pdf/"]"#,
        r#"a[href*="pdf?"]"#,
        r#"a[href$=".pdf"]"#,
    ]
    .into_iter()
    .map(compile_static_selector)
    .collect()
});

fn first_href(document: &Html, selector: &Selector, base: &Url) -> Option<String> {
    document
        .select(selector)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| absolutize_url(href, base))
}

fn locate_sciencedirect(base: &Url, document: &Html) -> Option<String> {
    let pii = PII_RE.captures(base.as_str())?.get(1)?.as_str().to_string();
    first_href(document, &SD_PDFFT, base).or_else(|| {
        Some(format!(
            "https://www.sciencedirect.com/science/article/pii/{pii}/pdfft?isDTMRedir=true&download=true"
        ))
    })
}

fn locate_sage(base: &Url, document: &Html) -> Option<String> {
    if let Some(link) = SAGE_LINKS
        .iter()
        .find_map(|selector| first_href(document, selector, base))
    {
        return Some(link);
    }
    let current = base.as_str();
    if !current.contains("/doi/") || current.contains("/doi/pdf/") {
        return None;
    }
    let rewritten = current
        .replacen("/doi/full/", "/doi/pdf/", 1)
        .replacen("/doi/abs/", "/doi/pdf/", 1)
        .replacen("/doi/10.", "/doi/pdf/10.", 1);
    (rewritten != current).then_some(rewritten)
}

fn locate_iop(base: &Url, document: &Html) -> Option<String> {
    let path = base.path().trim_end_matches('/');
    if path.contains("/article/") && !path.ends_with("/pdf") {
        let mut viewer = base.clone();
        viewer.set_path(&format!("{path}/pdf"));
        viewer.set_query(None);
        return Some(viewer.to_string());
    }
    first_href(document, &IOP_PDF_LINK, base)
}

fn locate_aip(base: &Url, document: &Html) -> Option<String> {
    first_href(document, &AIP_PDF_LINK, base)
}

/// First same-site PDF anchor on a rendered page.
#[must_use]
pub fn generic_pdf_link(page_url: &str, html: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    GENERIC_LINKS.iter().find_map(|selector| {
        document
            .select(selector)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| absolutize_url(href, &base))
            .find(|link| same_site(link, page_url))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_lookup_by_host() {
        assert_eq!(
            recipe_for("https://www.sciencedirect.com/science/article/pii/S1").unwrap().name,
            "sciencedirect"
        );
        assert_eq!(
            recipe_for("https://linkinghub.elsevier.com/retrieve/pii/S1").unwrap().name,
            "sciencedirect"
        );
        assert_eq!(recipe_for("https://pubs.aip.org/aip/jap/article/1/2").unwrap().name, "aip");
        assert!(recipe_for("https://example.org/paper").is_none());
    }

    #[test]
    fn test_sciencedirect_builds_pdfft_without_anchor() {
        let recipe = recipe_for("https://www.sciencedirect.com/").unwrap();
        let viewer = recipe
            .locate_viewer(
                "https://www.sciencedirect.com/science/article/pii/S0360131520300000?via%3Dihub",
                "<html></html>",
            )
            .unwrap();
        assert_eq!(
            viewer,
            "https://www.sciencedirect.com/science/article/pii/S0360131520300000/pdfft?isDTMRedir=true&download=true"
        );
        assert_eq!(recipe.asset_host, Some("pdf.sciencedirectassets.com"));
    }

    #[test]
    fn test_sciencedirect_prefers_page_anchor() {
        let recipe = recipe_for("https://www.sciencedirect.com/").unwrap();
        let viewer = recipe
            .locate_viewer(
                "https://www.sciencedirect.com/science/article/pii/S1",
                r#"<a href="/science/article/pii/S1/pdfft?md5=abc&pid=1-s2.0-S1-main.pdf">View PDF</a>"#,
            )
            .unwrap();
        assert_eq!(
            viewer,
            "https://www.sciencedirect.com/science/article/pii/S1/pdfft?md5=abc&pid=1-s2.0-S1-main.pdf"
        );
    }

    #[test]
    fn test_sage_rewrites_full_to_pdf() {
        let recipe = recipe_for("https://journals.sagepub.com/").unwrap();
        assert_eq!(
            recipe
                .locate_viewer("https://journals.sagepub.com/doi/full/10.1177/0001", "<html></html>")
                .unwrap(),
            "https://journals.sagepub.com/doi/pdf/10.1177/0001"
        );
        assert_eq!(
            recipe
                .locate_viewer(
                    "https://journals.sagepub.com/doi/10.1177/0001",
                    r#"<a href="/doi/reader/10.1177/0001">Read</a>"#
                )
                .unwrap(),
            "https://journals.sagepub.com/doi/reader/10.1177/0001"
        );
    }

    #[test]
    fn test_iop_appends_pdf() {
        let recipe = recipe_for("https://iopscience.iop.org/").unwrap();
        assert_eq!(
            recipe
                .locate_viewer("https://iopscience.iop.org/article/10.1088/1742-6596/1/012001", "")
                .unwrap(),
            "https://iopscience.iop.org/article/10.1088/1742-6596/1/012001/pdf"
        );
    }

    #[test]
    fn test_aip_requires_article_pdf_anchor() {
        let recipe = recipe_for("https://pubs.aip.org/").unwrap();
        assert!(recipe.locate_viewer("https://pubs.aip.org/x", "<html></html>").is_none());
        assert_eq!(
            recipe
                .locate_viewer(
                    "https://pubs.aip.org/x",
                    r#"<a href="/aip/jap/article-pdf/1/2/3/paper.pdf">PDF</a>"#
                )
                .unwrap(),
            "https://pubs.aip.org/aip/jap/article-pdf/1/2/3/paper.pdf"
        );
    }

    #[test]
    fn test_generic_link_skips_other_sites() {
        let html = r#"
            <a class="pdf-download" href="https://ads.test/a.pdf">ad</a>
            <a href="/content/article/42.pdf">PDF</a>"#;
        assert_eq!(
            generic_pdf_link("https://www.journal.example.org/article/42", html).as_deref(),
            Some("https://www.journal.example.org/content/article/42.pdf")
        );
    }

    #[test]
    fn test_generic_link_none_without_anchor() {
        assert!(generic_pdf_link("https://journal.example.org/a", "<p>no links</p>").is_none());
    }
}
