//! HTML link extraction
//!
//! Turns a fetched page into the ordered set of normalized URLs it links to.

use crate::url::resolve_link;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts the links a page points to, normalized and de-duplicated
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - same-page anchors and non-HTTP(S) targets
///
/// Relative references resolve against `<base href>` when the page declares
/// one, otherwise against `base_url`. Order is first-seen order; the result
/// is finite and consumed once. Domain filtering is left to the caller.
///
/// # Example
///
/// ```
/// use catalog_mirror::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/b">B</a><a href="/a#top">A</a><a href="/b/">B again</a>"#;
/// let base = Url::parse("https://shop.example/").unwrap();
/// let links: Vec<String> = extract_links(html, &base).map(|u| u.to_string()).collect();
/// assert_eq!(links, vec!["https://shop.example/b", "https://shop.example/a"]);
/// ```
pub fn extract_links(html: &str, base_url: &Url) -> impl Iterator<Item = Url> {
    let document = Html::parse_document(html);
    let base = document_base(&document, base_url);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs(&document) {
        if let Some(url) = resolve_link(href, &base) {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    }

    links.into_iter()
}

/// Raw href values in document order
fn hrefs(document: &Html) -> Vec<&str> {
    let mut hrefs = Vec::new();

    if let Ok(selector) = Selector::parse("a[href], link[rel][href]") {
        for element in document.select(&selector) {
            let value = element.value();
            let keep = match value.name() {
                // Skip if it has the download attribute
                "a" => value.attr("download").is_none(),
                _ => value
                    .attr("rel")
                    .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
                    .unwrap_or(false),
            };

            if keep {
                if let Some(href) = value.attr("href") {
                    hrefs.push(href);
                }
            }
        }
    }

    hrefs
}

/// Resolution base: `<base href>` resolved against the page URL
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .filter(|base| base.scheme() == "http" || base.scheme() == "https")
        .unwrap_or_else(|| page_url.clone())
}
