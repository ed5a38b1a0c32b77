//! Small helpers over `scraper` documents shared by the classifier and extractor

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Selects every element matching `css`; an invalid selector matches nothing
pub(crate) fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Returns the first element matching `css`
pub(crate) fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

/// Collapses whitespace; returns `None` for blank input
pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Text content of an element with whitespace collapsed
pub(crate) fn element_text(element: &ElementRef<'_>) -> Option<String> {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// The `content` attribute when present, otherwise the element's text
///
/// Microdata and meta tags carry machine values in `content`.
pub(crate) fn content_or_text(element: &ElementRef<'_>) -> Option<String> {
    element
        .value()
        .attr("content")
        .and_then(clean_text)
        .or_else(|| element_text(element))
}

/// True if `element` or one of its ancestors matches `selector`
pub(crate) fn within(element: &ElementRef<'_>, selector: &Selector) -> bool {
    selector.matches(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| selector.matches(&ancestor))
}

/// All text a visitor would see, skipping script, style and template bodies
pub(crate) fn visible_text(document: &Html) -> String {
    collect_visible_text(document, None)
}

/// Visible text outside every element matching `excluded`
pub(crate) fn visible_text_outside(document: &Html, excluded: &Selector) -> String {
    collect_visible_text(document, Some(excluded))
}

fn collect_visible_text(document: &Html, excluded: Option<&Selector>) -> String {
    let mut out = String::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        if let Some(excluded) = excluded {
            let inside = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| excluded.matches(&ancestor));
            if inside {
                continue;
            }
        }

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name().to_string()))
            .map(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);

        if !hidden {
            out.push_str(&**text);
            out.push(' ');
        }
    }

    out
}

/// Collects every JSON-LD object typed as a schema.org `Product`
///
/// Handles top-level arrays and `@graph` containers. Malformed blocks are
/// ignored.
pub(crate) fn json_ld_products(document: &Html) -> Vec<Value> {
    let mut products = Vec::new();

    for script in select_all(document, r#"script[type="application/ld+json"]"#) {
        let raw = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
            collect_products(&value, &mut products);
        }
    }

    products
}

fn collect_products(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        Value::Object(map) => {
            if map.get("@type").map(is_product_type).unwrap_or(false) {
                out.push(value.clone());
            }
            if let Some(graph) = map.get("@graph") {
                collect_products(graph, out);
            }
        }
        _ => {}
    }
}

fn is_product_type(value: &Value) -> bool {
    match value {
        Value::String(name) => {
            let name = name.rsplit(['/', ':']).next().unwrap_or(name);
            name.eq_ignore_ascii_case("product")
        }
        Value::Array(names) => names.iter().any(is_product_type),
        _ => false,
    }
}

/// Renders a JSON-LD scalar as text (prices are often numbers)
pub(crate) fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
