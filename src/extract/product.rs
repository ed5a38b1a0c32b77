//! Product record extraction
//!
//! Runs only on pages classified as products. Name and price are mandatory;
//! a page missing either yields [`ExtractionIncomplete`] and nothing is
//! persisted for it.

use crate::config::StoreConfig;
use crate::extract::dom::{
    clean_text, content_or_text, element_text, json_ld_products, json_scalar, select_all,
    select_first, visible_text,
};
use crate::extract::price::{detect_currency, parse_price, MACHINE_LOCALE};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

static SKU_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bsku\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9_-]*)").expect("sku pattern")
});

const BREADCRUMB_SELECTOR: &str =
    "nav.breadcrumb li, ol.breadcrumb li, ul.breadcrumb li, .breadcrumbs li, nav[aria-label=\"breadcrumb\"] li";

/// A normalized product scraped from one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub source_url: String,
    pub name: String,

    /// Canonical decimal text, e.g. `"19.99"`
    pub raw_price: String,

    /// ISO 4217 code
    pub currency: String,

    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub extracted_at: DateTime<Utc>,
}

/// Mandatory fields could not be located
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incomplete product at {url}: missing {fields}", fields = .missing.join(", "))]
pub struct ExtractionIncomplete {
    pub url: String,
    pub missing: Vec<&'static str>,
}

/// Inputs to extraction that do not come from the page
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Store locale, used when the page carries no locale hint
    pub locale: String,

    /// Currency assumed when the page names none
    pub default_currency: String,

    /// Timestamp stamped on every record of this extraction
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionContext {
    pub fn new(store: &StoreConfig, extracted_at: DateTime<Utc>) -> Self {
        Self {
            locale: store.locale.clone(),
            default_currency: store.default_currency.clone(),
            extracted_at,
        }
    }
}

/// Extracts a [`ProductRecord`] from a product page
///
/// The result depends only on `html`, `url` and `ctx`, so re-running it on
/// the same body yields an identical record.
pub fn extract_product(
    html: &str,
    url: &Url,
    ctx: &ExtractionContext,
) -> Result<ProductRecord, ExtractionIncomplete> {
    let document = Html::parse_document(html);
    let json_ld = json_ld_products(&document);
    let json_ld = json_ld.first();
    let locale = page_locale(&document).unwrap_or_else(|| ctx.locale.clone());

    let name = extract_name(&document, json_ld);
    let price = extract_price(&document, json_ld, &locale);

    let (name, (raw_price, text_currency)) = match (name, price) {
        (Some(name), Some(price)) => (name, price),
        (name, price) => {
            let mut missing = Vec::new();
            if name.is_none() {
                missing.push("name");
            }
            if price.is_none() {
                missing.push("price");
            }
            return Err(ExtractionIncomplete {
                url: url.to_string(),
                missing,
            });
        }
    };

    let currency = text_currency
        .or_else(|| extract_declared_currency(&document, json_ld))
        .unwrap_or_else(|| ctx.default_currency.clone())
        .to_ascii_uppercase();

    Ok(ProductRecord {
        source_url: url.to_string(),
        name,
        raw_price,
        currency,
        description: extract_description(&document, json_ld),
        image_urls: extract_images(&document, json_ld, url),
        category: extract_category(&document, json_ld),
        sku: extract_sku(&document, json_ld),
        extracted_at: ctx.extracted_at,
    })
}

/// Locale hint from `<html lang>` or `og:locale`
pub fn page_locale(document: &Html) -> Option<String> {
    let from_lang = select_first(document, "html[lang]")
        .and_then(|html| html.value().attr("lang"))
        .and_then(clean_text);

    from_lang.or_else(|| {
        select_first(document, r#"meta[property="og:locale"]"#)
            .and_then(|meta| meta.value().attr("content"))
            .and_then(clean_text)
    })
}

fn json_field(json_ld: Option<&Value>, key: &str) -> Option<String> {
    json_ld.and_then(|product| product.get(key)).and_then(json_scalar)
}

fn extract_name(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    select_first(document, "h1")
        .and_then(|h1| element_text(&h1))
        .or_else(|| select_first(document, r#"[itemprop="name"]"#).and_then(|e| content_or_text(&e)))
        .or_else(|| json_field(json_ld, "name"))
        .or_else(|| {
            select_first(document, r#"meta[property="og:title"]"#)
                .and_then(|meta| meta.value().attr("content"))
                .and_then(clean_text)
        })
        .or_else(|| select_first(document, "h2").and_then(|h2| element_text(&h2)))
}

/// First parseable price with the currency its text carries
///
/// Machine-readable values are parsed with a fixed locale; display text
/// uses the page locale.
fn extract_price(
    document: &Html,
    json_ld: Option<&Value>,
    locale: &str,
) -> Option<(String, Option<String>)> {
    let mut candidates: Vec<(String, &str)> = Vec::new();

    for element in select_all(document, r#"[itemprop="price"]"#) {
        if let Some(content) = element.value().attr("content").and_then(clean_text) {
            candidates.push((content, MACHINE_LOCALE));
        } else if let Some(text) = element_text(&element) {
            candidates.push((text, locale));
        }
    }

    if let Some(amount) = select_first(document, r#"meta[property="product:price:amount"]"#)
        .and_then(|meta| meta.value().attr("content"))
        .and_then(clean_text)
    {
        candidates.push((amount, MACHINE_LOCALE));
    }

    if let Some(price) = json_ld_offer(json_ld).and_then(|offer| offer.get("price")).and_then(json_scalar) {
        candidates.push((price, MACHINE_LOCALE));
    }

    for element in select_all(document, ".price, .product-price") {
        if let Some(text) = element_text(&element) {
            candidates.push((text, locale));
        }
    }

    candidates
        .iter()
        .find_map(|(text, locale)| parse_price(text, locale))
        .map(|parsed| (parsed.amount, parsed.currency))
}

fn json_ld_offer(json_ld: Option<&Value>) -> Option<&Value> {
    match json_ld?.get("offers")? {
        Value::Array(offers) => offers.first(),
        offer => Some(offer),
    }
}

fn extract_declared_currency(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    select_first(document, r#"[itemprop="priceCurrency"]"#)
        .and_then(|e| content_or_text(&e))
        .or_else(|| {
            select_first(document, r#"meta[property="product:price:currency"]"#)
                .and_then(|meta| meta.value().attr("content"))
                .and_then(clean_text)
        })
        .or_else(|| {
            json_ld_offer(json_ld)
                .and_then(|offer| offer.get("priceCurrency"))
                .and_then(json_scalar)
        })
        .filter(|code| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .or_else(|| {
            select_first(document, ".price, .product-price")
                .and_then(|e| element_text(&e))
                .and_then(|text| detect_currency(&text))
        })
}

fn extract_description(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    select_first(document, r#"[itemprop="description"]"#)
        .and_then(|e| content_or_text(&e))
        .or_else(|| {
            select_first(document, ".product-description, .description").and_then(|e| element_text(&e))
        })
        .or_else(|| json_field(json_ld, "description"))
        .or_else(|| {
            select_first(
                document,
                r#"meta[name="description"], meta[property="og:description"]"#,
            )
            .and_then(|meta| meta.value().attr("content"))
            .and_then(clean_text)
        })
}

/// Image URLs resolved against the page, de-duplicated in first-seen order
fn extract_images(document: &Html, json_ld: Option<&Value>, base: &Url) -> Vec<String> {
    let mut raw: Vec<String> = Vec::new();

    for meta in select_all(document, r#"meta[property="og:image"]"#) {
        if let Some(content) = meta.value().attr("content") {
            raw.push(content.to_string());
        }
    }

    match json_ld.and_then(|product| product.get("image")) {
        Some(Value::String(src)) => raw.push(src.clone()),
        Some(Value::Array(items)) => raw.extend(items.iter().filter_map(|item| match item {
            Value::String(src) => Some(src.clone()),
            Value::Object(object) => object.get("url").and_then(json_scalar),
            _ => None,
        })),
        Some(Value::Object(object)) => raw.extend(object.get("url").and_then(json_scalar)),
        _ => {}
    }

    for img in select_all(document, "img") {
        for attr in ["src", "data-src"] {
            if let Some(src) = img.value().attr(attr) {
                raw.push(src.to_string());
            }
        }
    }

    let mut images: Vec<String> = Vec::new();
    for src in raw {
        let src = src.trim();
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }
        let Ok(resolved) = base.join(src) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let resolved = resolved.to_string();
        if !images.contains(&resolved) {
            images.push(resolved);
        }
    }

    images
}

fn extract_category(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    select_all(document, BREADCRUMB_SELECTOR)
        .last()
        .and_then(element_text)
        .or_else(|| json_field(json_ld, "category"))
}

fn extract_sku(document: &Html, json_ld: Option<&Value>) -> Option<String> {
    select_first(document, r#"[itemprop="sku"]"#)
        .and_then(|e| content_or_text(&e))
        .or_else(|| {
            select_first(document, "[data-sku]")
                .and_then(|e| e.value().attr("data-sku"))
                .and_then(clean_text)
        })
        .or_else(|| json_field(json_ld, "sku"))
        .or_else(|| {
            SKU_TEXT
                .captures(&visible_text(document))
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
        })
}
