//! Page classification by weighted structural signals
//!
//! A page is scored once per [`PageKind`] by summing the weights of the
//! [`ScoringRule`]s whose [`Signal`] fires. The policy lives in
//! [`DEFAULT_RULES`] so it can be inspected and tested without a network.
//!
//! Prices and cart buttons inside product tiles describe the tiles, not the
//! page: a product page with a "related items" strip is still a product page.

use crate::extract::dom::{json_ld_products, select_all, visible_text_outside, within};
use crate::extract::price::count_price_tokens;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::fmt;

/// Minimum winning score used by [`classify`]
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Elements that hold a single price
const PRICE_SELECTOR: &str = r#"[itemprop="price"], .price, .product-price, meta[property="product:price:amount"]"#;

/// Repeated listing tiles
const CARD_SELECTOR: &str = ".product-card, .product-item, [data-product-id], li.product";

static CARDS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(CARD_SELECTOR).expect("card selector"));

/// Listing containers
const GRID_SELECTOR: &str = ".product-grid, .collection-grid, ul.products";

/// Elements whose presence alone means "add to cart"
const CART_SELECTOR: &str = r##"form[action*="cart"], #add-to-cart, [name="add-to-cart"], form[id*="add-to-cart"]"##;

/// Clickables whose label may say "add to cart"
const BUTTON_SELECTOR: &str = r#"button, input[type="submit"], input[type="button"], a.button, a.btn"#;

const CART_LABELS: &[&str] = &["add to cart", "add to bag", "add to basket", "buy now"];

/// Number of repeated cards or prices that marks a listing
const LISTING_MIN: usize = 3;

/// Semantic type of a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Product,
    Category,
    Other,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Product => "product",
            Self::Category => "category",
            Self::Other => "other",
        };
        write!(f, "{}", label)
    }
}

/// Structural signals a page can exhibit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// A price element or a price-like token outside product tiles
    Price,

    /// An add-to-cart affordance outside product tiles
    Cart,

    /// Exactly one schema.org `Product` (microdata or JSON-LD)
    ProductSchema,

    /// Several product-card-like tiles, or a product grid holding cards
    RepeatedCards,

    /// Several price tokens outside product tiles
    MultiplePrices,
}

impl Signal {
    fn fires(&self, features: &PageFeatures) -> bool {
        match self {
            Self::Price => features.price_elements > 0 || features.price_tokens > 0,
            Self::Cart => features.has_cart,
            Self::ProductSchema => {
                let microdata = features.schema_microdata;
                let json_ld = features.schema_json_ld;
                (microdata == 1 || json_ld == 1) && microdata <= 1 && json_ld <= 1
            }
            Self::RepeatedCards => {
                features.cards >= LISTING_MIN || (features.has_grid && features.cards > 0)
            }
            Self::MultiplePrices => {
                features.price_tokens >= LISTING_MIN || features.price_elements >= LISTING_MIN
            }
        }
    }
}

/// One entry of the scoring policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRule {
    pub signal: Signal,
    pub kind: PageKind,
    pub weight: f64,
}

/// Scoring policy, evaluated in order
pub const DEFAULT_RULES: &[ScoringRule] = &[
    ScoringRule {
        signal: Signal::Price,
        kind: PageKind::Product,
        weight: 0.35,
    },
    ScoringRule {
        signal: Signal::Cart,
        kind: PageKind::Product,
        weight: 0.35,
    },
    ScoringRule {
        signal: Signal::ProductSchema,
        kind: PageKind::Product,
        weight: 0.3,
    },
    ScoringRule {
        signal: Signal::RepeatedCards,
        kind: PageKind::Category,
        weight: 0.6,
    },
    ScoringRule {
        signal: Signal::MultiplePrices,
        kind: PageKind::Category,
        weight: 0.4,
    },
];

/// Classification result with per-kind scores
#[derive(Debug, Clone, PartialEq)]
pub struct PageClassification {
    pub kind: PageKind,

    /// Winning score, or `1 - max score` for [`PageKind::Other`]
    pub confidence: f64,

    pub product_score: f64,
    pub category_score: f64,
}

/// Counts gathered once per page and shared by all signals
///
/// Price and cart counts leave out anything inside a product tile.
#[derive(Debug, Default)]
struct PageFeatures {
    price_elements: usize,
    price_tokens: usize,
    has_cart: bool,
    schema_microdata: usize,
    schema_json_ld: usize,
    cards: usize,
    has_grid: bool,
}

impl PageFeatures {
    fn gather(document: &Html) -> Self {
        let has_cart = !outside_cards(document, CART_SELECTOR).is_empty()
            || outside_cards(document, BUTTON_SELECTOR).iter().any(|element| {
                let label = element
                    .value()
                    .attr("value")
                    .map(str::to_string)
                    .unwrap_or_else(|| element.text().collect::<String>())
                    .to_lowercase();
                let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
                CART_LABELS.iter().any(|cta| label.contains(cta))
            });

        let schema_microdata = select_all(document, "[itemtype]")
            .iter()
            .filter(|element| {
                element
                    .value()
                    .attr("itemtype")
                    .map(|t| t.trim_end_matches('/').to_lowercase().ends_with("schema.org/product"))
                    .unwrap_or(false)
            })
            .count();

        Self {
            price_elements: outside_cards(document, PRICE_SELECTOR).len(),
            price_tokens: count_price_tokens(&visible_text_outside(document, &CARDS)),
            has_cart,
            schema_microdata,
            schema_json_ld: json_ld_products(document).len(),
            cards: select_all(document, CARD_SELECTOR).len(),
            has_grid: !select_all(document, GRID_SELECTOR).is_empty(),
        }
    }
}

fn outside_cards<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    select_all(document, css)
        .into_iter()
        .filter(|element| !within(element, &CARDS))
        .collect()
}

/// Classifies a page with the default rules and threshold
///
/// Deterministic and free of side effects: the same body always yields the
/// same classification.
pub fn classify(html: &str) -> PageClassification {
    classify_with_threshold(html, DEFAULT_CONFIDENCE_THRESHOLD)
}

/// Classifies a page with the default rules and a custom threshold
pub fn classify_with_threshold(html: &str, threshold: f64) -> PageClassification {
    let document = Html::parse_document(html);
    classify_with_rules(&document, DEFAULT_RULES, threshold)
}

/// Scores `document` against `rules`
///
/// Scores are summed per kind and capped at 1.0. The higher kind wins when
/// it reaches `threshold`; a tie or a sub-threshold winner yields `Other`.
pub fn classify_with_rules(
    document: &Html,
    rules: &[ScoringRule],
    threshold: f64,
) -> PageClassification {
    let features = PageFeatures::gather(document);

    let mut product_score: f64 = 0.0;
    let mut category_score: f64 = 0.0;
    for rule in rules.iter().filter(|rule| rule.signal.fires(&features)) {
        match rule.kind {
            PageKind::Product => product_score += rule.weight,
            PageKind::Category => category_score += rule.weight,
            PageKind::Other => {}
        }
    }
    let product_score = product_score.min(1.0);
    let category_score = category_score.min(1.0);

    let (kind, confidence) = if product_score > category_score && product_score >= threshold {
        (PageKind::Product, product_score)
    } else if category_score > product_score && category_score >= threshold {
        (PageKind::Category, category_score)
    } else {
        (PageKind::Other, 1.0 - product_score.max(category_score))
    };

    PageClassification {
        kind,
        confidence,
        product_score,
        category_score,
    }
}
