//! Page classification and product extraction
//!
//! Both stages are synchronous and side-effect free; they run on a fetched
//! body after the network work for a task is done.

mod classifier;
mod dom;
mod price;
mod product;

pub use classifier::{
    classify, classify_with_rules, classify_with_threshold, PageClassification, PageKind,
    ScoringRule, Signal, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RULES,
};
pub use price::{count_price_tokens, detect_currency, parse_price, uses_decimal_comma, ParsedPrice};
pub use product::{
    extract_product, page_locale, ExtractionContext, ExtractionIncomplete, ProductRecord,
};
