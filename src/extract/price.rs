//! Locale-aware price parsing
//!
//! Turns display prices such as `"$1,299.00"`, `"1.299,00 €"` or
//! `"CHF 1'299.–"` into canonical decimal text (`"1299"`) plus a currency
//! code when the text carries one.

use once_cell::sync::Lazy;
use regex::Regex;

/// Locale used for machine-readable values (microdata `content`, JSON-LD)
pub const MACHINE_LOCALE: &str = "en";

/// Languages that write the decimal separator as a comma
const DECIMAL_COMMA_LANGUAGES: &[&str] = &[
    "bg", "cs", "da", "de", "el", "es", "et", "fi", "fr", "hr", "hu", "id", "it", "lt", "lv",
    "nb", "nl", "nn", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sv", "tr", "uk", "vi",
];

/// Symbols checked longest first so `US$` wins over `$`
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("US$", "USD"),
    ("C$", "CAD"),
    ("A$", "AUD"),
    ("NZ$", "NZD"),
    ("R$", "BRL"),
    ("zł", "PLN"),
    ("Kč", "CZK"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
    ("₺", "TRY"),
    ("₽", "RUB"),
    ("$", "USD"),
];

const CURRENCY_CODES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HKD", "INR", "JPY", "KRW",
    "MXN", "NOK", "NZD", "PLN", "RUB", "SEK", "SGD", "TRY", "USD", "ZAR",
];

/// Digits with `.`/`,` separators; spaces and apostrophes only between
/// strict groups of three, so `"19.99 3 left"` stops at `19.99`
const NUMBER_PATTERN: &str = r"\d(?:\d|[.,]\d|['\u{a0}\u{202f} ]\d{3}\b)*";

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(NUMBER_PATTERN).expect("number pattern"));

static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z]{3}\b").expect("code pattern"));

/// A number directly before or after a currency symbol or code
static PRICE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    let marker = format!(
        r"(?:[$€£¥₹₩₺₽]|zł|Kč|\b(?:{}|(?i:usd|eur|gbp))\b)",
        CURRENCY_CODES.join("|")
    );
    Regex::new(&format!(
        r"{marker}\s?({number})|({number})\s?{marker}",
        marker = marker,
        number = NUMBER_PATTERN
    ))
    .expect("price token pattern")
});

/// A price found in text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrice {
    /// Canonical decimal: no grouping, `.` as decimal point, no trailing
    /// fraction zeros (`"19.99"`, `"1000"`, `"0.5"`)
    pub amount: String,

    /// ISO 4217 code when the text carries a symbol or code
    pub currency: Option<String>,
}

/// Parses the price in `text`
///
/// The first number next to a currency marker wins; without one, the first
/// number in the text is used.
///
/// `locale` (a BCP 47 tag such as `de-DE`) decides a lone separator followed
/// by exactly three digits: `"1.000"` is one thousand in `de` and one in `en`.
/// Any other shape is unambiguous.
pub fn parse_price(text: &str, locale: &str) -> Option<ParsedPrice> {
    let token = match PRICE_TOKEN.captures(text) {
        Some(captures) => captures.get(1).or_else(|| captures.get(2))?.as_str(),
        None => NUMBER.find(text)?.as_str(),
    };
    let amount = normalize_amount(token, uses_decimal_comma(locale))?;

    Some(ParsedPrice {
        amount,
        currency: detect_currency(text),
    })
}

/// Returns true if the locale's language writes decimals with a comma
pub fn uses_decimal_comma(locale: &str) -> bool {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    DECIMAL_COMMA_LANGUAGES.contains(&language.as_str())
}

/// Finds a currency symbol or ISO code in `text`
pub fn detect_currency(text: &str) -> Option<String> {
    for (symbol, code) in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            return Some(code.to_string());
        }
    }

    CODE.find_iter(text)
        .map(|m| m.as_str().to_ascii_uppercase())
        .find(|code| CURRENCY_CODES.contains(&code.as_str()))
}

/// Counts price-like tokens (a number next to a currency marker)
pub fn count_price_tokens(text: &str) -> usize {
    PRICE_TOKEN.find_iter(text).count()
}

fn normalize_amount(token: &str, decimal_comma: bool) -> Option<String> {
    // Spaces and apostrophes only ever group thousands
    let compact: String = token
        .chars()
        .filter(|c| !matches!(c, ' ' | '\'' | '\u{a0}' | '\u{202f}'))
        .collect();

    let dots = compact.matches('.').count();
    let commas = compact.matches(',').count();

    let (integer, fraction) = match (dots, commas) {
        (0, 0) => (compact.clone(), String::new()),
        (_, 0) => split_single_kind(&compact, '.', dots, !decimal_comma)?,
        (0, _) => split_single_kind(&compact, ',', commas, decimal_comma)?,
        _ => {
            // Both present: the last one is the decimal separator
            let last_dot = compact.rfind('.')?;
            let last_comma = compact.rfind(',')?;
            let (decimal, group) = if last_dot > last_comma {
                ('.', ',')
            } else {
                (',', '.')
            };
            if compact.matches(decimal).count() != 1 {
                return None;
            }
            let (integer, fraction) = compact.split_once(decimal)?;
            if fraction.contains(group) {
                return None;
            }
            (integer.replace(group, ""), fraction.to_string())
        }
    };

    canonical(&integer, &fraction)
}

/// Splits a number that uses a single separator kind
///
/// Repeated separators group thousands. A lone separator is a decimal point
/// unless exactly three digits follow it, in which case the locale decides.
fn split_single_kind(
    compact: &str,
    separator: char,
    count: usize,
    locale_decimal: bool,
) -> Option<(String, String)> {
    if count > 1 {
        return Some((compact.replace(separator, ""), String::new()));
    }

    let (integer, fraction) = compact.split_once(separator)?;
    if fraction.len() == 3 && !locale_decimal {
        Some((format!("{}{}", integer, fraction), String::new()))
    } else {
        Some((integer.to_string(), fraction.to_string()))
    }
}

fn canonical(integer: &str, fraction: &str) -> Option<String> {
    if !integer.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        Some(integer.to_string())
    } else {
        Some(format!("{}.{}", integer, fraction))
    }
}
