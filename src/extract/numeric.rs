//! Locale-tolerant numeric parsing
//!
//! Listing pages mix English and French formatting (`$1,299,000`,
//! `1 299 000 $`, `1,5 étages`). Every parser here returns `None` for text it
//! cannot read instead of failing.

use regex::Regex;
use std::sync::LazyLock;

/// An integer with optional thousands grouping and an optional cents suffix
static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:[,.\u{a0}\u{202f} ']\d{3})+|\d+)(?:[.,]\d{1,2})?").unwrap()
});

/// A grouped integer (`1,200`, `1 200`) or a plain digit run
static GROUPED_INTEGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:[,\u{a0}\u{202f} ]\d{3})+\b|\d+").unwrap()
});

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

/// Parses a price, ignoring currency symbols and grouping separators
///
/// A trailing one- or two-digit fraction (`,00`, `.50`) is dropped. Zero is
/// treated as unparseable, since no listing is free.
///
/// # Example
///
/// ```
/// use listing_tracker::extract::parse_price;
///
/// assert_eq!(parse_price("$1,299,000"), Some(1_299_000));
/// assert_eq!(parse_price("1 299 000 $"), Some(1_299_000));
/// assert_eq!(parse_price("Price on request"), None);
/// ```
pub fn parse_price(text: &str) -> Option<i64> {
    let caps = PRICE.captures(text)?;
    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    let value: i64 = digits.parse().ok()?;
    (value > 0).then_some(value)
}

/// Parses the first integer in the text, honoring thousands grouping
pub fn parse_integer(text: &str) -> Option<i64> {
    let m = GROUPED_INTEGER.find(text)?;
    let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Parses the first decimal number, accepting a comma as decimal separator
pub fn parse_decimal(text: &str) -> Option<f64> {
    let m = DECIMAL.find(text)?;
    m.as_str().replace(',', ".").parse().ok()
}

/// Parses an area and converts it to square feet
///
/// Values labelled in square metres (`m²`, `m2`, `sqm`) are converted; any
/// other value is assumed to already be in square feet.
pub fn parse_area_sqft(text: &str) -> Option<i64> {
    let value = parse_integer(text)?;
    let lower = text.to_lowercase();
    let metric = lower.contains("m²")
        || lower.contains("m2")
        || lower.contains("sqm")
        || lower.contains("mètres");

    if metric {
        Some((value as f64 * 10.7639).round() as i64)
    } else {
        Some(value)
    }
}
