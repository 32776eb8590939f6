//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Euro amount followed by the currency sign, e.g. `650 €`, `1.150 €` or
/// `650,00 €`. The amount must not be preceded by a digit, dot or comma.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\d.,])(\d{1,3}(?:\.\d{3})+|\d{2,5})(?:,\d{1,2})?\s*€")
        .expect("price regex is valid")
});

/// First run of digits, for structured price values like `"650.00"`.
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digits regex is valid"));

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse whitespace (including non-breaking spaces) to single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the first euro price in free text.
pub fn parse_price(text: &str) -> Option<u32> {
    let caps = PRICE_RE.captures(text)?;
    caps.get(1)?.as_str().replace('.', "").parse().ok()
}

/// Parse a structured price value, taking the leading integer part.
pub fn parse_price_value(text: &str) -> Option<u32> {
    DIGITS_RE.find(text)?.as_str().parse().ok()
}
