//! Raw candidate string to integer amount conversion.

use std::sync::LazyLock;

use regex::Regex;

use crate::ocr::util::only_digits;

static CENTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,]\d{2}$").unwrap());

/// True when the string ends in a two-digit decimal tail like ",00" or ".95".
pub fn has_cents_suffix(s: &str) -> bool {
    CENTS_RE.is_match(s)
}

/// Normalizes a matched substring into an integer amount in whole currency
/// units. A trailing decimal part of exactly two digits is stripped
/// (e.g. "10.000,00" -> 10000); the later of the last '.'/',' is taken as the
/// decimal separator. Grouping separators are otherwise dropped.
pub fn parse_amount(found: &str) -> Option<i64> {
    let trimmed = found.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits = if CENTS_RE.is_match(trimmed) {
        let last_dot = trimmed.rfind('.');
        let last_comma = trimmed.rfind(',');
        match (last_dot, last_comma) {
            (Some(dot), Some(comma)) if comma > dot => only_digits(&trimmed[..comma]),
            (Some(dot), _) => only_digits(&trimmed[..dot]),
            (None, Some(comma)) => only_digits(&trimmed[..comma]),
            (None, None) => only_digits(trimmed),
        }
    } else {
        only_digits(trimmed)
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(i64::abs)
}
