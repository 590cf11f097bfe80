//! Fallback amount inference for noisy OCR output.
//!
//! These heuristics recover amounts the pattern scan misses: "ribu" magnitude
//! words, digits the recognizer spaced apart, zero blocks that lost their
//! currency marker, and O/D/S confusions near an "Rp" marker.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::ocr::util::{format_grouping, only_digits, truncate_window};

static RIBU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([1-9][0-9]{0,3})\s*[,.:;-]?\s*ribu\b").unwrap());
static RIBU_JOINED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([1-9][0-9]{0,3})ribu\b").unwrap());
static FUZZY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rp\s*([0-9]{1,3}(?:[.,][0-9]{3})+|[0-9]{5,9})").unwrap());
static FLEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"rp\s*([0-9\s.,]{5,15})").unwrap());
static ZERO_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rp\s*([1-9])([0\s.,]{3,8})").unwrap());
static STANDALONE_ZERO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)([1-9])([0\s.,idrl]{4,12})(?:\s|$)").unwrap());

const RIBU_MAX: i64 = 9999;

/// Replaces characters Tesseract commonly confuses with digits. The input is
/// already lowercased.
fn collapse_confusions(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'o' | 'd' => '0',
            's' => '5',
            _ => c,
        })
        .collect()
}

/// Finds patterns like "400 ribu" or "400ribu" meaning 400 * 1000.
/// Returns the scaled amount and the matched raw text.
pub fn extract_ribu(text: &str) -> Option<(i64, String)> {
    let low = text.to_lowercase();
    for re in [&*RIBU_RE, &*RIBU_JOINED_RE] {
        if let Some(caps) = re.captures(&low) {
            if let Ok(n) = caps[1].parse::<i64>() {
                if n > 0 && n <= RIBU_MAX {
                    return Some((n * 1000, caps[0].to_string()));
                }
            }
        }
    }
    None
}

/// Reconstructs an amount near an Rp marker even when OCR mangled digits
/// (O->0, D->0, S->5). Returns the amount and a normalized "Rp"-prefixed raw.
pub fn fuzzy_currency_amount(text: &str) -> Option<(i64, String)> {
    let low = text.to_lowercase();
    let idx = low.find("rp")?;
    let window = collapse_confusions(truncate_window(&low[idx..], 120));
    let caps = FUZZY_RE.captures(&window)?;
    let digits = only_digits(&caps[1]);
    if digits.len() < 3 || digits.len() > 9 {
        return None;
    }
    let amount = digits.parse::<i64>().ok()?;
    if amount <= 0 {
        return None;
    }
    Some((amount, format!("Rp{}", format_grouping(&digits))))
}

/// Tolerant scan for every Rp-marked number in the text, returning each as a
/// normalized "Rp"-prefixed grouped string.
pub fn scan_currency_numbers(text: &str) -> Vec<String> {
    let low = collapse_confusions(&text.to_lowercase());
    let mut out = Vec::new();
    for caps in FUZZY_RE.captures_iter(&low) {
        let digits = only_digits(&caps[1]);
        if digits.is_empty() || digits.len() > 9 {
            continue;
        }
        let Ok(amount) = digits.parse::<i64>() else {
            continue;
        };
        if amount <= 0 {
            continue;
        }
        let normalized = format!("Rp{}", format_grouping(&digits));
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Detects spaced digit sequences like "Rp6 0 0 . 0 0 0".
pub fn detect_flexible_currency(text: &str) -> Option<(i64, String)> {
    let low = text.to_lowercase();
    let rebuilt = low.split_whitespace().collect::<Vec<_>>().join(" ");
    let caps = FLEX_RE.captures(&rebuilt)?;
    let digits = only_digits(&caps[1]);
    if digits.len() < 5 || digits.len() > 9 {
        return None;
    }
    let amount = digits.parse::<i64>().ok()?;
    if amount <= 0 {
        return None;
    }
    Some((amount, format!("Rp{}", format_grouping(&digits))))
}

/// Infers a leading-digit-plus-zeros amount near an Rp marker, for OCR output
/// like "rp 6 0 0 0 0 0" where the separators are lost.
pub fn infer_zero_amount_from_pattern(text: &str) -> Option<(i64, String)> {
    let low = text.to_lowercase();
    let idx = low.find("rp")?;
    let window = truncate_window(&low[idx..], 80)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let caps = ZERO_BLOCK_RE.captures(&window)?;
    let zeros = caps[2].matches('0').count().min(6);
    if zeros < 3 {
        return None;
    }
    let digits = format!("{}{}", &caps[1], "0".repeat(zeros));
    let amount = digits.parse::<i64>().ok()?;
    if amount <= 0 {
        return None;
    }
    Some((amount, format!("Rp{}", format_grouping(&digits))))
}

/// Infers a zero-block amount when the Rp marker was lost entirely. Only a
/// clear one-nonzero-digit-then-zeros shape qualifies; the longest such match
/// wins. The raw carries a trailing '?' to flag the guess in logs.
pub fn infer_standalone_zero_amount(text: &str) -> Option<(i64, String)> {
    let norm = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut best: Option<(i64, String)> = None;
    for caps in STANDALONE_ZERO_RE.captures_iter(&norm) {
        let zeros = caps[2].matches('0').count();
        if zeros < 4 {
            continue;
        }
        let zeros = zeros.min(6);
        let digits = format!("{}{}", &caps[1], "0".repeat(zeros));
        let Ok(amount) = digits.parse::<i64>() else {
            continue;
        };
        if amount <= 0 {
            continue;
        }
        if best.as_ref().map(|(a, _)| amount > *a).unwrap_or(true) {
            best = Some((amount, format!("Rp{}?", format_grouping(&digits))));
        }
    }
    if let Some((amount, raw)) = &best {
        debug!("zero-block inference {} raw={}", amount, raw);
    }
    best
}
