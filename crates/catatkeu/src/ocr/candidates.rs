//! Candidate extraction: pattern scans over recognized text.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use log::info;
use regex::Regex;

use crate::error::OcrError;
use crate::ocr::inference::{
    detect_flexible_currency, infer_zero_amount_from_pattern, scan_currency_numbers,
};
use crate::ocr::passes::CURRENCY_WHITELIST;
use crate::ocr::preprocess;
use crate::ocr::util::{normalize_ocr_text, only_digits, snippet};
use crate::ocr::{save_temp_gray, tesseract};

/// Ordered amount patterns: labeled totals, currency-prefixed numbers,
/// grouped numbers, long digit runs. All matches are collected, not just the
/// first.
static AMOUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:jumlah(?:\s+transfer)?|total(?:\s+bayar)?|total pembayaran|transfer)[:\s]*(?:Rp|IDR)?\s*([0-9\.,]+)",
        r"(?i)Rp\s*([0-9\.,]+)",
        r"(?i)IDR\s*([0-9\.,]+)",
        r"([0-9]{1,3}(?:[.,][0-9]{3})+)",
        r"([0-9]{5,})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// A number close to a currency marker that the main patterns missed:
/// grouped, or 3-7 plain digits.
static NEAR_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[:\-\s]*\s*([0-9]{1,3}(?:[.,][0-9]{3})+|[0-9]{3,7})").unwrap());

/// Raw candidates extracted from one image, plus the blank/logo signal.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub matches: Vec<String>,
    /// True when the recognized text is short and digit-free: likely a logo
    /// or non-receipt image rather than a receipt whose number was missed.
    pub likely_non_amount: bool,
}

/// Lightweight heuristics separating amounts from phone numbers, RRNs and
/// transaction ids. Conservative: currency hints or grouping separators are
/// trusted; long or zero-led digit-only strings are not.
pub fn is_plausible_amount(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    let low = s.to_lowercase();
    if low.contains("rp") || low.contains("idr") {
        return true;
    }
    if s.contains('.') || s.contains(',') {
        let digits = only_digits(s);
        return digits.len() >= 3 && !digits.starts_with('0');
    }
    let digits = only_digits(s);
    if digits.is_empty() || digits.starts_with('0') {
        return false;
    }
    if digits.len() > 7 || digits.len() < 2 {
        return false;
    }
    if digits.len() >= 5 && !(digits.ends_with("000") || digits.ends_with("500")) {
        // reject irregular mid-size ids like 250903
        return false;
    }
    true
}

/// True when the recognized text looks like a logo or graphic: non-empty,
/// shorter than 40 chars, and without a single digit.
pub fn likely_non_amount_text(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.len() < 40 && !trimmed.chars().any(|c| c.is_ascii_digit())
}

/// Runs the ordered patterns over the normalized base text and applies the
/// plausibility filter. When the enclosing match carried an Rp/IDR marker the
/// captured group lost, the marker is re-prepended so scoring sees the
/// context.
fn pattern_matches(text: &str, seen: &mut HashSet<String>) -> Vec<String> {
    let mut out = Vec::new();
    for re in AMOUNT_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let Some(group) = caps.get(1) else { continue };
            let mut candidate = group.as_str().trim().to_string();
            if candidate.is_empty() {
                continue;
            }
            let full_low = full.to_lowercase();
            let cand_low = candidate.to_lowercase();
            if (full_low.contains("rp") || full_low.contains("idr"))
                && !cand_low.contains("rp")
                && !cand_low.contains("idr")
            {
                candidate = format!("Rp{candidate}");
            }
            if !seen.insert(candidate.clone()) {
                continue;
            }
            if !is_plausible_amount(&candidate) {
                continue;
            }
            out.push(candidate);
        }
    }
    out
}

/// For every `rp`/`idr` occurrence, tries to read a nearby number the main
/// patterns missed and adds it with a normalized `Rp` prefix.
fn rescue_near_markers(text: &str, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    // Search and slice the same lowercased buffer; the captured number is
    // case-free so nothing is lost.
    let low = text.to_lowercase();
    for marker in ["rp", "idr"] {
        let mut search_from = 0;
        while let Some(found) = low[search_from..].find(marker) {
            let pos = search_from + found;
            let tail = &low[pos + marker.len()..];
            if let Some(caps) = NEAR_MARKER_RE.captures(tail) {
                let candidate = format!("Rp{}", &caps[1]);
                if is_plausible_amount(&candidate) && seen.insert(candidate.clone()) {
                    out.push(candidate);
                }
            }
            search_from = pos + marker.len();
        }
    }
}

/// Full text-level candidate scan: patterns, marker rescue, tolerant currency
/// re-scan, then the flexible/zero-block inferences, in that order.
/// `raw_text` is the pre-normalization recognizer output; spacing the
/// normalizer collapsed can still matter to the spaced-digit inferences.
pub fn candidate_matches(text: &str, raw_text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = pattern_matches(text, &mut seen);
    rescue_near_markers(text, &mut out, &mut seen);
    for extra in scan_currency_numbers(text) {
        if seen.insert(extra.clone()) {
            out.push(extra);
        }
    }
    let combined = format!("{raw_text} {text}");
    if let Some((_, raw)) = detect_flexible_currency(&combined) {
        if seen.insert(raw.clone()) {
            out.push(raw);
        }
    }
    if let Some((_, raw)) = infer_zero_amount_from_pattern(&combined) {
        if seen.insert(raw.clone()) {
            out.push(raw);
        }
    }
    out
}

/// Recognizes the image once with the currency whitelist and extracts every
/// amount-looking candidate. The base recognition pass failing is fatal here;
/// this is the signal the whole extraction rests on.
pub fn find_all_matches(path: &Path, lang: &str) -> Result<CandidateSet, OcrError> {
    let img = image::open(path).map_err(|e| OcrError::OpenImage {
        path: path.to_path_buf(),
        source: e,
    })?;
    let gray = preprocess::prepared_plain_gray(&img);
    let tmp = save_temp_gray(&gray, "ocr-")?;
    let raw_text = tesseract::recognize(&tmp, lang, CURRENCY_WHITELIST, None)?;
    let text = normalize_ocr_text(&raw_text);
    info!("OCR RAW {} snippet={:?}", path.display(), snippet(&text, 180));

    Ok(CandidateSet {
        likely_non_amount: likely_non_amount_text(&text),
        matches: candidate_matches(&text, &raw_text),
    })
}
