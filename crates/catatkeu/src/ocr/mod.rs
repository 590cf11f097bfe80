//! Amount extraction engine.
//!
//! The pipeline: preprocess image variants, run the recognition passes,
//! scan the variant texts for candidates, score them, and fall back to
//! inference when the scan comes up empty. Tuned for Indonesian-Rupiah
//! receipt and mobile-payment screenshots; heuristic by design.

pub mod candidates;
pub mod inference;
pub mod parsing;
pub mod passes;
pub mod preprocess;
pub mod scoring;
pub mod tesseract;
pub mod util;

use std::path::Path;
use std::sync::LazyLock;

use image::GrayImage;
use log::{debug, info};
use regex::Regex;
use tempfile::TempPath;

use crate::error::OcrError;

pub use candidates::{find_all_matches, CandidateSet};
pub use scoring::best_amount_from_matches;

static DIRECT_CURRENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rp\s*([0-9]{1,3}(?:[.,][0-9]{3})+|[0-9]{3,9})").unwrap());

/// One extracted amount with a rough confidence proxy and the raw substring
/// it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub amount: i64,
    pub confidence: f64,
    pub raw: String,
}

/// The extraction capability the reconciler depends on. Implemented by
/// [`TesseractEngine`]; tests substitute scripted extractors.
pub trait AmountExtractor: Send + Sync {
    /// Candidate scan used on the hot path.
    fn find_candidates(&self, path: &Path) -> Result<CandidateSet, OcrError>;

    /// Full multi-pass extraction with inference fallbacks. Returns
    /// [`OcrError::NoAmount`] when nothing plausible is found.
    fn extract(&self, path: &Path) -> Result<Detection, OcrError>;
}

/// The production extractor. Holds only the recognition language; every pass
/// builds and drops its own recognizer client.
pub struct TesseractEngine {
    lang: String,
}

impl TesseractEngine {
    pub fn new(lang: &str) -> Self {
        let lang = if lang.is_empty() { "eng" } else { lang };
        Self {
            lang: lang.to_string(),
        }
    }
}

impl AmountExtractor for TesseractEngine {
    fn find_candidates(&self, path: &Path) -> Result<CandidateSet, OcrError> {
        candidates::find_all_matches(path, &self.lang)
    }

    fn extract(&self, path: &Path) -> Result<Detection, OcrError> {
        extract_amount_from_image(path, &self.lang)
    }
}

/// Writes a preprocessed variant to the system temp directory. The file is
/// removed when the returned path drops. Intermediates never land in the
/// watched directory; the `.ocr.` name filter downstream is the backstop.
pub(crate) fn save_temp_gray(img: &GrayImage, prefix: &str) -> Result<TempPath, OcrError> {
    let tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".png")
        .tempfile()?;
    let path = tmp.into_temp_path();
    img.save(&path)?;
    Ok(path)
}

/// A currency-marked number read directly off the start of the first `rp`
/// segment, catching lines the candidate patterns lost to formatting noise.
fn direct_currency_candidate(text: &str) -> Option<String> {
    let low = text.to_lowercase();
    let idx = low.find("rp")?;
    let caps = DIRECT_CURRENCY_RE.captures(&low[idx..])?;
    Some(format!("Rp{}", &caps[1]))
}

/// Confidence proxy: share of the base text the chosen raw covers, boosted
/// when the raw carries an explicit currency marker or a cents tail.
fn confidence_for(raw: &str, text: &str) -> f64 {
    let mut conf = raw.len() as f64 / (text.len() as f64 + 1.0);
    if conf > 1.0 {
        conf = 1.0;
    }
    let low = raw.to_lowercase();
    if (low.contains("rp") || low.contains("idr") || low.ends_with(",00") || low.ends_with(".00"))
        && conf < 0.85
    {
        conf = 0.85;
    }
    conf
}

/// When the text carries currency context but the chosen raw has neither
/// marker nor separators, an amount sitting just off a thousand boundary is
/// floored to it. Separators misread as stray digits are the usual cause.
/// The band is tight so legitimate grouped values survive.
fn apply_thousand_rescue(amount: i64, raw: &str, text: &str) -> i64 {
    let low_text = text.to_lowercase();
    let has_context = low_text.contains("rp") || low_text.contains("idr");
    let low_raw = raw.to_lowercase();
    let raw_has_hints = low_raw.contains("rp")
        || low_raw.contains("idr")
        || raw.contains('.')
        || raw.contains(',');
    if has_context && !raw_has_hints && amount >= 1000 {
        let rem = amount % 1000;
        if rem <= 20 || rem >= 980 {
            return amount - rem;
        }
    }
    amount
}

/// Full extraction: multi-pass recognition, candidate scan, inference
/// augmentation, scoring, fuzzy override, and the fallback chain.
pub fn extract_amount_from_image(path: &Path, lang: &str) -> Result<Detection, OcrError> {
    let _span = tracing::info_span!("ocr.extract").entered();

    let outputs = passes::run_all_passes(path, lang)?;
    let set = candidates::find_all_matches(path, lang)?;
    let mut matches = set.matches;

    let text = &outputs.text;
    let all_text = &outputs.aggregate;

    if let Some((_, raw)) = inference::infer_zero_amount_from_pattern(all_text) {
        matches.push(raw);
    }
    if let Some((_, raw)) = inference::detect_flexible_currency(all_text) {
        matches.push(raw);
    }
    if let Some(direct) = direct_currency_candidate(text) {
        if !matches.iter().any(|m| m.eq_ignore_ascii_case(&direct)) {
            matches.push(direct);
        }
    }
    for extra in inference::scan_currency_numbers(all_text) {
        if !matches.iter().any(|m| m.eq_ignore_ascii_case(&extra)) {
            matches.push(extra);
        }
    }

    if matches.is_empty() {
        if let Some((amount, raw)) = inference::extract_ribu(text) {
            return Ok(Detection {
                amount,
                confidence: 0.5,
                raw,
            });
        }
        if let Some((amount, raw)) = inference::infer_standalone_zero_amount(all_text) {
            info!("OCR fallback zero-block inferred {} raw={}", amount, raw);
            return Ok(Detection {
                amount,
                confidence: 0.35,
                raw,
            });
        }
        debug!(
            "OCR fallback zero-block inference failed; text snippet={:?}",
            util::snippet(all_text, 140)
        );
        return Err(OcrError::NoAmount);
    }

    if let Some((mut amount, mut raw)) = scoring::best_amount_from_matches(&matches) {
        let fuzzy_input = format!(
            "{} {} {}",
            outputs.text, outputs.text_digits, outputs.text_orig
        );
        let fuzzy = inference::fuzzy_currency_amount(&fuzzy_input);
        if let Some((fuzzy_amount, fuzzy_raw)) = &fuzzy {
            // Prefer the reconstruction when the chosen raw lacks currency
            // hints or the fuzzy value disagrees.
            let low = raw.to_lowercase();
            if !(low.contains("rp") || low.contains("idr")) || *fuzzy_amount != amount {
                amount = *fuzzy_amount;
                raw = fuzzy_raw.clone();
            }
        }
        debug!(
            "OCR debug: snippet={:?} candidates={:?} fuzzy={:?} chosen_raw={} chosen_amt={}",
            util::snippet(text, 160),
            matches,
            fuzzy,
            raw,
            amount
        );

        let confidence = confidence_for(&raw, text);
        let amount = apply_thousand_rescue(amount.abs(), &raw, text);
        return Ok(Detection {
            amount,
            confidence,
            raw,
        });
    }

    if let Some((amount, raw)) = inference::extract_ribu(text) {
        return Ok(Detection {
            amount,
            confidence: 0.4,
            raw,
        });
    }
    Err(OcrError::NoAmount)
}
