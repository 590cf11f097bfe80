//! Multi-pass recognition over preprocessed image variants.

use std::path::Path;

use log::info;

use crate::error::OcrError;
use crate::ocr::preprocess;
use crate::ocr::save_temp_gray;
use crate::ocr::tesseract::{
    self, PSM_SINGLE_BLOCK, PSM_SINGLE_LINE, PSM_SPARSE_TEXT, PSM_SPARSE_TEXT_OSD,
};
use crate::ocr::util::normalize_ocr_text;

/// Whitelist for currency-bearing lines: digits, Rp/IDR letters, punctuation.
pub const CURRENCY_WHITELIST: &str = "0123456789RpIDRidri.,:()/- ";
/// Digits-and-separators only.
pub const DIGITS_WHITELIST: &str = "0123456789., ";
/// Broad whitelist for untouched-image passes.
pub const BROAD_WHITELIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyzRpIDRidri.,:()/- ";

const COLUMN_SLICES: u32 = 4;

/// Outputs of one multi-pass run. `aggregate` concatenates every variant and
/// feeds the inference engine.
#[derive(Debug, Clone, Default)]
pub struct PassOutputs {
    pub text: String,
    pub text_digits: String,
    pub text_orig: String,
    pub text_top: String,
    pub text_top_digits: String,
    pub aggregate: String,
}

/// One best-effort pass: recognition errors yield an empty variant.
fn pass(path: &Path, lang: &str, whitelist: &str, psm: Option<&str>) -> String {
    tesseract::recognize(path, lang, whitelist, psm)
        .map(|t| normalize_ocr_text(&t))
        .unwrap_or_default()
}

/// Executes the full multi-pass strategy and returns the variant texts.
///
/// Only failing to open the source image or to stage the base variant is
/// fatal; every individual recognition pass is best-effort.
pub fn run_all_passes(path: &Path, lang: &str) -> Result<PassOutputs, OcrError> {
    let img = image::open(path).map_err(|e| OcrError::OpenImage {
        path: path.to_path_buf(),
        source: e,
    })?;
    let base = preprocess::prepared_base(&img);
    let advanced = preprocess::dilate(&preprocess::adaptive_threshold(&base, 15, 7), 1);

    let base_tmp = save_temp_gray(&base, "ocr-base-")?;

    let text = pass(&base_tmp, lang, CURRENCY_WHITELIST, None);
    let text_digits = pass(&base_tmp, lang, DIGITS_WHITELIST, None);
    let mut text_orig = pass(path, lang, BROAD_WHITELIST, None);

    let (mut text_top, mut text_top_digits) = (String::new(), String::new());
    if let Some(crop) = preprocess::top_half(&base) {
        if let Ok(top_tmp) = save_temp_gray(&crop, "ocr-top-") {
            text_top = pass(&top_tmp, lang, CURRENCY_WHITELIST, None);
            text_top_digits = pass(&top_tmp, lang, DIGITS_WHITELIST, None);
        }
    }

    // Light-on-dark screenshots: the inverted output rides along with the
    // original-image variant.
    if let Ok(inv_tmp) = save_temp_gray(&preprocess::invert(&base), "ocr-inv-") {
        let inverted = pass(&inv_tmp, lang, CURRENCY_WHITELIST, None);
        if !inverted.is_empty() {
            text_orig = normalize_ocr_text(&format!("{text_orig} {inverted}"));
        }
    }

    let mut variants = vec![
        text.clone(),
        text_digits.clone(),
        text_orig.clone(),
        text_top.clone(),
        text_top_digits.clone(),
    ];

    if let Ok(adv_tmp) = save_temp_gray(&advanced, "ocr-adv-") {
        variants.push(pass(&adv_tmp, lang, CURRENCY_WHITELIST, None));
    }

    for mode in [
        PSM_SINGLE_BLOCK,
        PSM_SINGLE_LINE,
        PSM_SPARSE_TEXT,
        PSM_SPARSE_TEXT_OSD,
    ] {
        variants.push(pass(path, lang, BROAD_WHITELIST, Some(mode)));
    }

    for slice in preprocess::column_slices(&base, COLUMN_SLICES) {
        if let Ok(slice_tmp) = save_temp_gray(&slice, "ocr-slice-") {
            variants.push(pass(&slice_tmp, lang, CURRENCY_WHITELIST, None));
            variants.push(pass(&slice_tmp, lang, DIGITS_WHITELIST, None));
        }
    }

    let aggregate = variants.join(" ");
    info!(
        "OCR passes summary base=5 total_variants={} length={}",
        variants.len(),
        aggregate.len()
    );

    Ok(PassOutputs {
        text,
        text_digits,
        text_orig,
        text_top,
        text_top_digits,
        aggregate,
    })
}
