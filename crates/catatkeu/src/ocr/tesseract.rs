//! Thin wrapper around the Tesseract bindings.
//!
//! Two implementations: the real recognizer when the `ocr` feature is
//! enabled, and a stub that returns an error when it is not. This avoids
//! linking leptonica/tesseract on machines where they are not installed;
//! everything above this layer (patterns, scoring, inference, reconciliation)
//! works and tests without the feature.
//!
//! Each call constructs and drops its own client. The underlying library is
//! not safe to share across workers.

/// Page segmentation modes passed straight to Tesseract.
pub const PSM_SINGLE_BLOCK: &str = "6";
pub const PSM_SINGLE_LINE: &str = "7";
pub const PSM_SPARSE_TEXT: &str = "11";
pub const PSM_SPARSE_TEXT_OSD: &str = "12";

#[cfg(feature = "ocr")]
mod real {
    use std::path::Path;

    use leptess::{LepTess, Variable};

    use crate::error::OcrError;

    pub fn recognize(
        path: &Path,
        lang: &str,
        whitelist: &str,
        psm: Option<&str>,
    ) -> Result<String, OcrError> {
        let mut client = LepTess::new(None, lang)
            .map_err(|e| OcrError::Recognizer(format!("init ({lang}): {e}")))?;
        client
            .set_variable(Variable::TesseditCharWhitelist, whitelist)
            .map_err(|e| OcrError::Recognizer(format!("whitelist: {e}")))?;
        if let Some(mode) = psm {
            client
                .set_variable(Variable::TesseditPagesegMode, mode)
                .map_err(|e| OcrError::Recognizer(format!("psm {mode}: {e}")))?;
        }
        client
            .set_image(path)
            .map_err(|e| OcrError::Recognizer(format!("set image {}: {e}", path.display())))?;
        client
            .get_utf8_text()
            .map_err(|e| OcrError::Recognizer(format!("recognize: {e}")))
    }
}

#[cfg(not(feature = "ocr"))]
mod stub {
    use std::path::Path;

    use crate::error::OcrError;

    pub fn recognize(
        _path: &Path,
        _lang: &str,
        _whitelist: &str,
        _psm: Option<&str>,
    ) -> Result<String, OcrError> {
        Err(OcrError::Recognizer(
            "OCR feature not enabled; build with --features ocr and install Tesseract/Leptonica"
                .to_string(),
        ))
    }
}

#[cfg(feature = "ocr")]
pub use real::recognize;
#[cfg(not(feature = "ocr"))]
pub use stub::recognize;
