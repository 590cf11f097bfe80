//! Amount updater: re-runs the full extraction over a directory and
//! overwrites matching record amounts when the engine is confident enough.
//! Meant for fixing up records created from early, weaker recognizer runs.

use std::path::Path;

use chrono::Utc;
use log::{info, warn};

use crate::error::Result;
use crate::ocr::parsing::has_cents_suffix;
use crate::ocr::AmountExtractor;
use crate::storage::Archiver;
use crate::store::RecordStore;
use crate::worker::list_image_files;

pub struct UpdaterOptions {
    /// Print proposed changes without writing or moving anything.
    pub dry_run: bool,
    /// Minimum engine confidence to accept a re-OCR result.
    pub min_conf: f64,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            min_conf: 0.12,
        }
    }
}

pub fn run(
    dir: &Path,
    store: &dyn RecordStore,
    extractor: &dyn AmountExtractor,
    archiver: &Archiver,
    options: &UpdaterOptions,
) -> Result<()> {
    for name in list_image_files(dir) {
        let full = dir.join(&name);
        let detection = match extractor.extract(&full) {
            Ok(d) => d,
            Err(e) => {
                warn!("ocr error {}: {}", name, e);
                continue;
            }
        };
        if detection.amount <= 0 || detection.confidence < options.min_conf {
            info!(
                "ocr skipped {} amt={} conf={:.2} (min={:.2})",
                name, detection.amount, detection.confidence, options.min_conf
            );
            continue;
        }

        // The engine's chosen raw may come from inference and still carry an
        // uncollapsed decimal tail; re-normalize only in that case.
        let mut amount = detection.amount;
        let raw = detection.raw.trim();
        if !raw.is_empty() && has_cents_suffix(raw) && amount % 100 == 0 {
            let normalized = amount / 100;
            info!(
                "normalizing OCR amount for {}: {} -> {} (found={})",
                name, amount, normalized, raw
            );
            amount = normalized;
        }

        let record = match store.record_by_name(&name) {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("no catatan found for {}", name);
                continue;
            }
            Err(e) => {
                warn!("record lookup {} failed: {}", name, e);
                continue;
            }
        };

        if options.dry_run {
            info!(
                "DRY: would update catatan id={} file={} old_amount={} new_amount={} conf={:.2}",
                record.id, name, record.amount, amount, detection.confidence
            );
            continue;
        }

        let now = Utc::now().to_rfc3339();
        match store.update_record_amount(record.id, amount, &now) {
            Ok(()) => {
                info!("updated catatan id={} file={} amount={}", record.id, name, amount);
                if let Err(e) = archiver.to_processed(&full, &name) {
                    warn!("failed to move processed file {}: {}", name, e);
                }
            }
            Err(e) => warn!("failed to update catatan {}: {}", name, e),
        }
    }
    Ok(())
}
