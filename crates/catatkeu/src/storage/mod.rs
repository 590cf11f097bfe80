//! Archival moves out of the watched directory.
//!
//! Successful files land in `public/processed`, failures in `public/failed`.
//! Processed archives are kept under a byte budget: oversized images are
//! re-encoded at a scale estimated from sqrt(budget/size), since encoded
//! size roughly tracks pixel area.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use log::warn;

use crate::error::StorageError;

/// Byte budget for processed archives (matches the upload ceiling).
pub const MAX_ARCHIVE_BYTES: u64 = 1_000_000;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on the
/// same filesystem) and falls back to copy + delete for cross-device moves.
/// Overwrites are permitted: last writer wins on duplicate names.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Downscale factor for an oversized file, clamped to [0.10, 0.95].
pub(crate) fn scale_factor(size: u64) -> f64 {
    let mut scale = (MAX_ARCHIVE_BYTES as f64 / size as f64).sqrt();
    if scale > 0.95 {
        scale = 0.95;
    }
    if scale < 0.1 {
        scale = 0.1;
    }
    scale
}

fn resize_by(img: &DynamicImage, scale: f64) -> DynamicImage {
    let width = ((img.width() as f64 * scale).round() as u32).max(1);
    let height = ((img.height() as f64 * scale).round() as u32).max(1);
    img.resize_exact(width, height, FilterType::Lanczos3)
}

pub struct Archiver {
    processed_dir: PathBuf,
    failed_dir: PathBuf,
}

impl Archiver {
    /// Archive directories relative to the configured root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            processed_dir: root.join("public").join("processed"),
            failed_dir: root.join("public").join("failed"),
        }
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    fn ensure_directory(path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Moves a successfully reconciled file into the processed archive,
    /// re-encoding it when it exceeds the byte budget. Decode or save
    /// failures fall back to a raw move.
    pub fn to_processed(&self, src: &Path, name: &str) -> Result<PathBuf, StorageError> {
        Self::ensure_directory(&self.processed_dir)?;
        let dst = self.processed_dir.join(name);

        let metadata = std::fs::metadata(src).map_err(|e| StorageError::Metadata {
            path: src.to_path_buf(),
            source: e,
        })?;
        if metadata.len() <= MAX_ARCHIVE_BYTES {
            move_file(src, &dst)?;
            return Ok(dst);
        }

        let img = match image::open(src) {
            Ok(img) => img,
            Err(e) => {
                warn!("cannot decode oversized {}: {}; moving as-is", name, e);
                move_file(src, &dst)?;
                return Ok(dst);
            }
        };

        let resized = resize_by(&img, scale_factor(metadata.len()));
        if let Err(e) = resized.save(&dst) {
            warn!("re-encode of {} failed: {}; moving as-is", name, e);
            move_file(src, &dst)?;
            return Ok(dst);
        }
        let _ = std::fs::remove_file(src);

        // One extra uniform pass when the first estimate was not enough.
        if let Ok(meta) = std::fs::metadata(&dst) {
            if meta.len() > MAX_ARCHIVE_BYTES {
                if let Ok(again) = image::open(&dst) {
                    let _ = resize_by(&again, 0.8).save(&dst);
                }
            }
        }
        Ok(dst)
    }

    /// Moves a failed file into the failed archive, preserving the name.
    /// No re-encoding.
    pub fn to_failed(&self, src: &Path, name: &str) -> Result<PathBuf, StorageError> {
        Self::ensure_directory(&self.failed_dir)?;
        let dst = self.failed_dir.join(name);
        move_file(src, &dst)?;
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, Archiver) {
        let temp = TempDir::new().unwrap();
        let keu = temp.path().join("public").join("keu");
        std::fs::create_dir_all(&keu).unwrap();
        let archiver = Archiver::new(temp.path());
        (temp, keu, archiver)
    }

    /// Incompressible noise so the PNG weighs roughly width*height*3 bytes.
    fn noise_png(path: &Path, side: u32) {
        let mut img = RgbImage::new(side, side);
        let mut state = 0x12345678u32;
        for pixel in img.pixels_mut() {
            // xorshift, deterministic
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *pixel = Rgb([(state >> 16) as u8, (state >> 8) as u8, state as u8]);
        }
        img.save(path).unwrap();
    }

    #[test]
    fn test_small_file_moved_verbatim() {
        let (_temp, keu, archiver) = setup();
        let src = keu.join("slip.png");
        std::fs::write(&src, b"tiny").unwrap();

        let dst = archiver.to_processed(&src, "slip.png").unwrap();
        assert!(!src.exists());
        assert!(dst.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"tiny");
        assert!(dst.ends_with("public/processed/slip.png"));
    }

    #[test]
    fn test_failed_file_moved_without_reencode() {
        let (_temp, keu, archiver) = setup();
        let src = keu.join("blank.png");
        std::fs::write(&src, b"not really an image").unwrap();

        let dst = archiver.to_failed(&src, "blank.png").unwrap();
        assert!(!src.exists());
        assert!(dst.ends_with("public/failed/blank.png"));
        assert_eq!(std::fs::read(&dst).unwrap(), b"not really an image");
    }

    #[test]
    fn test_oversized_image_is_reencoded_under_budget() {
        let (_temp, keu, archiver) = setup();
        let src = keu.join("big.png");
        noise_png(&src, 1200); // ~4.3 MB of incompressible pixels
        assert!(std::fs::metadata(&src).unwrap().len() > MAX_ARCHIVE_BYTES);

        let dst = archiver.to_processed(&src, "big.png").unwrap();
        assert!(!src.exists());
        assert!(dst.exists());
        assert!(
            std::fs::metadata(&dst).unwrap().len() <= MAX_ARCHIVE_BYTES,
            "archived copy still over budget"
        );
    }

    #[test]
    fn test_oversized_undecodable_file_moved_raw() {
        let (_temp, keu, archiver) = setup();
        let src = keu.join("blob.bin");
        let blob = vec![0xABu8; (MAX_ARCHIVE_BYTES + 1) as usize];
        std::fs::write(&src, &blob).unwrap();

        let dst = archiver.to_processed(&src, "blob.bin").unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), blob.len() as u64);
    }

    #[test]
    fn test_overwrite_is_last_writer_wins() {
        let (_temp, keu, archiver) = setup();
        let first = keu.join("dup.png");
        std::fs::write(&first, b"first").unwrap();
        archiver.to_processed(&first, "dup.png").unwrap();

        let second = keu.join("dup.png");
        std::fs::write(&second, b"second").unwrap();
        let dst = archiver.to_processed(&second, "dup.png").unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"second");
    }

    #[test]
    fn test_scale_factor_clamps() {
        assert_eq!(scale_factor(100), 0.95);
        assert_eq!(scale_factor(MAX_ARCHIVE_BYTES), 0.95);
        assert!((scale_factor(4 * MAX_ARCHIVE_BYTES) - 0.5).abs() < 1e-9);
        assert_eq!(scale_factor(1_000 * MAX_ARCHIVE_BYTES), 0.1);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let (_temp, keu, archiver) = setup();
        let err = archiver
            .to_processed(&keu.join("missing.png"), "missing.png")
            .unwrap_err();
        assert!(matches!(err, StorageError::Metadata { .. }));
    }
}
