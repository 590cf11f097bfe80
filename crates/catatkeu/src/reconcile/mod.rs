//! The reconciler: turns one observed file name into persisted state plus an
//! archival move.
//!
//! Outcomes never propagate to the dispatcher. Every path either records its
//! result on the upload row, archives the file, or leaves the file in place
//! so the next scan retries it.

pub mod cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};

use crate::db::{NewCatatan, NewUpload, Profile, Upload};
use crate::ocr::{best_amount_from_matches, AmountExtractor};
use crate::storage::Archiver;
use crate::store::RecordStore;
use crate::worker::FileProcessor;

pub use cache::PreloadCache;

/// User-visible failure reasons. Kept verbatim: the UI matches on them.
pub const REASON_UNRECOGNIZED: &str = "File tidak dikenali, gunakan file lain!";
pub const REASON_NO_AMOUNT: &str = "Nominal tidak ditemukan, gunakan file lain";
pub const REASON_AMBIGUOUS: &str = "Gagal! Gunakan file lain";

/// Reserved system principal when no `admin` user row exists yet.
pub const RESERVED_ADMIN_USER_ID: i64 = 1;

/// How long the reconciler waits for an API-side writer to finish creating
/// the upload row before creating its own.
const UPLOAD_LOOKUP_ATTEMPTS: usize = 3;
const UPLOAD_LOOKUP_BACKOFF: Duration = Duration::from_millis(150);

/// Extension-to-MIME map for the supported upload types.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Whether this file name is worth running OCR on at all.
pub fn is_supported_extension(name: &str) -> bool {
    if name.contains(".ocr.") {
        return false;
    }
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    matches!(
        ext.to_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "gif" | "webp"
    )
}

/// Content sniffing fallback, used only when the extension map cannot
/// resolve a type: reads the first 512 bytes and matches magic numbers.
pub fn sniff_content_type(path: &Path) -> Option<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; 512];
    let n = file.read(&mut buf).ok()?;
    let head = &buf[..n];
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png".to_string())
    } else if head.starts_with(b"GIF8") {
        Some("image/gif".to_string())
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        Some("image/webp".to_string())
    } else {
        None
    }
}

/// Context for one dispatcher session. Workers hold an `Arc` and call
/// [`FileProcessor::process_file`] per observed name.
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn AmountExtractor>,
    archiver: Archiver,
    cache: PreloadCache,
    profile: Profile,
    admin_user_id: i64,
    watch_dir: PathBuf,
    verbose: bool,
}

impl FileProcessor for Reconciler {
    fn process_file(&self, name: &str) {
        self.reconcile(name);
    }
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RecordStore>,
        extractor: Arc<dyn AmountExtractor>,
        archiver: Archiver,
        cache: PreloadCache,
        profile: Profile,
        admin_user_id: i64,
        watch_dir: PathBuf,
        verbose: bool,
    ) -> Self {
        Self {
            store,
            extractor,
            archiver,
            cache,
            profile,
            admin_user_id,
            watch_dir,
            verbose,
        }
    }

    /// Canonical slash-separated store path for a file in the watched
    /// directory, e.g. "public/keu/slip.jpg".
    fn store_path_for(&self, name: &str) -> String {
        let base = self
            .watch_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("public/{base}/{name}")
    }

    fn resolve_content_type(&self, name: &str, path: &Path) -> Option<String> {
        mime_from_extension(name)
            .map(str::to_string)
            .or_else(|| sniff_content_type(path))
    }

    fn mark_failed(&self, upload: &mut Upload, reason: &str) {
        upload.failed = true;
        upload.failed_reason = reason.to_string();
        upload.keuangan_id = None;
        if let Err(e) = self.store.update_upload(upload) {
            warn!("persist failed state for {}: {}", upload.file_name, e);
        }
        self.cache.put_upload(upload.clone());
    }

    fn archive_processed(&self, path: &Path, name: &str) {
        match self.archiver.to_processed(path, name) {
            Ok(_) => {
                if self.verbose {
                    info!("moved processed {} to {}", name, self.archiver.processed_dir().display());
                }
            }
            Err(e) => warn!("failed to move processed file {}: {}", name, e),
        }
    }

    fn archive_failed(&self, path: &Path, name: &str) {
        if let Err(e) = self.archiver.to_failed(path, name) {
            warn!("failed to move failed file {}: {}", name, e);
        }
    }

    /// Looks the upload up in the cache, then polls the store a few times so
    /// an API-side writer racing this worker can win the insert.
    fn find_existing_upload(&self, name: &str, store_path: &str) -> Option<Upload> {
        if let Some(upload) = self.cache.upload(name) {
            return Some(upload);
        }
        for attempt in 0..UPLOAD_LOOKUP_ATTEMPTS {
            match self.store.upload_by_store_path_or_name(store_path, name) {
                Ok(Some(upload)) => {
                    self.cache.put_upload(upload.clone());
                    return Some(upload);
                }
                Ok(None) => {}
                Err(e) => warn!("upload lookup {} failed: {}", name, e),
            }
            if attempt + 1 < UPLOAD_LOOKUP_ATTEMPTS {
                std::thread::sleep(UPLOAD_LOOKUP_BACKOFF);
            }
        }
        None
    }

    /// Creates the upload row, resolving a lost insert race by re-reading
    /// the winner. `None` means the file should stay in place for a retry.
    fn create_upload(&self, name: &str, store_path: &str, path: &Path) -> Option<Upload> {
        let new_upload = NewUpload {
            profile_id: self.profile.id,
            file_name: name.to_string(),
            store_path: store_path.to_string(),
            content_type: self.resolve_content_type(name, path).unwrap_or_default(),
        };
        match self.store.insert_upload(&new_upload) {
            Ok(upload) => {
                info!("NEW upload id={} file={}", upload.id, name);
                self.cache.put_upload(upload.clone());
                Some(upload)
            }
            Err(e) if e.is_unique_violation() => {
                match self.store.upload_by_store_path_or_name(store_path, name) {
                    Ok(Some(upload)) => {
                        self.cache.put_upload(upload.clone());
                        Some(upload)
                    }
                    Ok(None) | Err(_) => {
                        warn!("fetch after upload race failed {}", store_path);
                        None
                    }
                }
            }
            Err(e) => {
                error!("create upload {}: {}", store_path, e);
                None
            }
        }
    }

    /// The idempotent state machine for one file.
    pub fn reconcile(&self, name: &str) {
        let file_path = self.watch_dir.join(name);
        let store_path = self.store_path_for(name);

        if self.cache.record(name).is_some() {
            if self.verbose {
                info!("SKIP catatan exists {}", name);
            }
            return;
        }

        let existing = self.find_existing_upload(name, &store_path);
        if let Some(upload) = &existing {
            if upload.keuangan_id.is_some() {
                if self.verbose {
                    info!("SKIP upload already linked {}", name);
                }
                return;
            }
        }

        let mut upload = match existing {
            Some(upload) => upload,
            None => {
                // Never create uploads under the system principal's profile:
                // background processing must not mutate system-owned
                // fixtures.
                if self.profile.user_id == self.admin_user_id {
                    info!(
                        "SKIP creating upload for admin profile (user_id={}) file={}",
                        self.profile.user_id, name
                    );
                    self.archive_processed(&file_path, name);
                    return;
                }
                match self.create_upload(name, &store_path, &file_path) {
                    Some(upload) => upload,
                    None => return,
                }
            }
        };

        if upload.content_type.is_empty() {
            if let Some(content_type) = self.resolve_content_type(name, &file_path) {
                upload.content_type = content_type;
                if let Err(e) = self.store.update_upload(&upload) {
                    warn!("persist content type for {}: {}", name, e);
                }
                self.cache.put_upload(upload.clone());
            }
        }

        if !is_supported_extension(name) {
            info!("UNSUPPORTED type for {}: marking upload failed", name);
            self.mark_failed(&mut upload, REASON_UNRECOGNIZED);
            self.archive_failed(&file_path, name);
            return;
        }

        let candidates = match self.extractor.find_candidates(&file_path) {
            Ok(candidates) => candidates,
            Err(e) => {
                // Transient: recognizer or image I/O trouble. Leave the file
                // for the next scan.
                if self.verbose {
                    info!("OCR fail {}: {}", name, e);
                }
                return;
            }
        };

        if candidates.matches.is_empty() {
            let reason = if candidates.likely_non_amount {
                REASON_UNRECOGNIZED
            } else {
                REASON_NO_AMOUNT
            };
            info!(
                "NO AMOUNT for {}: marking upload failed and moving to failed ({})",
                name, reason
            );
            self.mark_failed(&mut upload, reason);
            self.archive_failed(&file_path, name);
            return;
        }

        let (amount, raw) = match best_amount_from_matches(&candidates.matches) {
            Some(best) => best,
            None => {
                // Scorer declined; a full multi-pass extraction may still
                // catch the primary amount.
                match self.extractor.extract(&file_path) {
                    Ok(detection) if detection.amount > 0 => {
                        (detection.amount, detection.raw)
                    }
                    _ => {
                        let reason = if candidates.matches.len() > 1 {
                            REASON_AMBIGUOUS
                        } else {
                            REASON_NO_AMOUNT
                        };
                        info!(
                            "UNDECIDED amount for {}: marking upload failed ({})",
                            name, reason
                        );
                        self.mark_failed(&mut upload, reason);
                        self.archive_failed(&file_path, name);
                        return;
                    }
                }
            }
        };

        // A concurrent worker may have recorded this file meanwhile.
        if self.cache.record(name).is_some() {
            return;
        }
        if amount <= 0 {
            return;
        }

        let owner_user_id = match self.store.profile_by_id(upload.profile_id) {
            Ok(Some(profile)) => Some(profile.user_id),
            Ok(None) => None,
            Err(e) => {
                warn!("owner lookup for {} failed: {}", name, e);
                None
            }
        };
        let Some(owner_user_id) = owner_user_id else {
            info!(
                "SKIP unknown owner for {}: no upload owner resolved; not creating catatan",
                name
            );
            self.archive_processed(&file_path, name);
            return;
        };
        if owner_user_id == self.admin_user_id {
            info!(
                "SKIP admin ownership for {}: not creating catatan (user_id={})",
                name, owner_user_id
            );
            self.archive_processed(&file_path, name);
            return;
        }

        let now = Utc::now().to_rfc3339();
        let new_record = NewCatatan {
            user_id: owner_user_id,
            file_name: name.to_string(),
            amount,
            date: now.clone(),
        };
        let record = match self.store.insert_record(&new_record) {
            Ok(record) => record,
            Err(e) if e.is_unique_violation() => {
                match self.store.record_by_user_and_name(owner_user_id, name) {
                    Ok(Some(mut existing)) => {
                        // A re-detection overwrites only when clearly larger,
                        // so a small mis-read cannot clobber a good value.
                        if amount > existing.amount && amount >= existing.amount * 2 {
                            match self.store.update_record_amount(existing.id, amount, &now) {
                                Ok(()) => {
                                    existing.amount = amount;
                                    existing.date = now.clone();
                                }
                                Err(e) => warn!("update amount for {} failed: {}", name, e),
                            }
                        }
                        existing
                    }
                    _ => {
                        error!("creating catatan for {} owner={}: {}", name, owner_user_id, e);
                        return;
                    }
                }
            }
            Err(e) => {
                error!("creating catatan for {} owner={}: {}", name, owner_user_id, e);
                return;
            }
        };
        self.cache.put_record(record.clone());

        if upload.keuangan_id.is_none() {
            upload.keuangan_id = Some(record.id);
            upload.failed = false;
            upload.failed_reason.clear();
            if let Err(e) = self.store.update_upload(&upload) {
                warn!("link upload {} to catatan {}: {}", name, record.id, e);
            }
            self.cache.put_upload(upload.clone());
        }

        info!(
            "Pencatatan sukses amount={} raw={:?} owner={} file={}",
            amount, raw, owner_user_id, name
        );
        self.archive_processed(&file_path, name);
    }
}
