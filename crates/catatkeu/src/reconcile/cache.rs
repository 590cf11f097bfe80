//! Per-session preload cache.
//!
//! Uploads and records already known for this profile/user, keyed by file
//! name. Reads dominate; writes happen on first observation of a file.
//! Owned by one dispatcher session and shared across its workers.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::db::{CatatanKeuangan, Upload};

#[derive(Default)]
pub struct PreloadCache {
    uploads_by_file: RwLock<HashMap<String, Upload>>,
    records_by_file: RwLock<HashMap<String, CatatanKeuangan>>,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the cache with the rows fetched at startup.
    pub fn preload(uploads: Vec<Upload>, records: Vec<CatatanKeuangan>) -> Self {
        let cache = Self::new();
        {
            let mut map = cache.uploads_by_file.write().unwrap_or_else(PoisonError::into_inner);
            for upload in uploads {
                map.insert(upload.file_name.clone(), upload);
            }
        }
        {
            let mut map = cache.records_by_file.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                map.insert(record.file_name.clone(), record);
            }
        }
        cache
    }

    pub fn upload(&self, file_name: &str) -> Option<Upload> {
        self.uploads_by_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
            .cloned()
    }

    pub fn put_upload(&self, upload: Upload) {
        self.uploads_by_file
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upload.file_name.clone(), upload);
    }

    pub fn record(&self, file_name: &str) -> Option<CatatanKeuangan> {
        self.records_by_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
            .cloned()
    }

    pub fn put_record(&self, record: CatatanKeuangan) {
        self.records_by_file
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.file_name.clone(), record);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads_by_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn record_count(&self) -> usize {
        self.records_by_file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
