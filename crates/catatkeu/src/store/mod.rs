//! The persistence port the reconciler consumes.
//!
//! Idempotence comes from the unique indices on (profile_id, file_name) and
//! (user_id, file_name), not from transactions: writers race freely and the
//! loser re-reads. For that to work the port must report unique-constraint
//! violations distinguishably.

use std::path::Path;

use thiserror::Error;

use crate::db::{
    catatan_repo, profile_repo, upload_repo, CatatanKeuangan, Database, DatabaseError, NewCatatan,
    NewUpload, Profile, Upload, User,
};

#[derive(Error, Debug)]
pub enum StoreError {
    /// An insert collided with an existing row on a unique index. Expected
    /// under races; callers re-read the winner.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

/// Classifies a database error by message. Compared case-insensitively so
/// Postgres's "duplicate key value violates unique constraint" and SQLite's
/// "UNIQUE constraint failed" both register.
fn classify(err: DatabaseError) -> StoreError {
    let message = err.to_string();
    let low = message.to_lowercase();
    if low.contains("duplicate key")
        || low.contains("unique constraint")
        || low.contains("already exists")
    {
        StoreError::UniqueViolation(message)
    } else {
        StoreError::Database(err)
    }
}

/// Abstract record store. One implementation wraps SQLite; tests use either
/// an in-memory SQLite database or hand-rolled fakes.
pub trait RecordStore: Send + Sync {
    fn upload_by_profile_and_name(
        &self,
        profile_id: i64,
        file_name: &str,
    ) -> Result<Option<Upload>, StoreError>;
    fn upload_by_store_path_or_name(
        &self,
        store_path: &str,
        file_name: &str,
    ) -> Result<Option<Upload>, StoreError>;
    fn uploads_for_profile(&self, profile_id: i64) -> Result<Vec<Upload>, StoreError>;
    fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, StoreError>;
    fn update_upload(&self, upload: &Upload) -> Result<(), StoreError>;

    fn record_by_user_and_name(
        &self,
        user_id: i64,
        file_name: &str,
    ) -> Result<Option<CatatanKeuangan>, StoreError>;
    fn record_by_name(&self, file_name: &str) -> Result<Option<CatatanKeuangan>, StoreError>;
    fn records_for_user(&self, user_id: i64) -> Result<Vec<CatatanKeuangan>, StoreError>;
    fn insert_record(&self, record: &NewCatatan) -> Result<CatatanKeuangan, StoreError>;
    fn update_record_amount(&self, id: i64, amount: i64, date: &str) -> Result<(), StoreError>;

    fn profile_by_id(&self, id: i64) -> Result<Option<Profile>, StoreError>;
    fn profile_by_user(&self, user_id: i64) -> Result<Option<Profile>, StoreError>;
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens the store at `path`; ":memory:" yields a fresh in-memory
    /// database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = if path == ":memory:" {
            Database::open_in_memory()?
        } else {
            Database::open(Path::new(path))?
        };
        Ok(Self::new(db))
    }

    /// Direct database access for seeds and tests.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl RecordStore for SqliteStore {
    fn upload_by_profile_and_name(
        &self,
        profile_id: i64,
        file_name: &str,
    ) -> Result<Option<Upload>, StoreError> {
        Ok(upload_repo::find_by_profile_and_name(
            &self.db, profile_id, file_name,
        )?)
    }

    fn upload_by_store_path_or_name(
        &self,
        store_path: &str,
        file_name: &str,
    ) -> Result<Option<Upload>, StoreError> {
        Ok(upload_repo::find_by_store_path_or_name(
            &self.db, store_path, file_name,
        )?)
    }

    fn uploads_for_profile(&self, profile_id: i64) -> Result<Vec<Upload>, StoreError> {
        Ok(upload_repo::find_for_profile(&self.db, profile_id)?)
    }

    fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, StoreError> {
        upload_repo::insert(&self.db, upload).map_err(classify)
    }

    fn update_upload(&self, upload: &Upload) -> Result<(), StoreError> {
        Ok(upload_repo::update(&self.db, upload)?)
    }

    fn record_by_user_and_name(
        &self,
        user_id: i64,
        file_name: &str,
    ) -> Result<Option<CatatanKeuangan>, StoreError> {
        Ok(catatan_repo::find_by_user_and_name(
            &self.db, user_id, file_name,
        )?)
    }

    fn record_by_name(&self, file_name: &str) -> Result<Option<CatatanKeuangan>, StoreError> {
        Ok(catatan_repo::find_by_name(&self.db, file_name)?)
    }

    fn records_for_user(&self, user_id: i64) -> Result<Vec<CatatanKeuangan>, StoreError> {
        Ok(catatan_repo::find_for_user(&self.db, user_id)?)
    }

    fn insert_record(&self, record: &NewCatatan) -> Result<CatatanKeuangan, StoreError> {
        catatan_repo::insert(&self.db, record).map_err(classify)
    }

    fn update_record_amount(&self, id: i64, amount: i64, date: &str) -> Result<(), StoreError> {
        Ok(catatan_repo::update_amount(&self.db, id, amount, date)?)
    }

    fn profile_by_id(&self, id: i64) -> Result<Option<Profile>, StoreError> {
        Ok(profile_repo::find_by_id(&self.db, id)?)
    }

    fn profile_by_user(&self, user_id: i64) -> Result<Option<Profile>, StoreError> {
        Ok(profile_repo::find_by_user(&self.db, user_id)?)
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(profile_repo::find_user_by_username(&self.db, username)?)
    }
}
