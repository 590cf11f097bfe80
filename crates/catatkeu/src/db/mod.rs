//! Persistent storage for uploads, records and their owners.
//!
//! A single SQLite connection behind a mutex. Repositories are free
//! functions taking `&Database`; the store port in `crate::store` composes
//! them into the capability the reconciler consumes.

pub mod catatan_repo;
pub mod error;
pub mod migrations;
pub mod models;
pub mod profile_repo;
pub mod upload_repo;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

pub use error::DatabaseError;
pub use models::{CatatanKeuangan, NewCatatan, NewUpload, Profile, Upload, User};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (creating if needed) the database file and applies migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens a fresh in-memory database. Used by tests and dry tooling.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` with the connection held.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let guard = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&guard)
    }
}

/// RFC3339 timestamp for row bookkeeping columns.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
