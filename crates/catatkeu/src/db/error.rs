//! Error type for the SQLite-backed persistence layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Anything rusqlite reports: failed statements, busy timeouts,
    /// constraint violations. Unique-constraint hits are classified further
    /// up, in the store port.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not prepare the database file's location on disk.
    #[error("cannot prepare database path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema migration did not apply cleanly.
    #[error("schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A worker panicked while holding the connection mutex.
    #[error("database connection mutex poisoned")]
    LockPoisoned,
}
