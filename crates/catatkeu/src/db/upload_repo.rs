//! Upload repository — CRUD for the `uploads` table.

use rusqlite::{params, OptionalExtension};

use super::models::{NewUpload, Upload};
use super::{now_rfc3339, Database, DatabaseError};

/// Inserts a new upload row and returns it. The unique index on
/// (profile_id, file_name) makes concurrent duplicates fail here.
pub fn insert(db: &Database, upload: &NewUpload) -> Result<Upload, DatabaseError> {
    db.with_conn(|conn| {
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO uploads (profile_id, file_name, store_path, content_type,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                upload.profile_id,
                upload.file_name,
                upload.store_path,
                upload.content_type,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let row = conn.query_row("SELECT * FROM uploads WHERE id = ?1", params![id], |r| {
            Upload::from_row(r)
        })?;
        Ok(row)
    })
}

/// Overwrites the mutable columns of an existing upload row.
pub fn update(db: &Database, upload: &Upload) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE uploads SET content_type=?2, keuangan_id=?3, failed=?4,
             failed_reason=?5, updated_at=?6 WHERE id=?1",
            params![
                upload.id,
                upload.content_type,
                upload.keuangan_id,
                upload.failed,
                upload.failed_reason,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds an upload by its natural key.
pub fn find_by_profile_and_name(
    db: &Database,
    profile_id: i64,
    file_name: &str,
) -> Result<Option<Upload>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM uploads WHERE profile_id = ?1 AND file_name = ?2",
                params![profile_id, file_name],
                Upload::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds an upload by store path or bare file name. This is the lookup the
/// reconciler retries while an API-side writer may still be inserting.
pub fn find_by_store_path_or_name(
    db: &Database,
    store_path: &str,
    file_name: &str,
) -> Result<Option<Upload>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM uploads WHERE store_path = ?1 OR file_name = ?2 LIMIT 1",
                params![store_path, file_name],
                Upload::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All uploads belonging to a profile, for the preload cache.
pub fn find_for_profile(db: &Database, profile_id: i64) -> Result<Vec<Upload>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM uploads WHERE profile_id = ?1")?;
        let rows = stmt
            .query_map(params![profile_id], Upload::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
