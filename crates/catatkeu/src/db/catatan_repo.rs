//! Record repository — CRUD for the `catatan_keuangans` table.

use rusqlite::{params, OptionalExtension};

use super::models::{CatatanKeuangan, NewCatatan};
use super::{now_rfc3339, Database, DatabaseError};

/// Inserts a new record and returns it. The unique index on
/// (user_id, file_name) rejects concurrent duplicates.
pub fn insert(db: &Database, record: &NewCatatan) -> Result<CatatanKeuangan, DatabaseError> {
    db.with_conn(|conn| {
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO catatan_keuangans (user_id, file_name, amount, date,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                record.user_id,
                record.file_name,
                record.amount,
                record.date,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let row = conn.query_row(
            "SELECT * FROM catatan_keuangans WHERE id = ?1",
            params![id],
            CatatanKeuangan::from_row,
        )?;
        Ok(row)
    })
}

/// Overwrites amount and date. This is the single write path for the
/// "new amount wins only when clearly larger" policy and the updater tool.
pub fn update_amount(
    db: &Database,
    id: i64,
    amount: i64,
    date: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE catatan_keuangans SET amount=?2, date=?3, updated_at=?4 WHERE id=?1",
            params![id, amount, date, now_rfc3339()],
        )?;
        Ok(())
    })
}

/// Finds a record by its natural key.
pub fn find_by_user_and_name(
    db: &Database,
    user_id: i64,
    file_name: &str,
) -> Result<Option<CatatanKeuangan>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM catatan_keuangans WHERE user_id = ?1 AND file_name = ?2",
                params![user_id, file_name],
                CatatanKeuangan::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds a record by file name alone. Used by the updater tool, which walks
/// archived files without knowing their owners.
pub fn find_by_name(
    db: &Database,
    file_name: &str,
) -> Result<Option<CatatanKeuangan>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM catatan_keuangans WHERE file_name = ?1 LIMIT 1",
                params![file_name],
                CatatanKeuangan::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// All records belonging to a user, for the preload cache.
pub fn find_for_user(db: &Database, user_id: i64) -> Result<Vec<CatatanKeuangan>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM catatan_keuangans WHERE user_id = ?1")?;
        let rows = stmt
            .query_map(params![user_id], CatatanKeuangan::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
