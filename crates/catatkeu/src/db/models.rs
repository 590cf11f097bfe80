//! Row types for the core tables.

use rusqlite::Row;

/// Metadata row for one stored image file. At most one per
/// (profile_id, file_name); `keuangan_id` links to the financial record once
/// an amount has been extracted.
#[derive(Debug, Clone)]
pub struct Upload {
    pub id: i64,
    pub profile_id: i64,
    pub file_name: String,
    /// Canonical slash-separated relative path, e.g. "public/keu/slip.jpg".
    pub store_path: String,
    pub content_type: String,
    pub keuangan_id: Option<i64>,
    pub failed: bool,
    pub failed_reason: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Upload {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            profile_id: row.get("profile_id")?,
            file_name: row.get("file_name")?,
            store_path: row.get("store_path")?,
            content_type: row.get("content_type")?,
            keuangan_id: row.get("keuangan_id")?,
            failed: row.get("failed")?,
            failed_reason: row.get("failed_reason")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Insert payload for a new upload row.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub profile_id: i64,
    pub file_name: String,
    pub store_path: String,
    pub content_type: String,
}

/// A financial note: the extracted amount for one file, owned by one user.
/// At most one per (user_id, file_name); amount is always positive.
#[derive(Debug, Clone)]
pub struct CatatanKeuangan {
    pub id: i64,
    pub user_id: i64,
    pub file_name: String,
    pub amount: i64,
    /// RFC3339.
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CatatanKeuangan {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            file_name: row.get("file_name")?,
            amount: row.get("amount")?,
            date: row.get("date")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Insert payload for a new record.
#[derive(Debug, Clone)]
pub struct NewCatatan {
    pub user_id: i64,
    pub file_name: String,
    pub amount: i64,
    pub date: String,
}

/// Binds a user to the files they own. Managed externally; read here to
/// resolve upload ownership.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub active: bool,
}

impl Profile {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            active: row.get("active")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
}

impl User {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
        })
    }
}
