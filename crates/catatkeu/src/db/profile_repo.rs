//! Profile and user lookups. Account management lives elsewhere; the
//! pipeline only resolves ownership and the admin principal, plus minimal
//! creation helpers for seeds and tests.

use rusqlite::{params, OptionalExtension};

use super::models::{Profile, User};
use super::{Database, DatabaseError};

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Profile>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM profiles WHERE id = ?1",
                params![id],
                Profile::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn find_by_user(db: &Database, user_id: i64) -> Result<Option<Profile>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM profiles WHERE user_id = ?1",
                params![user_id],
                Profile::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn find_user_by_username(
    db: &Database,
    username: &str,
) -> Result<Option<User>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT id, username FROM users WHERE username = ?1",
                params![username],
                User::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn create_user(db: &Database, username: &str) -> Result<User, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (username) VALUES (?1)",
            params![username],
        )?;
        let id = conn.last_insert_rowid();
        Ok(User {
            id,
            username: username.to_string(),
        })
    })
}

pub fn create_profile(db: &Database, user_id: i64, name: &str) -> Result<Profile, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO profiles (user_id, name) VALUES (?1, ?2)",
            params![user_id, name],
        )?;
        let id = conn.last_insert_rowid();
        let row = conn.query_row(
            "SELECT * FROM profiles WHERE id = ?1",
            params![id],
            Profile::from_row,
        )?;
        Ok(row)
    })
}
