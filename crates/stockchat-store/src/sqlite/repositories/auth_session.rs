//! Auth session repository. Tokens are only ever stored hashed.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::sqlite::row_types::AuthSessionRow;

/// Auth session repository. Stateless: every method takes `&Connection`.
pub struct AuthSessionRepo;

impl AuthSessionRepo {
    /// Insert a session.
    pub fn insert(conn: &Connection, row: &AuthSessionRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO auth_sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.token_hash, row.user_id, row.created_at, row.expires_at],
        )?;
        Ok(())
    }

    /// Owner of a session that has not expired at `now`.
    pub fn find_active_user(conn: &Connection, token_hash: &str, now: &str) -> Result<Option<i64>> {
        let user = conn
            .query_row(
                "SELECT user_id FROM auth_sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user)
    }

    /// Remove a session. Returns whether it existed.
    pub fn delete(conn: &Connection, token_hash: &str) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM auth_sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(changed > 0)
    }

    /// Remove every session expired at `now`. Returns the number removed.
    pub fn purge_expired(conn: &Connection, now: &str) -> Result<usize> {
        let changed = conn.execute(
            "DELETE FROM auth_sessions WHERE expires_at <= ?1",
            params![now],
        )?;
        Ok(changed)
    }
}
