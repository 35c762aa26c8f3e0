//! Conversation repository.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;
use crate::sqlite::row_types::{ConversationRow, ConversationSummaryRow};

/// Conversation repository. Stateless: every method takes `&Connection`.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Insert a conversation.
    pub fn insert(conn: &Connection, row: &ConversationRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, last_active)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.user_id, row.title, row.created_at, row.last_active],
        )?;
        Ok(())
    }

    /// Get a conversation by id.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
        let row = conn
            .query_row(
                "SELECT id, user_id, title, created_at, last_active
                 FROM conversations WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Whether a conversation exists.
    pub fn exists(conn: &Connection, id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Conversations of a user, most recently active first, with message
    /// count and the earliest message's content.
    pub fn list_summaries(
        conn: &Connection,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationSummaryRow>> {
        let mut stmt = conn.prepare(
            "SELECT c.id, c.user_id, c.title, c.created_at, c.last_active,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id),
                    (SELECT m.content FROM messages m WHERE m.conversation_id = c.id
                     ORDER BY m.seq ASC LIMIT 1)
             FROM conversations c
             WHERE c.user_id = ?1
             ORDER BY c.last_active DESC, c.created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(ConversationSummaryRow {
                    conversation: Self::map_row(row)?,
                    message_count: row.get(5)?,
                    first_message: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set `last_active`. Returns whether a row changed.
    pub fn touch(conn: &Connection, id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversations SET last_active = ?1 WHERE id = ?2",
            params![at, id],
        )?;
        Ok(changed > 0)
    }

    /// Change the title. Returns whether a row changed.
    pub fn update_title(conn: &Connection, id: &str, title: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a conversation; messages cascade. Returns whether a row was removed.
    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
        Ok(ConversationRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            created_at: row.get(3)?,
            last_active: row.get(4)?,
        })
    }
}
