//! Message repository.
//!
//! Messages are ordered by insertion sequence (`seq`), which is the order the
//! chat produced them in.

use rusqlite::{Connection, Row, params};

use crate::errors::Result;
use crate::sqlite::row_types::MessageRow;

const COLUMNS: &str = "seq, conversation_id, message_id, role, content, timestamp, \
                       subgraph, trading_action, error, feedback_response";

/// Message repository. Stateless: every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message, or overwrite the stored copy of the same message id.
    pub fn upsert(conn: &Connection, row: &MessageRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO messages (conversation_id, message_id, role, content, timestamp,
                                   subgraph, trading_action, error, feedback_response)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (conversation_id, message_id) DO UPDATE SET
                 role = excluded.role,
                 content = excluded.content,
                 subgraph = excluded.subgraph,
                 trading_action = excluded.trading_action,
                 error = excluded.error,
                 feedback_response = excluded.feedback_response",
            params![
                row.conversation_id,
                row.message_id,
                row.role,
                row.content,
                row.timestamp,
                row.subgraph,
                row.trading_action,
                row.error,
                row.feedback_response,
            ],
        )?;
        Ok(())
    }

    /// Number of messages in a conversation.
    pub fn count(conn: &Connection, conversation_id: &str) -> Result<i64> {
        let n = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Newest-first window of messages, returned oldest first.
    pub fn page(
        conn: &Connection,
        conversation_id: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM messages WHERE conversation_id = ?1
             ORDER BY seq DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let mut rows = stmt
            .query_map(params![conversation_id, limit, offset], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Mark a question answered: role becomes `assistant` and the answer is
    /// stored. Returns the number of rows updated.
    pub fn set_feedback(
        conn: &Connection,
        conversation_id: &str,
        message_id: &str,
        approved: bool,
    ) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE messages SET role = 'assistant', feedback_response = ?1
             WHERE conversation_id = ?2 AND message_id = ?3",
            params![approved, conversation_id, message_id],
        )?;
        Ok(changed)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            seq: row.get(0)?,
            conversation_id: row.get(1)?,
            message_id: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            timestamp: row.get(5)?,
            subgraph: row.get(6)?,
            trading_action: row.get(7)?,
            error: row.get(8)?,
            feedback_response: row.get(9)?,
        })
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::sqlite::repositories::conversation::ConversationRepo;
    use crate::sqlite::row_types::ConversationRow;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        ConversationRepo::insert(
            &conn,
            &ConversationRow {
                id: "c1".into(),
                user_id: 1,
                title: "t".into(),
                created_at: "2024-01-01T00:00:00.000Z".into(),
                last_active: "2024-01-01T00:00:00.000Z".into(),
            },
        )
        .unwrap();
        conn
    }

    fn msg(id: &str, role: &str) -> MessageRow {
        MessageRow {
            seq: 0,
            conversation_id: "c1".into(),
            message_id: id.into(),
            role: role.into(),
            content: format!("content {id}"),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            subgraph: None,
            trading_action: None,
            error: None,
            feedback_response: None,
        }
    }

    #[test]
    fn pages_are_newest_first_each_oldest_first() {
        let conn = setup();
        for i in 0..5 {
            MessageRepo::upsert(&conn, &msg(&format!("m{i}"), "user")).unwrap();
        }
        let first = MessageRepo::page(&conn, "c1", 2, 0).unwrap();
        let ids: Vec<_> = first.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, ["m3", "m4"]);

        let last = MessageRepo::page(&conn, "c1", 2, 4).unwrap();
        let ids: Vec<_> = last.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, ["m0"]);
        assert_eq!(MessageRepo::count(&conn, "c1").unwrap(), 5);
    }

    #[test]
    fn upsert_overwrites_same_id() {
        let conn = setup();
        MessageRepo::upsert(&conn, &msg("m1", "question")).unwrap();
        let mut updated = msg("m1", "assistant");
        updated.feedback_response = Some(true);
        MessageRepo::upsert(&conn, &updated).unwrap();
        assert_eq!(MessageRepo::count(&conn, "c1").unwrap(), 1);
        let rows = MessageRepo::page(&conn, "c1", 10, 0).unwrap();
        assert_eq!(rows[0].role, "assistant");
        assert_eq!(rows[0].feedback_response, Some(true));
    }

    #[test]
    fn set_feedback_flips_role() {
        let conn = setup();
        MessageRepo::upsert(&conn, &msg("q1", "question")).unwrap();
        assert_eq!(MessageRepo::set_feedback(&conn, "c1", "q1", false).unwrap(), 1);
        assert_eq!(MessageRepo::set_feedback(&conn, "c1", "missing", false).unwrap(), 0);
        let rows = MessageRepo::page(&conn, "c1", 10, 0).unwrap();
        assert_eq!(rows[0].role, "assistant");
        assert_eq!(rows[0].feedback_response, Some(false));
    }

    #[test]
    fn messages_cascade_with_conversation() {
        let conn = setup();
        MessageRepo::upsert(&conn, &msg("m1", "user")).unwrap();
        ConversationRepo::delete(&conn, "c1").unwrap();
        assert_eq!(MessageRepo::count(&conn, "c1").unwrap(), 0);
    }
}
