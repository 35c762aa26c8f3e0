//! High-level transactional `ChatStore` API.
//!
//! Composes the repositories into conversation-centric operations. Writes
//! that touch more than one row run inside a single transaction.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use stockchat_core::constants::{DEFAULT_CONVERSATION_TITLE, PREVIEW_CHARS};
use stockchat_core::messages::now_millis;
use stockchat_core::{
    Conversation, ConversationId, ConversationSummary, Message, MessageId, MessagePage,
};
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{AuthSessionRepo, ConversationRepo, MessageRepo};
use crate::sqlite::row_types::{AuthSessionRow, ConversationRow, MessageRow, format_ts};

/// Lifetime of an auth session.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Conversation, message and auth-session storage over a connection pool.
pub struct ChatStore {
    pool: ConnectionPool,
}

impl ChatStore {
    /// Wrap an existing pool and bring its schema up to date.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        let store = Self { pool };
        let conn = store.conn()?;
        let _ = run_migrations(&conn)?;
        Ok(store)
    }

    /// Fresh in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    /// File-backed store at `path`.
    pub fn open_file(path: &Path) -> Result<Self> {
        debug!(?path, "opening chat store");
        Self::new(connection::new_file(path, &ConnectionConfig::default())?)
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Conversations
    // ─────────────────────────────────────────────────────────────────────

    /// Create a conversation with the default title.
    pub fn create_conversation(&self, user_id: i64) -> Result<Conversation> {
        let now = format_ts(now_millis());
        let row = ConversationRow {
            id: ConversationId::new().into_inner(),
            user_id,
            title: DEFAULT_CONVERSATION_TITLE.to_owned(),
            created_at: now.clone(),
            last_active: now,
        };
        let conn = self.conn()?;
        ConversationRepo::insert(&conn, &row)?;
        row.into_conversation()
    }

    /// Look up a conversation.
    pub fn get_conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let conn = self.conn()?;
        ConversationRepo::get_by_id(&conn, id)?
            .map(ConversationRow::into_conversation)
            .transpose()
    }

    /// Conversations of a user, most recently active first.
    pub fn list_conversations(&self, user_id: i64, limit: u32) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn()?;
        ConversationRepo::list_summaries(&conn, user_id, limit)?
            .into_iter()
            .map(|row| row.into_summary(PREVIEW_CHARS))
            .collect()
    }

    /// Change a conversation's title.
    pub fn rename_conversation(&self, id: &ConversationId, title: &str) -> Result<Conversation> {
        let conn = self.conn()?;
        if !ConversationRepo::update_title(&conn, id, title)? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        ConversationRepo::get_by_id(&conn, id)?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?
            .into_conversation()
    }

    /// Delete a conversation and, by cascade, its messages.
    pub fn delete_conversation(&self, id: &ConversationId) -> Result<()> {
        let conn = self.conn()?;
        if ConversationRepo::delete(&conn, id)? {
            Ok(())
        } else {
            Err(StoreError::ConversationNotFound(id.to_string()))
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// Page `page` (1-based, 1 = newest) of `limit` messages, oldest first.
    pub fn get_messages(&self, id: &ConversationId, page: u32, limit: u32) -> Result<MessagePage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let conn = self.conn()?;
        if !ConversationRepo::exists(&conn, id)? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        let total = u64::try_from(MessageRepo::count(&conn, id)?).unwrap_or(0);
        let offset = u64::from(page - 1) * u64::from(limit);
        let messages = MessageRepo::page(&conn, id, limit, offset)?
            .into_iter()
            .map(MessageRow::into_message)
            .collect::<Result<Vec<_>>>()?;
        Ok(MessagePage {
            messages,
            has_more: offset + u64::from(limit) < total,
            total_count: total,
        })
    }

    /// Store a message and bump the conversation's activity time.
    pub fn save_message(&self, id: &ConversationId, message: &Message) -> Result<Message> {
        let row = MessageRow::from_message(id, message)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        if !ConversationRepo::touch(&tx, id, &format_ts(now_millis()))? {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        MessageRepo::upsert(&tx, &row)?;
        tx.commit()?;
        Ok(message.clone())
    }

    /// Record the answer to a confirmation question.
    pub fn save_feedback(
        &self,
        id: &ConversationId,
        message_id: &MessageId,
        approved: bool,
    ) -> Result<u64> {
        let conn = self.conn()?;
        let n = MessageRepo::set_feedback(&conn, id, message_id, approved)?;
        Ok(n as u64)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Auth sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Start a session for `user_id`; returns the bearer token.
    pub fn issue_session(&self, user_id: i64) -> Result<String> {
        let random_bytes: [u8; 32] = rand::random();
        let token = URL_SAFE_NO_PAD.encode(random_bytes);
        let now = Utc::now();
        let conn = self.conn()?;
        let _ = AuthSessionRepo::purge_expired(&conn, &format_ts(now))?;
        AuthSessionRepo::insert(
            &conn,
            &AuthSessionRow {
                token_hash: hash_token(&token),
                user_id,
                created_at: format_ts(now),
                expires_at: format_ts(now + Duration::days(SESSION_TTL_DAYS)),
            },
        )?;
        Ok(token)
    }

    /// Owner of an unexpired session token.
    pub fn validate_session(&self, token: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        AuthSessionRepo::find_active_user(&conn, &hash_token(token), &format_ts(Utc::now()))
    }

    /// End a session. Unknown tokens are ignored.
    pub fn revoke_session(&self, token: &str) -> Result<()> {
        let conn = self.conn()?;
        let _ = AuthSessionRepo::delete(&conn, &hash_token(token))?;
        Ok(())
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use stockchat_core::FeedbackState;

    fn store() -> ChatStore {
        ChatStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_uses_default_title() {
        let s = store();
        let c = s.create_conversation(1).unwrap();
        assert_eq!(c.title, DEFAULT_CONVERSATION_TITLE);
        assert_eq!(s.get_conversation(&c.id).unwrap().unwrap(), c);
    }

    #[test]
    fn save_message_requires_conversation() {
        let s = store();
        let err = s
            .save_message(&ConversationId::from("missing"), &Message::user("hi"))
            .unwrap_err();
        assert_matches!(err, StoreError::ConversationNotFound(_));
    }

    #[test]
    fn pagination_newest_page_first() {
        let s = store();
        let c = s.create_conversation(1).unwrap();
        let msgs: Vec<_> = (0..12).map(|i| Message::user(format!("m{i}"))).collect();
        for m in &msgs {
            let _ = s.save_message(&c.id, m).unwrap();
        }

        let p1 = s.get_messages(&c.id, 1, 10).unwrap();
        assert_eq!(p1.total_count, 12);
        assert!(p1.has_more);
        assert_eq!(p1.messages.first().unwrap().content, "m2");
        assert_eq!(p1.messages.last().unwrap().content, "m11");

        let p2 = s.get_messages(&c.id, 2, 10).unwrap();
        assert!(!p2.has_more);
        let contents: Vec<_> = p2.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1"]);
    }

    #[test]
    fn feedback_updates_stored_question() {
        let s = store();
        let c = s.create_conversation(1).unwrap();
        let mut q = Message::assistant("매수하시겠습니까?");
        q.feedback = FeedbackState::Pending;
        let _ = s.save_message(&c.id, &q).unwrap();

        assert_eq!(s.save_feedback(&c.id, &q.id, true).unwrap(), 1);
        let page = s.get_messages(&c.id, 1, 10).unwrap();
        assert_eq!(page.messages[0].feedback, FeedbackState::Answered(true));
    }

    #[test]
    fn list_includes_count_and_preview() {
        let s = store();
        let c = s.create_conversation(1).unwrap();
        let _ = s.save_message(&c.id, &Message::user("삼성전자 사줘")).unwrap();
        let _ = s.save_message(&c.id, &Message::assistant("분석 결과")).unwrap();
        let list = s.list_conversations(1, 10).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_count, 2);
        assert_eq!(list[0].preview.as_deref(), Some("삼성전자 사줘"));
        assert!(s.list_conversations(2, 10).unwrap().is_empty());
    }

    #[test]
    fn rename_and_delete() {
        let s = store();
        let c = s.create_conversation(1).unwrap();
        assert_eq!(s.rename_conversation(&c.id, "반도체").unwrap().title, "반도체");
        s.delete_conversation(&c.id).unwrap();
        assert_matches!(
            s.delete_conversation(&c.id),
            Err(StoreError::ConversationNotFound(_))
        );
        assert_matches!(
            s.get_messages(&c.id, 1, 10),
            Err(StoreError::ConversationNotFound(_))
        );
    }

    #[test]
    fn sessions_issue_validate_revoke() {
        let s = store();
        let token = s.issue_session(9).unwrap();
        assert_eq!(s.validate_session(&token).unwrap(), Some(9));
        assert_eq!(s.validate_session("forged").unwrap(), None);
        s.revoke_session(&token).unwrap();
        assert_eq!(s.validate_session(&token).unwrap(), None);
    }

    #[test]
    fn tokens_are_base64url_and_stored_hashed() {
        let s = store();
        let token = s.issue_session(1).unwrap();
        assert_eq!(token.len(), 43);
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        let stored: String = s
            .conn()
            .unwrap()
            .query_row("SELECT token_hash FROM auth_sessions", [], |r| r.get(0))
            .unwrap();
        assert_ne!(stored, token);
        assert_eq!(stored.len(), 64);
    }
}
