//! Database row types and their conversion to domain types.
//!
//! Rows mirror the table shape (timestamps as RFC 3339 text, JSON columns as
//! text). Conversion to [`Conversation`] / [`Message`] happens here so the
//! repositories stay pure SQL.

use chrono::{DateTime, SecondsFormat, Utc};
use stockchat_core::messages::MessageRecord;
use stockchat_core::{Conversation, ConversationSummary, Message, Role};

use crate::errors::{Result, StoreError};

/// Format a timestamp the way every table stores it.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad timestamp {raw:?}: {e}")))
}

/// Raw row from the `conversations` table.
#[derive(Clone, Debug)]
pub struct ConversationRow {
    /// Conversation id.
    pub id: String,
    /// Owner.
    pub user_id: i64,
    /// Title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last activity timestamp.
    pub last_active: String,
}

impl ConversationRow {
    /// Convert into the domain type.
    pub fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            created_at: parse_ts(&self.created_at)?,
            last_active: parse_ts(&self.last_active)?,
            id: self.id.into(),
            user_id: self.user_id,
            title: self.title,
        })
    }
}

/// Conversation row joined with message aggregates.
#[derive(Clone, Debug)]
pub struct ConversationSummaryRow {
    /// Base row.
    pub conversation: ConversationRow,
    /// Number of messages.
    pub message_count: i64,
    /// Content of the earliest message.
    pub first_message: Option<String>,
}

impl ConversationSummaryRow {
    /// Convert into the domain type, truncating the preview to `preview_chars`.
    pub fn into_summary(self, preview_chars: usize) -> Result<ConversationSummary> {
        let conv = self.conversation.into_conversation()?;
        Ok(ConversationSummary {
            id: conv.id,
            title: conv.title,
            created_at: conv.created_at,
            last_active: conv.last_active,
            message_count: u64::try_from(self.message_count).unwrap_or(0),
            preview: self
                .first_message
                .map(|m| m.chars().take(preview_chars).collect()),
        })
    }
}

/// Raw row from the `messages` table.
#[derive(Clone, Debug)]
pub struct MessageRow {
    /// Insertion sequence.
    pub seq: i64,
    /// Owning conversation.
    pub conversation_id: String,
    /// Message id.
    pub message_id: String,
    /// Legacy role string.
    pub role: String,
    /// Text.
    pub content: String,
    /// Creation timestamp.
    pub timestamp: String,
    /// Subgraph JSON.
    pub subgraph: Option<String>,
    /// Trading action JSON.
    pub trading_action: Option<String>,
    /// Error text.
    pub error: Option<String>,
    /// Answer to a confirmation question.
    pub feedback_response: Option<bool>,
}

impl MessageRow {
    /// Build a row for insertion. `seq` is assigned by `SQLite`.
    pub fn from_message(conversation_id: &str, msg: &Message) -> Result<Self> {
        let rec = MessageRecord::from(msg.clone());
        Ok(Self {
            seq: 0,
            conversation_id: conversation_id.to_owned(),
            message_id: rec.id.into_inner(),
            role: rec.role.as_str().to_owned(),
            content: rec.content,
            timestamp: format_ts(rec.timestamp),
            subgraph: rec.subgraph.as_ref().map(serde_json::to_string).transpose()?,
            trading_action: rec
                .trading_action
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            error: rec.error,
            feedback_response: rec.feedback_response.flatten(),
        })
    }

    /// Convert into the domain type.
    pub fn into_message(self) -> Result<Message> {
        let role: Role = self
            .role
            .parse()
            .map_err(|e| StoreError::CorruptRow(format!("message {}: {e}", self.message_id)))?;
        // a pending question is stored with a NULL answer
        let feedback_response = match (role, self.feedback_response) {
            (_, Some(b)) => Some(Some(b)),
            (Role::Question, None) => Some(None),
            _ => None,
        };
        let rec = MessageRecord {
            id: self.message_id.into(),
            role,
            content: self.content,
            timestamp: parse_ts(&self.timestamp)?,
            subgraph: self.subgraph.as_deref().map(serde_json::from_str).transpose()?,
            trading_action: self
                .trading_action
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error: self.error,
            feedback_response,
        };
        Ok(Message::from(rec))
    }
}

/// Raw row from the `auth_sessions` table.
#[derive(Clone, Debug)]
pub struct AuthSessionRow {
    /// SHA-256 hex of the bearer token.
    pub token_hash: String,
    /// Session owner.
    pub user_id: i64,
    /// Creation timestamp.
    pub created_at: String,
    /// Expiry timestamp.
    pub expires_at: String,
}
