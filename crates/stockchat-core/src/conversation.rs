//! Conversation records as exchanged with the persistence gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ConversationId;
use crate::messages::Message;

/// A stored conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Durable id, also the backend `thread_id`.
    pub id: ConversationId,
    /// Owner.
    pub user_id: i64,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the latest saved message (or creation).
    pub last_active: DateTime<Utc>,
}

/// Row of a conversation listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Latest activity.
    pub last_active: DateTime<Utc>,
    /// Number of stored messages.
    pub message_count: u64,
    /// First characters of the first message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// One page of history. Messages are ordered oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Messages in this page.
    pub messages: Vec<Message>,
    /// Whether older pages exist.
    pub has_more: bool,
    /// Messages in the whole conversation.
    pub total_count: u64,
}
