//! Contracts for the collaborators the chat session depends on.
//!
//! [`PersistenceGateway`] is implemented by the SQLite store (in-process) and
//! by the HTTP client (talking to the REST server). The session controller
//! only ever sees `Arc<dyn PersistenceGateway>`.

use async_trait::async_trait;

use crate::conversation::{Conversation, ConversationSummary, MessagePage};
use crate::errors::{AuthError, GatewayError};
use crate::ids::{ConversationId, MessageId};
use crate::messages::Message;

/// Durable store for conversations and messages.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create a conversation with the default title.
    async fn create_conversation(&self, user_id: i64) -> Result<Conversation, GatewayError>;

    /// One conversation. `NotFound` when it does not exist.
    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, GatewayError>;

    /// Conversations of `user_id`, most recently active first.
    async fn list_conversations(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, GatewayError>;

    /// One page of history. Page 1 holds the newest messages; each page is
    /// ordered oldest first.
    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, GatewayError>;

    /// Append a message and bump the conversation's activity time.
    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<Message, GatewayError>;

    /// Record the answer to a confirmation question. Returns the number of
    /// messages updated.
    async fn save_feedback(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        approved: bool,
    ) -> Result<u64, GatewayError>;

    /// Change a conversation's title.
    async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<Conversation, GatewayError>;

    /// Delete a conversation and its messages.
    async fn delete_conversation(&self, conversation_id: &ConversationId)
    -> Result<(), GatewayError>;
}

/// Token-based session authentication.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Start a session for `user_id` and return its bearer token.
    async fn issue(&self, user_id: i64) -> Result<String, AuthError>;

    /// User id behind an unexpired token, `None` otherwise.
    async fn validate(&self, token: &str) -> Result<Option<i64>, AuthError>;

    /// End the session behind `token`. Unknown tokens are ignored.
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;
}
