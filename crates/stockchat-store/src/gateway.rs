//! Async gateway adapters over [`ChatStore`].
//!
//! `SQLite` calls block, so every operation runs on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use stockchat_core::{
    AuthError, AuthGateway, Conversation, ConversationId, ConversationSummary, GatewayError,
    Message, MessageId, MessagePage, PersistenceGateway,
};

use crate::errors::{Result as StoreResult, StoreError};
use crate::store::ChatStore;

async fn blocking<T, F>(store: &Arc<ChatStore>, f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&ChatStore) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| StoreError::Internal(format!("store task failed: {e}")))?
}

/// [`PersistenceGateway`] backed by the local `SQLite` store.
#[derive(Clone)]
pub struct SqliteGateway {
    store: Arc<ChatStore>,
}

impl SqliteGateway {
    /// Wrap a shared store.
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn create_conversation(&self, user_id: i64) -> Result<Conversation, GatewayError> {
        blocking(&self.store, move |s| s.create_conversation(user_id))
            .await
            .map_err(Into::into)
    }

    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, GatewayError> {
        let id = conversation_id.clone();
        blocking(&self.store, move |s| {
            s.get_conversation(&id)?
                .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
        })
        .await
        .map_err(Into::into)
    }

    async fn list_conversations(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, GatewayError> {
        blocking(&self.store, move |s| s.list_conversations(user_id, limit))
            .await
            .map_err(Into::into)
    }

    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, GatewayError> {
        let id = conversation_id.clone();
        blocking(&self.store, move |s| s.get_messages(&id, page, limit))
            .await
            .map_err(Into::into)
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<Message, GatewayError> {
        let id = conversation_id.clone();
        let message = message.clone();
        blocking(&self.store, move |s| s.save_message(&id, &message))
            .await
            .map_err(Into::into)
    }

    async fn save_feedback(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        approved: bool,
    ) -> Result<u64, GatewayError> {
        let id = conversation_id.clone();
        let message_id = message_id.clone();
        blocking(&self.store, move |s| s.save_feedback(&id, &message_id, approved))
            .await
            .map_err(Into::into)
    }

    async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<Conversation, GatewayError> {
        let id = conversation_id.clone();
        let title = title.to_owned();
        blocking(&self.store, move |s| s.rename_conversation(&id, &title))
            .await
            .map_err(Into::into)
    }

    async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), GatewayError> {
        let id = conversation_id.clone();
        blocking(&self.store, move |s| s.delete_conversation(&id))
            .await
            .map_err(Into::into)
    }
}

/// [`AuthGateway`] backed by the `auth_sessions` table.
#[derive(Clone)]
pub struct SqliteAuthGateway {
    store: Arc<ChatStore>,
}

impl SqliteAuthGateway {
    /// Wrap a shared store.
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthGateway for SqliteAuthGateway {
    async fn issue(&self, user_id: i64) -> Result<String, AuthError> {
        blocking(&self.store, move |s| s.issue_session(user_id))
            .await
            .map_err(Into::into)
    }

    async fn validate(&self, token: &str) -> Result<Option<i64>, AuthError> {
        let token = token.to_owned();
        blocking(&self.store, move |s| s.validate_session(&token))
            .await
            .map_err(Into::into)
    }

    async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let token = token.to_owned();
        blocking(&self.store, move |s| s.revoke_session(&token))
            .await
            .map_err(Into::into)
    }
}
