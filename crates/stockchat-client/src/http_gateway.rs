//! [`PersistenceGateway`] over the REST API served by `stockchat serve`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stockchat_core::{
    Conversation, ConversationId, ConversationSummary, GatewayError, Message, MessageId,
    MessagePage, PersistenceGateway,
};
use tracing::debug;

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
struct RenameBody<'a> {
    title: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackBody<'a> {
    message_id: &'a MessageId,
    feedback: bool,
}

#[derive(Deserialize)]
struct FeedbackResponse {
    updated: u64,
}

#[derive(Deserialize)]
struct SuccessResponse {
    success: bool,
}

/// REST client for the conversation API.
///
/// The server decides which user a request acts for (bearer token, else its
/// configured default), so the `user_id` arguments are not sent.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    /// Client for the API rooted at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    /// Authenticate every request with `token`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and decode. `subject` names the conversation for `NotFound`.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        subject: &str,
    ) -> Result<T, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Transport(format!("invalid response body: {e}")));
        }

        let detail = response
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| status.to_string(), |body| body.message);
        debug!(%status, %detail, "gateway request rejected");
        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::NotFound(subject.to_owned()),
            StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                GatewayError::Invalid(detail)
            }
            _ => GatewayError::Storage(detail),
        })
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn create_conversation(&self, _user_id: i64) -> Result<Conversation, GatewayError> {
        self.send(self.request(Method::POST, "/api/conversations"), "")
            .await
    }

    async fn get_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Conversation, GatewayError> {
        let builder = self.request(Method::GET, &format!("/api/conversations/{conversation_id}"));
        self.send(builder, conversation_id).await
    }

    async fn list_conversations(
        &self,
        _user_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, GatewayError> {
        let builder = self
            .request(Method::GET, "/api/conversations")
            .query(&[("limit", limit)]);
        self.send(builder, "").await
    }

    async fn get_messages(
        &self,
        conversation_id: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, GatewayError> {
        let builder = self
            .request(
                Method::GET,
                &format!("/api/conversations/{conversation_id}/messages"),
            )
            .query(&[("page", page), ("limit", limit)]);
        self.send(builder, conversation_id).await
    }

    async fn save_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<Message, GatewayError> {
        let builder = self
            .request(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/messages"),
            )
            .json(message);
        self.send(builder, conversation_id).await
    }

    async fn save_feedback(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        approved: bool,
    ) -> Result<u64, GatewayError> {
        let builder = self
            .request(
                Method::POST,
                &format!("/api/conversations/{conversation_id}/feedback"),
            )
            .json(&FeedbackBody {
                message_id,
                feedback: approved,
            });
        let response: FeedbackResponse = self.send(builder, conversation_id).await?;
        Ok(response.updated)
    }

    async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<Conversation, GatewayError> {
        let builder = self
            .request(Method::PATCH, &format!("/api/conversations/{conversation_id}"))
            .json(&RenameBody { title });
        self.send(builder, conversation_id).await
    }

    async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), GatewayError> {
        let builder =
            self.request(Method::DELETE, &format!("/api/conversations/{conversation_id}"));
        let response: SuccessResponse = self.send(builder, conversation_id).await?;
        if response.success {
            Ok(())
        } else {
            Err(GatewayError::Storage("delete was not acknowledged".into()))
        }
    }
}
