//! REST handlers for conversations, messages and auth sessions.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stockchat_core::{
    Conversation, ConversationId, ConversationSummary, GatewayError, Message, MessageId,
    MessagePage,
};
use tracing::{debug, info};

use crate::errors::ApiError;
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `/api/...` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route(
            "/api/conversations/{id}",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(get_messages).post(save_message),
        )
        .route("/api/conversations/{id}/feedback", post(save_feedback))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackBody {
    message_id: MessageId,
    feedback: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    user_id: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// User a request acts for: the token's owner, else the configured default
/// when auth is optional. A token that is present but invalid is always
/// rejected.
async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    match bearer_token(headers) {
        Some(token) => state.auth.validate(token).await?.ok_or(ApiError::Unauthorized),
        None if state.require_auth => Err(ApiError::Unauthorized),
        None => Ok(state.default_user_id),
    }
}

/// Conversation `id` when it belongs to the requesting user. Someone else's
/// conversation is reported as not found.
async fn owned_conversation(
    state: &AppState,
    headers: &HeaderMap,
    id: &ConversationId,
) -> Result<Conversation, ApiError> {
    let user_id = resolve_user(state, headers).await?;
    let conversation = state.gateway.get_conversation(id).await?;
    if conversation.user_id != user_id {
        debug!(
            conversation_id = %id,
            user_id,
            owner = conversation.user_id,
            "conversation belongs to another user"
        );
        return Err(GatewayError::NotFound(id.to_string()).into());
    }
    Ok(conversation)
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<MeResponse> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let user_id = state.auth.validate(token).await?.ok_or(ApiError::Unauthorized)?;
    Ok(Json(MeResponse { user_id }))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Value> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    state.auth.revoke(token).await?;
    info!("session revoked");
    Ok(Json(json!({ "success": true })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Conversation> {
    let user_id = resolve_user(&state, &headers).await?;
    let conversation = state.gateway.create_conversation(user_id).await?;
    info!(conversation_id = %conversation.id, user_id, "conversation created");
    Ok(Json(conversation))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Vec<ConversationSummary>> {
    let user_id = resolve_user(&state, &headers).await?;
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.gateway.list_conversations(user_id, limit).await?))
}

async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Conversation> {
    let id = ConversationId::from(id);
    Ok(Json(owned_conversation(&state, &headers, &id).await?))
}

async fn rename_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<RenameBody>, JsonRejection>,
) -> ApiResult<Conversation> {
    let id = ConversationId::from(id);
    let _ = owned_conversation(&state, &headers, &id).await?;
    let Json(body) = body?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    Ok(Json(state.gateway.rename_conversation(&id, title).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = ConversationId::from(id);
    let _ = owned_conversation(&state, &headers, &id).await?;
    state.gateway.delete_conversation(&id).await?;
    info!(conversation_id = %id, "conversation deleted");
    Ok(Json(json!({ "success": true })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<MessagePage> {
    let id = ConversationId::from(id);
    let _ = owned_conversation(&state, &headers, &id).await?;
    let Query(query) = query?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(state.gateway.get_messages(&id, page, limit).await?))
}

async fn save_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<Message>, JsonRejection>,
) -> ApiResult<Message> {
    let id = ConversationId::from(id);
    let _ = owned_conversation(&state, &headers, &id).await?;
    let Json(message) = body?;
    let stored = state.gateway.save_message(&id, &message).await?;
    debug!(conversation_id = %id, message_id = %stored.id, role = %stored.role(), "message saved");
    Ok(Json(stored))
}

async fn save_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<FeedbackBody>, JsonRejection>,
) -> ApiResult<Value> {
    let id = ConversationId::from(id);
    let _ = owned_conversation(&state, &headers, &id).await?;
    let Json(body) = body?;
    let updated = state
        .gateway
        .save_feedback(&id, &body.message_id, body.feedback)
        .await?;
    Ok(Json(json!({ "updated": updated })))
}
