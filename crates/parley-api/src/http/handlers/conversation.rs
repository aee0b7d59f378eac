//! Conversation HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/conversations               - Create a conversation
//! - GET  /api/v1/conversations               - List the caller's conversations
//! - GET  /api/v1/conversations/{id}/messages - Messages in creation order

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use parley_core::chat::repository::TurnStore;
use parley_types::chat::{ChatMessage, Conversation};
use parley_types::error::RelayError;

use crate::http::error::AppError;
use crate::http::extractors::auth::Caller;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Listing entry for a conversation.
#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
}

impl From<Conversation> for ConversationSummary {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
        }
    }
}

/// Parse a conversation id from a path segment.
///
/// A malformed id cannot name any conversation, so it is reported the same
/// way as a missing one.
pub fn parse_conversation_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse::<Uuid>()
        .map_err(|_| AppError::Relay(RelayError::NotFound))
}

/// POST /api/v1/conversations - Create an empty conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<(StatusCode, Json<ApiResponse<ConversationSummary>>), AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let conversation = state
        .engine
        .store()
        .create_conversation(&Conversation::new(caller.user_id))
        .await?;
    tracing::info!(conversation_id = %conversation.id, "Conversation created");

    let id = conversation.id;
    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(ConversationSummary::from(conversation), request_id, elapsed)
        .with_link("messages", &format!("/api/v1/conversations/{id}/messages"));

    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/conversations - Caller's conversations, most recent first.
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ApiResponse<Vec<ConversationSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let conversations = state
        .engine
        .store()
        .list_conversations(&caller.user_id)
        .await?;
    let items: Vec<ConversationSummary> = conversations.into_iter().map(Into::into).collect();

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(items, request_id, elapsed)))
}

/// GET /api/v1/conversations/{id}/messages - Full message history.
pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let conversation_id = parse_conversation_id(&id)?;

    let store = state.engine.store();
    store
        .get_conversation(&conversation_id)
        .await?
        .filter(|c| c.is_owned_by(&caller.user_id))
        .ok_or(AppError::Relay(RelayError::NotFound))?;

    let messages = store.list_messages(&conversation_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(messages, request_id, elapsed)))
}
