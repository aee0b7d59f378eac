//! Streaming message endpoint.
//!
//! POST /api/v1/conversations/{id}/messages
//!
//! Persists the user message, then answers with a `text/event-stream` body of
//! `data: {"type":"content"|"reasoning","content":"..."}` frames. The body ends
//! cleanly once the reply is stored. A failed turn aborts the connection
//! instead, so a client never mistakes a partial reply for a complete one.
//! Errors raised before streaming starts come back as JSON envelopes.

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;

use parley_core::relay::TurnOptions;

use crate::http::error::AppError;
use crate::http::extractors::auth::Caller;
use crate::http::handlers::conversation::parse_conversation_id;
use crate::state::AppState;

/// Request body for sending a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Route the turn to the reasoning model and relay its reasoning trace.
    #[serde(default, alias = "useReasoning")]
    pub use_reasoning: bool,
}

/// POST /api/v1/conversations/{id}/messages - Relay one turn.
pub async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let conversation_id = parse_conversation_id(&id)?;
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let options = TurnOptions {
        reasoning_enabled: request.use_reasoning,
    };
    let turn = state
        .engine
        .handle_turn(
            conversation_id,
            &caller.user_id,
            &request.content,
            options,
            state.shutdown.child_token(),
        )
        .await?;

    tracing::info!(
        conversation_id = %conversation_id,
        reasoning = options.reasoning_enabled,
        "Streaming turn"
    );

    let frames = turn.map(|item| item.map(|event| event.encode()));
    Ok(event_stream_response(Body::from_stream(frames)))
}

fn event_stream_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-transform"),
            ),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        body,
    )
        .into_response()
}
