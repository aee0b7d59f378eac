//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_types::error::{RelayError, RepositoryError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors raised before a turn starts streaming.
    Relay(RelayError),
    /// Errors from the conversation listing routes.
    Repository(RepositoryError),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        AppError::Relay(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Relay(RelayError::Unauthenticated) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or unknown API key".to_string(),
            ),
            AppError::Relay(RelayError::NotFound) | AppError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                "CONVERSATION_NOT_FOUND",
                "Conversation not found".to_string(),
            ),
            AppError::Relay(RelayError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Relay(RelayError::TurnInProgress) => (
                StatusCode::CONFLICT,
                "TURN_IN_PROGRESS",
                "A reply is already streaming on this conversation".to_string(),
            ),
            AppError::Relay(RelayError::Timeout) => {
                (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT", self.to_string())
            }
            AppError::Relay(
                e @ (RelayError::UpstreamTruncated | RelayError::Cancelled | RelayError::Upstream(_)),
            ) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", e.to_string()),
            AppError::Relay(RelayError::Persistence(e)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", e.to_string())
            }
            AppError::Repository(RepositoryError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::Repository(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", e.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Relay(e) => write!(f, "{e}"),
            AppError::Repository(e) => write!(f, "{e}"),
            AppError::Validation(msg) | AppError::Internal(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
        }
        (status, Json(ApiResponse::error(code, &message))).into_response()
    }
}
