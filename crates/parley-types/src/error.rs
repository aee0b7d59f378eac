use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the relay for one conversation turn.
///
/// `Unauthenticated`, `NotFound`, `InvalidInput` and `TurnInProgress` are
/// raised before anything is written. The streaming variants are raised after
/// the user message has been committed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("conversation not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("another turn is already streaming on this conversation")]
    TurnInProgress,

    #[error("upstream stream ended without a completion marker")]
    UpstreamTruncated,

    #[error("upstream timed out")]
    Timeout,

    #[error("turn cancelled")]
    Cancelled,

    #[error("upstream error: {0}")]
    Upstream(LlmError),

    #[error("persistence error: {0}")]
    Persistence(RepositoryError),
}

impl From<LlmError> for RelayError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout => RelayError::Timeout,
            LlmError::Cancelled => RelayError::Cancelled,
            other => RelayError::Upstream(other),
        }
    }
}

impl From<RepositoryError> for RelayError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => RelayError::NotFound,
            other => RelayError::Persistence(other),
        }
    }
}
