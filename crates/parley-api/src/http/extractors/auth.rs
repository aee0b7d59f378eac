//! Caller identity from an API key.
//!
//! The key travels in `Authorization: Bearer <key>` or, failing that, in
//! `X-API-Key: <key>`. It resolves to the owning user id, which is the caller
//! identity for every conversation route. A missing, unreadable or unknown
//! key is rejected before any handler runs.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, HeaderName};
use axum::http::request::Parts;

use parley_types::error::RelayError;

use crate::http::error::AppError;
use crate::state::AppState;

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Authenticated caller. Extracting this validates the API key.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = presented_key(parts).ok_or(RelayError::Unauthenticated)?;

        let user_id = state
            .api_keys
            .resolve_caller(api_key)
            .await?
            .ok_or(RelayError::Unauthenticated)?;

        Ok(Caller { user_id })
    }
}

/// The API key the request presents, if any.
///
/// A bearer token wins over `X-API-Key`. Headers that are not visible ASCII
/// or carry an empty key count as absent.
fn presented_key(parts: &Parts) -> Option<&str> {
    let bearer = header_str(parts, &AUTHORIZATION).and_then(|v| v.strip_prefix("Bearer "));
    bearer
        .or_else(|| header_str(parts, &X_API_KEY))
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

fn header_str<'a>(parts: &'a Parts, name: &HeaderName) -> Option<&'a str> {
    parts.headers.get(name)?.to_str().ok()
}
