//! HTTP/REST API layer for Parley.
//!
//! Axum-based API at `/api/v1/` with API key authentication, envelope
//! responses for JSON routes and a raw event stream for relayed turns.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
