//! Conversation and message persistence abstractions for Parley.
//!
//! This module defines the `TurnStore` trait that the infrastructure
//! layer implements for conversation and message CRUD.

pub mod repository;
