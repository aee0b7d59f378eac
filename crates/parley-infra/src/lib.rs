//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the SQLite
//! turn store, the API key registry, the DeepSeek completion source, and
//! configuration loading.

pub mod config;
pub mod llm;
pub mod sqlite;
