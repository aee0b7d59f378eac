//! Business logic and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (the turn store and completion source
//! traits) that the infrastructure layer implements, plus the relay engine
//! that drives one streaming conversation turn. It depends only on
//! `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod relay;
