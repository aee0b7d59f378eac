//! Conversation and message types for Parley.
//!
//! A conversation belongs to exactly one caller; its messages are replayed in
//! insertion order to rebuild the prompt history for the next turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

/// Title given to a conversation before its first user message arrives.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";

/// Number of characters of the first user message used as the title.
pub const TITLE_MAX_CHARS: usize = 20;

/// A conversation owned by a single caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Opaque caller identity of the owner.
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a fresh conversation with the default title.
    pub fn new(owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            owner_id: owner_id.into(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `caller_id` may see this conversation.
    pub fn is_owned_by(&self, caller_id: &str) -> bool {
        self.owner_id == caller_id
    }

    /// Whether the title is still the placeholder set at creation.
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }
}

/// A persisted message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Reasoning trace (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Model that produced this message (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a message to append; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub reasoning: Option<String>,
    pub model: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            reasoning: None,
            model: None,
        }
    }

    /// An assistant reply. An empty reasoning trace is stored as absent.
    pub fn assistant(content: impl Into<String>, reasoning: String, model: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            model: Some(model.into()),
        }
    }
}

/// Derive a conversation title from the first user message.
///
/// Takes the first [`TITLE_MAX_CHARS`] characters (not bytes) of the trimmed
/// text. Returns `None` when nothing printable remains.
pub fn derive_title(user_text: &str) -> Option<String> {
    let title: String = user_text.trim().chars().take(TITLE_MAX_CHARS).collect();
    let title = title.trim_end().to_string();
    (!title.is_empty()).then_some(title)
}
