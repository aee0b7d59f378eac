//! TurnStore trait definition.
//!
//! Provides the conversation and message operations the relay engine and the
//! conversation routes need. Uses native async fn in traits (RPITIT, Rust
//! 2024 edition).

use parley_types::chat::{ChatMessage, Conversation, NewMessage};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for conversation and message persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteTurnStore`).
/// Each method is one independent read or write. `append_and_touch` is the
/// only combined write and commits both of its effects or neither.
pub trait TurnStore: Send + Sync {
    /// Create a new conversation.
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Get a conversation by its unique ID, regardless of owner.
    fn get_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// List an owner's conversations, most recently updated first.
    fn list_conversations(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Append a message to a conversation.
    ///
    /// Returns `RepositoryError::NotFound` if the conversation does not exist.
    fn append_message(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// Append a message and touch the conversation as one atomic write.
    ///
    /// On error neither the message nor the touch is visible afterwards.
    fn append_and_touch(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
        title_if_unset: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// List a conversation's messages in insertion order.
    fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Advance the conversation's updated timestamp.
    ///
    /// When `title_if_unset` is given, it replaces the title only while the
    /// title is still the default one.
    fn touch_conversation(
        &self,
        conversation_id: &Uuid,
        title_if_unset: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
