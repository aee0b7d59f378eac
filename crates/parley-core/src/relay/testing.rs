//! In-memory test doubles for the turn store and the completion source.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use parley_types::chat::{ChatMessage, Conversation, MessageRole, NewMessage};
use parley_types::error::RepositoryError;
use parley_types::llm::{CompletionConfig, Delta, LlmError, Message};

use crate::chat::repository::TurnStore;
use crate::llm::source::{CompletionSource, DeltaStream};

/// Turn store backed by plain maps.
///
/// Can be told to fail appends of one role, or the nth touch of a
/// conversation. A failed `append_and_touch` leaves nothing behind.
#[derive(Default)]
pub struct InMemoryTurnStore {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    messages: Mutex<Vec<ChatMessage>>,
    failing_role: Mutex<Option<MessageRole>>,
    touches: Mutex<usize>,
    failing_touch: Mutex<Option<usize>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh conversation owned by `owner_id`.
    pub fn seed_conversation(&self, owner_id: &str) -> Conversation {
        let conversation = Conversation::new(owner_id);
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        conversation
    }

    pub fn conversation(&self, id: &Uuid) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(id).cloned()
    }

    pub fn messages_of(&self, conversation_id: &Uuid) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect()
    }

    pub fn count_role(&self, conversation_id: &Uuid, role: MessageRole) -> usize {
        self.messages_of(conversation_id)
            .iter()
            .filter(|m| m.role == role)
            .count()
    }

    /// Make every later append of `role` fail with a query error.
    pub fn fail_appends_of(&self, role: MessageRole) {
        *self.failing_role.lock().unwrap() = Some(role);
    }

    /// Make the `nth` touch (1-based, counting every touching call) fail.
    pub fn fail_touch_call(&self, nth: usize) {
        *self.failing_touch.lock().unwrap() = Some(nth);
    }

    pub fn touch_count(&self) -> usize {
        *self.touches.lock().unwrap()
    }

    fn check_append(&self, role: MessageRole) -> Result<(), RepositoryError> {
        if *self.failing_role.lock().unwrap() == Some(role) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        Ok(())
    }

    fn check_touch(&self) -> Result<(), RepositoryError> {
        let mut touches = self.touches.lock().unwrap();
        *touches += 1;
        if *self.failing_touch.lock().unwrap() == Some(*touches) {
            return Err(RepositoryError::Query("touch failed".to_string()));
        }
        Ok(())
    }

    fn push_message(&self, conversation_id: &Uuid, message: NewMessage) -> ChatMessage {
        let stored = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: *conversation_id,
            role: message.role,
            content: message.content,
            reasoning: message.reasoning,
            model: message.model,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(stored.clone());
        stored
    }
}

fn apply_touch(conversation: &mut Conversation, title_if_unset: Option<&str>) {
    conversation.updated_at = Utc::now();
    if let Some(title) = title_if_unset {
        if conversation.has_default_title() {
            conversation.title = title.to_string();
        }
    }
}

impl TurnStore for InMemoryTurnStore {
    async fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<Conversation, RepositoryError> {
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(conversation.clone())
    }

    async fn get_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.conversation(conversation_id))
    }

    async fn list_conversations(
        &self,
        owner_id: &str,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut items: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_owned_by(owner_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(items)
    }

    async fn append_message(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
    ) -> Result<ChatMessage, RepositoryError> {
        self.check_append(message.role)?;
        if self.conversation(conversation_id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        Ok(self.push_message(conversation_id, message))
    }

    async fn append_and_touch(
        &self,
        conversation_id: &Uuid,
        message: NewMessage,
        title_if_unset: Option<&str>,
    ) -> Result<ChatMessage, RepositoryError> {
        self.check_append(message.role)?;
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        self.check_touch()?;
        apply_touch(conversation, title_if_unset);
        Ok(self.push_message(conversation_id, message))
    }

    async fn list_messages(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        Ok(self.messages_of(conversation_id))
    }

    async fn touch_conversation(
        &self,
        conversation_id: &Uuid,
        title_if_unset: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        self.check_touch()?;
        apply_touch(conversation, title_if_unset);
        Ok(())
    }
}

/// One recorded invocation of [`ScriptedSource::stream`].
#[derive(Debug, Clone)]
pub struct SourceCall {
    pub history: Vec<Message>,
    pub config: CompletionConfig,
    pub cancel: CancellationToken,
}

/// Completion source that replays a fixed script once.
///
/// A hanging source parks after its script until its cancellation token
/// fires, then reports `LlmError::Cancelled`.
pub struct ScriptedSource {
    script: Mutex<Option<Vec<Result<Delta, LlmError>>>>,
    hang_after_script: bool,
    calls: Mutex<Vec<SourceCall>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Delta, LlmError>>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            hang_after_script: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn hanging(script: Vec<Result<Delta, LlmError>>) -> Self {
        Self {
            hang_after_script: true,
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl CompletionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream(
        &self,
        history: Vec<Message>,
        config: CompletionConfig,
        cancel: CancellationToken,
    ) -> DeltaStream {
        let items = self.script.lock().unwrap().take().unwrap_or_default();
        self.calls.lock().unwrap().push(SourceCall {
            history,
            config,
            cancel: cancel.clone(),
        });
        let hang = self.hang_after_script;

        Box::pin(async_stream::stream! {
            for item in items {
                yield item;
            }
            if hang {
                cancel.cancelled().await;
                yield Err(LlmError::Cancelled);
            }
        })
    }
}
