//! Per-turn state: lifecycle phase and channel accumulators.
//!
//! A `Turn` lives for exactly one relay invocation. It folds each upstream
//! delta into the matching accumulator and hands back the outbound event for
//! the same delta, so what goes on the wire and what gets persisted come from
//! one iteration of the delta stream.

use std::fmt;

use parley_types::chat::NewMessage;
use parley_types::llm::{CompletionConfig, Delta};
use tracing::debug;
use uuid::Uuid;

use super::event::RelayEvent;

/// Lifecycle of one turn.
///
/// `Idle -> UserPersisted -> Streaming -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    UserPersisted,
    Streaming,
    Completed,
    Failed,
}

impl TurnState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: TurnState) -> bool {
        matches!(
            (self, next),
            (TurnState::Idle, TurnState::UserPersisted)
                | (TurnState::UserPersisted, TurnState::Streaming)
                | (TurnState::Streaming, TurnState::Completed)
                | (TurnState::Streaming, TurnState::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Completed | TurnState::Failed)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::UserPersisted => write!(f, "user_persisted"),
            TurnState::Streaming => write!(f, "streaming"),
            TurnState::Completed => write!(f, "completed"),
            TurnState::Failed => write!(f, "failed"),
        }
    }
}

/// What the engine should do with one absorbed delta.
#[derive(Debug, PartialEq, Eq)]
pub enum Absorbed {
    /// Forward this event to the caller.
    Emit(RelayEvent),
    /// Nothing to forward (empty fragment or disabled channel).
    Skip,
    /// The source signalled completion.
    Done,
}

/// One user message plus the assistant reply it causes.
#[derive(Debug)]
pub struct Turn {
    conversation_id: Uuid,
    config: CompletionConfig,
    state: TurnState,
    answer: String,
    reasoning: String,
}

impl Turn {
    pub fn new(conversation_id: Uuid, config: CompletionConfig) -> Self {
        Self {
            conversation_id,
            config,
            state: TurnState::Idle,
            answer: String::new(),
            reasoning: String::new(),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Accumulated answer text so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Accumulated reasoning text so far.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Move to `next`. Returns `false` and leaves the state untouched when the
    /// transition is not allowed.
    pub fn advance(&mut self, next: TurnState) -> bool {
        if !self.state.can_advance_to(next) {
            debug!(
                conversation_id = %self.conversation_id,
                from = %self.state,
                to = %next,
                "Rejected illegal turn transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Fold one delta into the accumulators.
    pub fn absorb(&mut self, delta: Delta) -> Absorbed {
        match delta {
            Delta::Answer(text) => {
                if text.is_empty() {
                    return Absorbed::Skip;
                }
                self.answer.push_str(&text);
                Absorbed::Emit(RelayEvent::Content(text))
            }
            Delta::Reasoning(text) => {
                if !self.config.reasoning_enabled {
                    debug!(
                        conversation_id = %self.conversation_id,
                        len = text.len(),
                        "Ignoring reasoning delta on a turn without reasoning"
                    );
                    return Absorbed::Skip;
                }
                if text.is_empty() {
                    return Absorbed::Skip;
                }
                self.reasoning.push_str(&text);
                Absorbed::Emit(RelayEvent::Reasoning(text))
            }
            Delta::Done => Absorbed::Done,
        }
    }

    /// Build the assistant message for a completed turn.
    pub fn assistant_message(&self) -> NewMessage {
        NewMessage::assistant(
            self.answer.clone(),
            self.reasoning.clone(),
            self.config.model.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(reasoning_enabled: bool) -> CompletionConfig {
        CompletionConfig {
            model: if reasoning_enabled {
                "deepseek-reasoner".to_string()
            } else {
                "deepseek-chat".to_string()
            },
            reasoning_enabled,
            max_tokens: None,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut turn = Turn::new(Uuid::now_v7(), config(false));
        assert_eq!(turn.state(), TurnState::Idle);
        assert!(turn.advance(TurnState::UserPersisted));
        assert!(turn.advance(TurnState::Streaming));
        assert!(turn.advance(TurnState::Completed));
        assert!(turn.state().is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut turn = Turn::new(Uuid::now_v7(), config(false));
        assert!(!turn.advance(TurnState::Streaming));
        assert!(!turn.advance(TurnState::Failed));
        assert_eq!(turn.state(), TurnState::Idle);

        turn.advance(TurnState::UserPersisted);
        turn.advance(TurnState::Streaming);
        turn.advance(TurnState::Failed);
        assert!(!turn.advance(TurnState::Completed));
        assert!(!turn.advance(TurnState::Streaming));
        assert_eq!(turn.state(), TurnState::Failed);
    }

    #[test]
    fn test_absorb_accumulates_in_order() {
        let mut turn = Turn::new(Uuid::now_v7(), config(true));
        assert_eq!(
            turn.absorb(Delta::Reasoning("think".into())),
            Absorbed::Emit(RelayEvent::Reasoning("think".into()))
        );
        assert_eq!(
            turn.absorb(Delta::Answer("hi".into())),
            Absorbed::Emit(RelayEvent::Content("hi".into()))
        );
        turn.absorb(Delta::Reasoning("ing".into()));
        turn.absorb(Delta::Answer(" there".into()));
        assert_eq!(turn.answer(), "hi there");
        assert_eq!(turn.reasoning(), "thinking");
        assert_eq!(turn.absorb(Delta::Done), Absorbed::Done);
    }

    #[test]
    fn test_absorb_skips_empty_fragments() {
        let mut turn = Turn::new(Uuid::now_v7(), config(true));
        assert_eq!(turn.absorb(Delta::Answer(String::new())), Absorbed::Skip);
        assert_eq!(turn.absorb(Delta::Reasoning(String::new())), Absorbed::Skip);
        assert!(turn.answer().is_empty());
    }

    #[test]
    fn test_reasoning_ignored_when_disabled() {
        let mut turn = Turn::new(Uuid::now_v7(), config(false));
        assert_eq!(turn.absorb(Delta::Reasoning("hidden".into())), Absorbed::Skip);
        assert!(turn.reasoning().is_empty());

        let msg = turn.assistant_message();
        assert!(msg.reasoning.is_none());
        assert_eq!(msg.model.as_deref(), Some("deepseek-chat"));
    }
}
