//! RelayEngine: runs one conversation turn end to end.
//!
//! Persists the user message, opens the upstream completion stream over the
//! full history, forwards each delta as a [`RelayEvent`] and persists the
//! assistant reply only after the source reports a clean `Done`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use parley_types::chat::{NewMessage, derive_title};
use parley_types::config::LlmConfig;
use parley_types::error::RelayError;
use parley_types::llm::{CompletionConfig, Delta, Message};

use crate::chat::repository::TurnStore;
use crate::llm::source::{CompletionSource, DeltaStream};

use super::event::RelayEvent;
use super::locks::{TurnClaim, TurnLocks};
use super::turn::{Absorbed, Turn, TurnState};

/// Stream of outbound events for one turn.
///
/// An `Err` item is always the last item and means the turn failed; the
/// transport must close abnormally rather than cleanly.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<RelayEvent, RelayError>> + Send + 'static>>;

/// Per-request options chosen by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    pub reasoning_enabled: bool,
}

/// Engine-wide settings derived from the `[llm]` config section.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub chat_model: String,
    pub reasoning_model: String,
    pub max_tokens: Option<u32>,
    /// Longest wait for the next upstream delta before the turn fails.
    pub idle_timeout: Duration,
}

impl RelaySettings {
    /// Pick the model and flags for a turn.
    pub fn completion_config(&self, options: TurnOptions) -> CompletionConfig {
        let model = if options.reasoning_enabled {
            &self.reasoning_model
        } else {
            &self.chat_model
        };
        CompletionConfig {
            model: model.clone(),
            reasoning_enabled: options.reasoning_enabled,
            max_tokens: self.max_tokens,
        }
    }
}

impl From<&LlmConfig> for RelaySettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            chat_model: config.chat_model.clone(),
            reasoning_model: config.reasoning_model.clone(),
            max_tokens: config.max_tokens,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }
}

/// Drives conversation turns against a store and a completion source.
///
/// Generic over the store so the repository trait can keep native async fns;
/// the source is dynamic so providers can be swapped at startup.
pub struct RelayEngine<S: TurnStore> {
    store: Arc<S>,
    source: Arc<dyn CompletionSource>,
    settings: RelaySettings,
    locks: TurnLocks,
}

impl<S: TurnStore + 'static> RelayEngine<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn CompletionSource>, settings: RelaySettings) -> Self {
        Self {
            store,
            source,
            settings,
            locks: TurnLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn locks(&self) -> &TurnLocks {
        &self.locks
    }

    /// Start one turn on `conversation_id` for `caller_id`.
    ///
    /// Everything up to the upstream call happens before this returns: input
    /// validation, the ownership check, the user message write and the title
    /// update. An `Err` here means nothing was streamed. If the user message
    /// was written, it stays written whatever happens to the stream.
    ///
    /// Dropping the returned stream, or cancelling `cancel`, abandons the
    /// upstream request and discards the partial reply.
    pub async fn handle_turn(
        &self,
        conversation_id: Uuid,
        caller_id: &str,
        user_text: &str,
        options: TurnOptions,
        cancel: CancellationToken,
    ) -> Result<TurnStream, RelayError> {
        if user_text.trim().is_empty() {
            return Err(RelayError::InvalidInput(
                "message content must not be empty".to_string(),
            ));
        }

        // Foreign and missing conversations are indistinguishable to the caller.
        let conversation = self
            .store
            .get_conversation(&conversation_id)
            .await?
            .filter(|c| c.is_owned_by(caller_id))
            .ok_or(RelayError::NotFound)?;

        let claim = self
            .locks
            .try_claim(conversation_id)
            .ok_or(RelayError::TurnInProgress)?;

        let mut turn = Turn::new(conversation_id, self.settings.completion_config(options));

        let title = if conversation.has_default_title() {
            derive_title(user_text)
        } else {
            None
        };
        self.store
            .append_and_touch(&conversation_id, NewMessage::user(user_text), title.as_deref())
            .await?;
        turn.advance(TurnState::UserPersisted);

        let history: Vec<Message> = self
            .store
            .list_messages(&conversation_id)
            .await?
            .into_iter()
            .map(|m| Message {
                role: m.role,
                content: m.content,
            })
            .collect();

        let span = info_span!(
            "gen_ai.relay",
            gen_ai.system = self.source.name(),
            gen_ai.request.model = %turn.config().model,
            gen_ai.request.max_tokens = ?turn.config().max_tokens,
            gen_ai.request.stream = true,
            conversation_id = %conversation_id,
            reasoning = options.reasoning_enabled,
        );

        let upstream_cancel = cancel.child_token();
        let deltas = {
            let _enter = span.enter();
            debug!(history_len = history.len(), "Opening upstream completion stream");
            self.source
                .stream(history, turn.config().clone(), upstream_cancel.clone())
        };
        turn.advance(TurnState::Streaming);

        let inner = relay_deltas(
            Arc::clone(&self.store),
            turn,
            deltas,
            upstream_cancel,
            self.settings.idle_timeout,
            claim,
        );
        Ok(Box::pin(StreamInSpan { inner, span }))
    }
}

/// Forward deltas until `Done` or the first failure, then persist on success.
fn relay_deltas<S: TurnStore + 'static>(
    store: Arc<S>,
    mut turn: Turn,
    mut deltas: DeltaStream,
    upstream_cancel: CancellationToken,
    idle_timeout: Duration,
    claim: TurnClaim,
) -> TurnStream {
    // Armed before the first poll so an unpolled stream still cancels upstream.
    let cancel_on_drop = upstream_cancel.clone().drop_guard();

    Box::pin(async_stream::stream! {
        let _claim = claim;
        let conversation_id = turn.conversation_id();

        loop {
            match next_delta(&mut deltas, &upstream_cancel, idle_timeout).await {
                Ok(delta) => match turn.absorb(delta) {
                    Absorbed::Emit(event) => yield Ok(event),
                    Absorbed::Skip => {}
                    Absorbed::Done => break,
                },
                Err(err) => {
                    turn.advance(TurnState::Failed);
                    upstream_cancel.cancel();
                    warn!(
                        conversation_id = %conversation_id,
                        answer_len = turn.answer().len(),
                        reasoning_len = turn.reasoning().len(),
                        error = %err,
                        "Turn failed mid-stream, partial reply discarded"
                    );
                    yield Err(err);
                    return;
                }
            }
        }

        // Clean finish: the source is done, nothing left to cancel.
        let _ = cancel_on_drop.disarm();
        drop(deltas);
        turn.advance(TurnState::Completed);

        let stored = match store
            .append_and_touch(&conversation_id, turn.assistant_message(), None)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to persist assistant reply after a completed stream"
                );
                yield Err(RelayError::Persistence(e));
                return;
            }
        };

        info!(
            conversation_id = %conversation_id,
            message_id = %stored.id,
            answer_len = turn.answer().len(),
            reasoning_len = turn.reasoning().len(),
            "Turn completed"
        );
    })
}

/// Await the next delta, racing cancellation and the idle timeout.
async fn next_delta(
    deltas: &mut DeltaStream,
    cancel: &CancellationToken,
    idle_timeout: Duration,
) -> Result<Delta, RelayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        next = tokio::time::timeout(idle_timeout, deltas.next()) => match next {
            Err(_) => Err(RelayError::Timeout),
            Ok(None) => Err(RelayError::UpstreamTruncated),
            Ok(Some(Ok(delta))) => Ok(delta),
            Ok(Some(Err(e))) => Err(e.into()),
        },
    }
}

/// Enters `span` around every poll of the inner stream.
struct StreamInSpan {
    inner: TurnStream,
    span: tracing::Span,
}

impl Stream for StreamInSpan {
    type Item = Result<RelayEvent, RelayError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        // Both fields are Unpin, so no pin projection is needed.
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}
