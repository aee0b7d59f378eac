//! CompletionSource trait definition.
//!
//! This is the abstraction every upstream LLM provider implements. It has a
//! single streaming operation, so it is object-safe as written and the engine
//! holds it as `Arc<dyn CompletionSource>`.

use std::pin::Pin;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use parley_types::llm::{CompletionConfig, Delta, LlmError, Message};

/// Boxed stream of deltas returned by [`CompletionSource::stream`].
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, LlmError>> + Send + 'static>>;

/// Trait for streaming completion providers (DeepSeek, other OpenAI-compatible APIs).
///
/// Contract for implementations:
/// - the stream is lazy, finite and not restartable;
/// - it ends with exactly one `Delta::Done` or exactly one `Err`, or simply
///   stops if the upstream connection drops, which callers treat as a
///   truncated response;
/// - deltas of one channel appear in generation order;
/// - once `cancel` fires, the upstream request is abandoned and the stream
///   ends without further network reads.
pub trait CompletionSource: Send + Sync {
    /// Human-readable provider name (e.g., "deepseek").
    fn name(&self) -> &str;

    /// Start a streaming completion for `history`.
    fn stream(
        &self,
        history: Vec<Message>,
        config: CompletionConfig,
        cancel: CancellationToken,
    ) -> DeltaStream;
}
