//! SSE event stream to [`Delta`] adapter.
//!
//! Each `data:` payload is one [`ChatChunk`]. `reasoning_content` becomes
//! [`Delta::Reasoning`], `content` becomes [`Delta::Answer`] and the `[DONE]`
//! sentinel becomes [`Delta::Done`]. A connection that closes after a
//! `finish_reason` but without the sentinel still counts as done; one that
//! closes earlier ends the stream with no `Done` at all.

use futures_util::StreamExt;
use parley_core::llm::source::DeltaStream;
use parley_types::llm::{Delta, LlmError};
use reqwest_eventsource::{Event, EventSource};
use tokio_util::sync::CancellationToken;

use super::types::{ChatChunk, ErrorBody};

const DONE_SENTINEL: &str = "[DONE]";

/// Deltas carried by one SSE payload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedChunk {
    pub deltas: Vec<Delta>,
    /// The provider reported a finish reason.
    pub finished: bool,
}

/// Parse one `data:` payload.
pub fn parse_chunk(data: &str) -> Result<ParsedChunk, LlmError> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(ParsedChunk {
            deltas: vec![Delta::Done],
            finished: true,
        });
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("stream chunk: {e}")))?;

    let mut parsed = ParsedChunk::default();
    // Only the first choice is requested.
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.reasoning_content.filter(|t| !t.is_empty()) {
            parsed.deltas.push(Delta::Reasoning(text));
        }
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            parsed.deltas.push(Delta::Answer(text));
        }
        parsed.finished = choice.finish_reason.is_some();
    }
    Ok(parsed)
}

/// Map an HTTP error status and body to an [`LlmError`].
pub fn status_error(status: u16, retry_after_secs: Option<u64>, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after_secs.map(|s| s * 1000),
        },
        400 | 422 => LlmError::InvalidRequest(message),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

async fn map_transport_error(err: reqwest_eventsource::Error) -> LlmError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            status_error(status.as_u16(), retry_after, &body)
        }
        reqwest_eventsource::Error::InvalidContentType(content_type, _) => LlmError::Provider {
            message: format!("unexpected content type: {content_type:?}"),
        },
        other => LlmError::Stream(other.to_string()),
    }
}

/// Drive `source` until `[DONE]`, the first error, or cancellation.
///
/// The event source is closed on every exit path so it never reconnects.
pub fn map_event_source(mut source: EventSource, cancel: CancellationToken) -> DeltaStream {
    Box::pin(async_stream::stream! {
        let mut finished = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = source.next() => Some(event),
            };
            let Some(event) = next else {
                source.close();
                yield Err(LlmError::Cancelled);
                return;
            };

            match event {
                Some(Ok(Event::Open)) => {
                    tracing::debug!("Upstream event stream opened");
                }
                Some(Ok(Event::Message(message))) => match parse_chunk(&message.data) {
                    Ok(parsed) => {
                        let done = parsed.deltas.last() == Some(&Delta::Done);
                        finished |= parsed.finished;
                        for delta in parsed.deltas {
                            yield Ok(delta);
                        }
                        if done {
                            source.close();
                            return;
                        }
                    }
                    Err(e) => {
                        source.close();
                        yield Err(e);
                        return;
                    }
                },
                Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                    source.close();
                    if finished {
                        yield Ok(Delta::Done);
                    } else {
                        tracing::warn!("Upstream closed the stream before completion");
                    }
                    return;
                }
                Some(Err(e)) => {
                    source.close();
                    yield Err(map_transport_error(e).await);
                    return;
                }
            }
        }
    })
}
