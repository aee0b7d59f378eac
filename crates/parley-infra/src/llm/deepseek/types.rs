//! Wire types for the OpenAI-compatible chat completions API.

use parley_types::llm::{CompletionConfig, Message, MessageRole};
use serde::{Deserialize, Serialize};

/// Request body for `POST /chat/completions` with streaming enabled.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: MessageRole,
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    pub fn streaming(history: &'a [Message], config: &'a CompletionConfig) -> Self {
        Self {
            model: &config.model,
            messages: history
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                })
                .collect(),
            stream: true,
            max_tokens: config.max_tokens,
        }
    }
}

/// One `data:` payload of the response stream.
#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning trace; only sent by reasoning models.
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}
