//! DeepSeek completion source.
//!
//! Speaks the OpenAI-compatible chat completions protocol with `stream: true`
//! and reads the server-sent events with `reqwest-eventsource`. Works against
//! any endpoint that reports reasoning in `delta.reasoning_content`.

pub mod streaming;
pub mod types;

use parley_core::llm::source::{CompletionSource, DeltaStream};
use parley_types::llm::{CompletionConfig, LlmError, Message};
use reqwest_eventsource::EventSource;
use reqwest_eventsource::retry::Never;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::config::UpstreamSettings;

use self::streaming::map_event_source;
use self::types::ChatRequest;

/// Streaming client for `POST {base_url}/chat/completions`.
///
/// Does NOT derive Debug so the API key cannot leak through logs.
pub struct DeepSeekSource {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl DeepSeekSource {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_settings(settings: UpstreamSettings) -> Self {
        Self::new(settings.base_url, settings.api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl CompletionSource for DeepSeekSource {
    fn name(&self) -> &str {
        "deepseek"
    }

    fn stream(
        &self,
        history: Vec<Message>,
        config: CompletionConfig,
        cancel: CancellationToken,
    ) -> DeltaStream {
        let body = ChatRequest::streaming(&history, &config);
        let request = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);

        match EventSource::new(request) {
            Ok(mut source) => {
                source.set_retry_policy(Box::new(Never));
                map_event_source(source, cancel)
            }
            Err(e) => {
                let err = LlmError::InvalidRequest(e.to_string());
                Box::pin(futures_util::stream::once(async move { Err(err) }))
            }
        }
    }
}
