//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! HTTP listener and the upstream completion provider.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Parley relay.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

/// Listener settings for `parley serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used when the reasoning channel is not requested.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used when the reasoning channel is requested.
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Maximum silence between two upstream deltas before the turn times out.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_chat_model() -> String {
    "deepseek-chat".to_string()
}

fn default_reasoning_model() -> String {
    "deepseek-reasoner".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            reasoning_model: default_reasoning_model(),
            api_key_env: default_api_key_env(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_tokens: None,
        }
    }
}
