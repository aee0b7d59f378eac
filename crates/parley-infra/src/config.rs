//! Configuration loading for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed. Credentials never live in the file; they are
//! read from the environment.

use std::path::{Path, PathBuf};

use parley_types::config::{GlobalConfig, LlmConfig};
use secrecy::SecretString;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// Environment variable overriding `llm.base_url`.
pub const BASE_URL_ENV: &str = "DEEPSEEK_BASE_URL";

/// Resolve the data directory.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
/// 3. `.parley` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    PathBuf::from(".parley")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

/// Upstream credentials and endpoint after applying environment overrides.
#[derive(Debug)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub api_key: SecretString,
}

/// Resolve the upstream endpoint and key.
///
/// Returns `None` when the variable named by `llm.api_key_env` is unset or
/// blank.
pub fn resolve_upstream(llm: &LlmConfig) -> Option<UpstreamSettings> {
    resolve_upstream_with(llm, |name| std::env::var(name).ok())
}

fn resolve_upstream_with(
    llm: &LlmConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Option<UpstreamSettings> {
    let api_key = env(&llm.api_key_env).filter(|k| !k.trim().is_empty())?;
    let base_url = env(BASE_URL_ENV)
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| llm.base_url.clone());

    Some(UpstreamSettings {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key: SecretString::from(api_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.llm.chat_model, "deepseek-chat");
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 8080

[llm]
reasoning_model = "custom-reasoner"
idle_timeout_secs = 15
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.reasoning_model, "custom-reasoner");
        assert_eq!(config.llm.idle_timeout_secs, 15);
        assert_eq!(config.llm.chat_model, "deepseek-chat");
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.server.port, 3000);
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn resolve_upstream_requires_api_key() {
        let llm = LlmConfig::default();
        assert!(resolve_upstream_with(&llm, env_of(&[])).is_none());
        assert!(resolve_upstream_with(&llm, env_of(&[("DEEPSEEK_API_KEY", "  ")])).is_none());
    }

    #[test]
    fn resolve_upstream_uses_configured_base_url() {
        let llm = LlmConfig::default();
        let upstream =
            resolve_upstream_with(&llm, env_of(&[("DEEPSEEK_API_KEY", "sk-test")])).unwrap();
        assert_eq!(upstream.base_url, "https://api.deepseek.com");
        assert_eq!(upstream.api_key.expose_secret(), "sk-test");
    }

    #[test]
    fn resolve_upstream_env_overrides_base_url() {
        let llm = LlmConfig {
            api_key_env: "MY_KEY".to_string(),
            ..LlmConfig::default()
        };
        let upstream = resolve_upstream_with(
            &llm,
            env_of(&[("MY_KEY", "sk-x"), (BASE_URL_ENV, "http://localhost:9000/v1/")]),
        )
        .unwrap();
        assert_eq!(upstream.base_url, "http://localhost:9000/v1");
    }
}
