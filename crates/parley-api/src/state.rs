//! Application state wiring the relay engine to its infrastructure.
//!
//! The engine is generic over the turn store; AppState pins it to the SQLite
//! implementation. The completion source stays dynamic so tests can swap in
//! a scripted one.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use parley_core::llm::source::CompletionSource;
use parley_core::relay::{RelayEngine, RelaySettings};
use parley_infra::config::resolve_upstream;
use parley_infra::llm::deepseek::DeepSeekSource;
use parley_infra::sqlite::api_key::SqliteApiKeyStore;
use parley_infra::sqlite::chat::SqliteTurnStore;
use parley_infra::sqlite::pool::{DatabasePool, database_url};
use parley_types::config::GlobalConfig;

pub type ConcreteRelayEngine = RelayEngine<SqliteTurnStore>;

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteRelayEngine>,
    pub api_keys: SqliteApiKeyStore,
    /// Cancelled on server shutdown; every turn runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire state from an open pool and an already-built completion source.
    pub fn new(
        db_pool: DatabasePool,
        source: Arc<dyn CompletionSource>,
        config: GlobalConfig,
    ) -> Self {
        let store = Arc::new(SqliteTurnStore::new(db_pool.clone()));
        let engine = RelayEngine::new(store, source, RelaySettings::from(&config.llm));

        Self {
            engine: Arc::new(engine),
            api_keys: SqliteApiKeyStore::new(db_pool),
            shutdown: CancellationToken::new(),
        }
    }

    /// Open the database under `data_dir` and connect the DeepSeek source.
    pub async fn init(data_dir: &Path, config: GlobalConfig) -> anyhow::Result<Self> {
        let upstream = resolve_upstream(&config.llm).with_context(|| {
            format!(
                "environment variable {} is not set; it must hold the upstream API key",
                config.llm.api_key_env
            )
        })?;
        tracing::info!(base_url = %upstream.base_url, "Using DeepSeek-compatible upstream");

        let db_pool = open_database(data_dir).await?;
        let source: Arc<dyn CompletionSource> = Arc::new(DeepSeekSource::from_settings(upstream));
        Ok(Self::new(db_pool, source, config))
    }
}

/// Create the data directory if needed and open the migrated database.
pub async fn open_database(data_dir: &Path) -> anyhow::Result<DatabasePool> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    DatabasePool::new(&database_url(data_dir))
        .await
        .context("failed to open database")
}
