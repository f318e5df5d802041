//! Application state wiring the relay together.
//!
//! AppState holds the concrete store, provider-backed chat service, room
//! registry and token verifier shared by every WebSocket connection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use parley_core::chat::{ChatStreamService, TurnSettings};
use parley_core::llm::box_provider::BoxLlmProvider;
use parley_core::relay::RoomRegistry;
use parley_infra::config::{API_KEY_ENV, api_key_from_env, load_config};
use parley_infra::llm::create_provider;
use parley_infra::sqlite::chat::SqliteChatStore;
use parley_infra::sqlite::pool::{DatabasePool, data_dir, default_database_url};
use parley_infra::sqlite::token::SqliteTokenVerifier;
use parley_types::config::ParleyConfig;

/// The orchestrator pinned to the SQLite store.
pub type ConcreteChatService = ChatStreamService<SqliteChatStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ParleyConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub store: Arc<SqliteChatStore>,
    pub chat_service: ConcreteChatService,
    pub rooms: Arc<RoomRegistry>,
    pub verifier: Arc<SqliteTokenVerifier>,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, build the provider.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let db_pool = DatabasePool::new(&default_database_url())
            .await
            .context("failed to open the database")?;

        let provider = create_provider(&config, api_key_from_env())
            .with_context(|| format!("set {API_KEY_ENV} to a Gemini API key"))?;

        tracing::info!(
            data_dir = %data_dir.display(),
            provider = provider.name(),
            model = %config.model,
            "application state initialized"
        );

        Ok(Self::from_parts(config, data_dir, db_pool, provider))
    }

    /// Wire the state from already-built parts.
    pub fn from_parts(
        config: ParleyConfig,
        data_dir: PathBuf,
        db_pool: DatabasePool,
        provider: BoxLlmProvider,
    ) -> Self {
        let store = Arc::new(SqliteChatStore::new(db_pool.clone()));
        let chat_service = ChatStreamService::new(
            Arc::clone(&store),
            Arc::new(provider),
            TurnSettings::from_config(&config),
        );

        Self {
            config: Arc::new(config),
            data_dir,
            store,
            chat_service,
            rooms: Arc::new(RoomRegistry::new()),
            verifier: Arc::new(SqliteTokenVerifier::new(db_pool.clone())),
            db_pool,
        }
    }

    /// Timeout for the ownership lookup made when joining a room.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.config.join_timeout_ms)
    }
}
