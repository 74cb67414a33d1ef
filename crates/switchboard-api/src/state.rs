//! Application state wiring the orchestrator to its stores.
//!
//! AppState holds the concrete instances used by both CLI and REST API.
//! The orchestrator is generic over ledger and usage-log traits; AppState
//! pins it to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use switchboard_core::clock::{Clock, SystemClock};
use switchboard_core::orchestrator::Orchestrator;
use switchboard_infra::config::{build_clients, default_config_path, load_config};
use switchboard_infra::sqlite::pool::{data_dir, database_url, DatabasePool};
use switchboard_infra::sqlite::quota_ledger::SqliteQuotaLedger;
use switchboard_infra::sqlite::usage_log::SqliteUsageLog;

/// Orchestrator pinned to the SQLite ledger and usage log.
pub type ConcreteOrchestrator = Orchestrator<SqliteQuotaLedger, SqliteUsageLog>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize from the data directory: open the database, load the
    /// config (`--config` or `{data_dir}/switchboard.toml`), build clients.
    pub async fn init(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let db_url = database_url(&data_dir);
        let config_path = config_path.unwrap_or_else(default_config_path);
        Self::open(&db_url, config_path, data_dir).await
    }

    /// Wire state against an explicit database URL.
    pub async fn open(
        db_url: &str,
        config_path: PathBuf,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(db_url)
            .await
            .context("failed to open database")?;

        let config = load_config(&config_path)
            .await
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        if config.providers.is_empty() {
            tracing::warn!(path = %config_path.display(), "No providers configured");
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = SqliteQuotaLedger::new(db_pool.clone(), Arc::clone(&clock));
        let usage = SqliteUsageLog::new(db_pool);

        let clients = build_clients(&config);
        let orchestrator =
            Orchestrator::new(&config, clients, Arc::new(ledger), Arc::new(usage), clock)?;

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config_path,
            data_dir,
        })
    }
}
