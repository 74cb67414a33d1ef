//! Configuration file loading and hot reload.
//!
//! Reads `switchboard.toml` (from `--config` or the data directory) into
//! [`OrchestratorConfig`]. A missing file yields defaults; a file that exists
//! but fails to parse or validate is an error, so a typo never silently
//! replaces a working provider list.
//!
//! [`watch_config`] debounces changes to the file and emits each new valid
//! config on a channel. Invalid edits are logged and skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;

use switchboard_core::client::box_client::BoxProviderClient;
use switchboard_core::client::registry::ClientRegistry;
use switchboard_types::config::OrchestratorConfig;
use switchboard_types::error::ConfigError;

use crate::client::openai_compat::OpenAiCompatClient;
use crate::sqlite::pool::data_dir;

/// File name looked up in the data directory.
pub const CONFIG_FILE_NAME: &str = "switchboard.toml";

/// `{data_dir}/switchboard.toml`.
pub fn default_config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}

/// Load and validate configuration from `path`.
///
/// - If the file does not exist, returns [`OrchestratorConfig::default()`].
/// - If it cannot be read, parsed or validated, returns a [`ConfigError`].
pub async fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return Ok(OrchestratorConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };

    let config: OrchestratorConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;

    tracing::debug!(
        path = %path.display(),
        providers = config.providers.len(),
        "Loaded config"
    );
    Ok(config)
}

/// Build one client per enabled provider.
///
/// Providers whose client cannot be constructed are skipped with a warning;
/// the orchestrator then skips them during dispatch.
pub fn build_clients(config: &OrchestratorConfig) -> ClientRegistry {
    let mut clients = ClientRegistry::new();
    for spec in config.providers.iter().filter(|p| p.enabled) {
        match OpenAiCompatClient::from_spec(spec) {
            Ok(client) => clients.register(BoxProviderClient::new(client)),
            Err(e) => {
                tracing::warn!(provider = %spec.name, error = %e, "Failed to build provider client");
            }
        }
    }
    clients
}

// ---------------------------------------------------------------------------
// File watcher
// ---------------------------------------------------------------------------

/// RAII handle for a config watcher. Dropping it stops the watch.
pub struct ConfigWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watch `path` and emit every successfully loaded config after a change.
///
/// The parent directory is watched rather than the file, so editors that
/// save by rename and files created after startup are both picked up. Must
/// be called from within a Tokio runtime.
pub fn watch_config(
    path: &Path,
    debounce: Duration,
) -> Result<(ConfigWatcher, mpsc::Receiver<OrchestratorConfig>), ConfigError> {
    let watch_error = |reason: String| ConfigError::Watch {
        path: path.display().to_string(),
        reason,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .ok_or_else(|| watch_error("path has no file name".to_string()))?
        .to_os_string();

    // Capacity 1: bursts of change signals collapse into one reload.
    let (changed_tx, mut changed_rx) = mpsc::channel::<()>(1);
    let (config_tx, config_rx) = mpsc::channel::<OrchestratorConfig>(4);

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            if events
                .iter()
                .any(|e| e.path.file_name() == Some(file_name.as_os_str()))
            {
                let _ = changed_tx.try_send(());
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "config watcher error");
        }
    })
    .map_err(|e| watch_error(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| watch_error(e.to_string()))?;

    let config_path = path.to_path_buf();
    tokio::spawn(async move {
        while changed_rx.recv().await.is_some() {
            match load_config(&config_path).await {
                Ok(config) => {
                    tracing::info!(path = %config_path.display(), "Config file changed");
                    if config_tx.send(config).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        path = %config_path.display(),
                        error = %e,
                        "Ignoring invalid config change; keeping current config"
                    );
                }
            }
        }
    });

    tracing::info!(path = %path.display(), "config watcher started");

    Ok((
        ConfigWatcher {
            _debouncer: debouncer,
            path: path.to_path_buf(),
        },
        config_rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
[executor]
timeout_ms = 5000

[queue]
capacity = 8

[[providers]]
name = "groq"
priority = 1
base_url = "https://api.groq.com/openai/v1"
[providers.budget]
daily_token_limit = 500000
monthly_token_limit = 10000000
requests_per_minute_limit = 30
[providers.models]
default = "llama-3.3-70b-versatile"

[[providers]]
name = "gemini"
priority = 2
enabled = false
[providers.budget]
daily_token_limit = 1000000
monthly_token_limit = 30000000
requests_per_minute_limit = 15
[providers.models]
default = "gemini-2.0-flash"
"#;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE_NAME)).await.unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.executor.timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, VALID).await.unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].name, "groq");
        assert_eq!(config.executor.timeout_ms, 5000);
        assert_eq!(config.executor.max_retries, 2);
        assert_eq!(config.queue.capacity, 8);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn load_config_failing_validation_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "[queue]\ncapacity = 0\n").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn build_clients_skips_disabled_providers() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, VALID).await.unwrap();
        let config = load_config(&path).await.unwrap();

        let clients = build_clients(&config);
        assert_eq!(clients.list_names(), vec!["groq"]);
    }

    #[tokio::test]
    async fn watcher_emits_valid_changes_and_skips_invalid_ones() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, VALID).await.unwrap();

        let (_watcher, mut rx) = watch_config(&path, Duration::from_millis(50)).unwrap();

        tokio::fs::write(&path, "[queue]\ncapacity = 0\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(rx.try_recv().is_err(), "invalid config must not be emitted");

        let updated = VALID.replace("timeout_ms = 5000", "timeout_ms = 7000");
        tokio::fs::write(&path, updated).await.unwrap();

        let config = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should emit within 5s")
            .expect("channel open");
        assert_eq!(config.executor.timeout_ms, 7000);
    }
}
