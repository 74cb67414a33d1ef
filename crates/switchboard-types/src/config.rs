//! Orchestrator configuration types.
//!
//! `OrchestratorConfig` mirrors `switchboard.toml`. All sections except
//! `providers` have defaults, so a minimal file only lists providers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::provider::ProviderSpec;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

/// Timeout and retry settings for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt, for transient failures only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Deferred queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    /// Fallback sweep period when no release or rollover wakes the sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl OrchestratorConfig {
    /// Check structural rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            let name = provider.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("provider name must not be empty".into()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{name}'"
                )));
            }
            if provider.models.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' declares no models"
                )));
            }
            let budget = &provider.budget;
            if budget.daily_token_limit == 0
                || budget.monthly_token_limit == 0
                || budget.requests_per_minute_limit == 0
            {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' has a zero budget limit"
                )));
            }
        }

        if self.executor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("executor.timeout_ms must be > 0".into()));
        }
        if self.executor.max_backoff_ms < self.executor.base_backoff_ms {
            return Err(ConfigError::Invalid(
                "executor.max_backoff_ms must be >= executor.base_backoff_ms".into(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be > 0".into()));
        }
        if self.queue.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "queue.sweep_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[executor]
timeout_ms = 5000

[[providers]]
name = "groq"
priority = 1
[providers.budget]
daily_token_limit = 100
monthly_token_limit = 1000
requests_per_minute_limit = 3
[providers.models]
default = "llama"

[[providers]]
name = "cerebras"
priority = 2
[providers.budget]
daily_token_limit = 1000
monthly_token_limit = 10000
requests_per_minute_limit = 30
[providers.models]
default = "llama"
"#;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.executor.timeout_ms, 30_000);
        assert_eq!(config.executor.max_retries, 2);
        assert_eq!(config.queue.capacity, 1024);
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.executor.timeout_ms, 5000);
        // Unset fields fall back to defaults
        assert_eq!(config.executor.base_backoff_ms, 250);
        assert_eq!(config.providers.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        config.providers[1].name = "groq".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate provider name"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config: OrchestratorConfig = toml::from_str(SAMPLE).unwrap();
        config.providers[0].budget.requests_per_minute_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds_checked() {
        let mut config = OrchestratorConfig::default();
        config.executor.base_backoff_ms = 10_000;
        config.executor.max_backoff_ms = 100;
        assert!(config.validate().is_err());
    }
}
