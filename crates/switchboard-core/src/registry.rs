//! Provider registry: the ordered set of configured providers.
//!
//! The registry is immutable once built. Config reload builds a new one and
//! the orchestrator swaps it in as a whole.

use switchboard_types::config::OrchestratorConfig;
use switchboard_types::error::OrchestratorError;
use switchboard_types::provider::ProviderSpec;
use switchboard_types::task::TaskType;

/// Providers sorted by ascending priority.
///
/// Sorting is stable, so providers sharing a priority keep the order in which
/// they were configured.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl ProviderRegistry {
    pub fn new(mut providers: Vec<ProviderSpec>) -> Self {
        providers.sort_by_key(|p| p.priority);
        Self { providers }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.providers.clone())
    }

    /// Ordered fallback chain for `task_type`.
    ///
    /// Only enabled providers that declare a model for the task type are
    /// returned. An empty chain is a configuration error and is fatal for
    /// the request.
    pub fn candidates(&self, task_type: &TaskType) -> Result<Vec<&ProviderSpec>, OrchestratorError> {
        let chain: Vec<&ProviderSpec> = self
            .providers
            .iter()
            .filter(|p| p.enabled && p.supports(task_type))
            .collect();

        if chain.is_empty() {
            return Err(OrchestratorError::NoProviderConfigured {
                task_type: task_type.to_string(),
            });
        }
        Ok(chain)
    }

    pub fn get(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// All providers in priority order, including disabled ones.
    pub fn providers(&self) -> &[ProviderSpec] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
