//! Provider descriptions.
//!
//! A `ProviderSpec` is the static description of one external language-model
//! vendor endpoint: where it sits in the fallback order, which task types it
//! serves (and with which model), and the budgets it must stay within.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::quota::WindowKind;
use crate::task::TaskType;

/// Token and request budgets for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBudget {
    pub daily_token_limit: u64,
    pub monthly_token_limit: u64,
    pub requests_per_minute_limit: u32,
}

impl ProviderBudget {
    /// Token limit for the given window kind.
    pub fn limit_for(&self, kind: WindowKind) -> u64 {
        match kind {
            WindowKind::Daily => self.daily_token_limit,
            WindowKind::Monthly => self.monthly_token_limit,
        }
    }
}

/// Configuration for a single provider in the fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Unique provider name (e.g., "groq", "cerebras").
    pub name: String,
    /// Priority for fallback ordering; lower = preferred.
    pub priority: u32,
    /// Disabled providers are never offered as candidates.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Model name to use for each supported task type.
    #[serde(default)]
    pub models: BTreeMap<TaskType, String>,
    pub budget: ProviderBudget,
    /// Base URL for OpenAI-compatible clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderSpec {
    /// Whether this provider declares a model for `task_type`.
    pub fn supports(&self, task_type: &TaskType) -> bool {
        self.models.contains_key(task_type)
    }

    /// Model name serving `task_type`, if supported.
    pub fn model_for(&self, task_type: &TaskType) -> Option<&str> {
        self.models.get(task_type).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ProviderSpec {
        let mut models = BTreeMap::new();
        models.insert(TaskType::Default, "llama-3.3-70b".to_string());
        ProviderSpec {
            name: "groq".to_string(),
            priority: 1,
            enabled: true,
            models,
            budget: ProviderBudget {
                daily_token_limit: 100,
                monthly_token_limit: 1000,
                requests_per_minute_limit: 3,
            },
            base_url: None,
            api_key_env: None,
        }
    }

    #[test]
    fn test_supports_and_model_for() {
        let s = spec();
        assert!(s.supports(&TaskType::Default));
        assert!(!s.supports(&TaskType::Embedding));
        assert_eq!(s.model_for(&TaskType::Default), Some("llama-3.3-70b"));
        assert_eq!(s.model_for(&TaskType::Synthesis), None);
    }

    #[test]
    fn test_limit_for_window_kind() {
        let s = spec();
        assert_eq!(s.budget.limit_for(WindowKind::Daily), 100);
        assert_eq!(s.budget.limit_for(WindowKind::Monthly), 1000);
    }

    #[test]
    fn test_spec_toml_with_defaults() {
        let toml_str = r#"
name = "cerebras"
priority = 2

[budget]
daily_token_limit = 14400
monthly_token_limit = 400000
requests_per_minute_limit = 30

[models]
default = "llama-3.3-70b"
synthesis = "llama-3.3-70b"
"#;
        let parsed: ProviderSpec = toml::from_str(toml_str).unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.model_for(&TaskType::Synthesis), Some("llama-3.3-70b"));
        assert!(parsed.base_url.is_none());
    }
}
