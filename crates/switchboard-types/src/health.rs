//! Component health report served by `GET /health`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall service status. Any component in error degrades the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Status of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Present in config but switched off; does not degrade the service.
    Disabled,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            detail: None,
        }
    }

    pub fn healthy_with(detail: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            detail: Some(detail.into()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            status: ComponentStatus::Disabled,
            detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Error,
            detail: Some(detail.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ComponentStatus::Error
    }
}

/// Health of every orchestrator component at one instant.
///
/// `clients` is keyed by provider name and covers every configured provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub clients: BTreeMap<String, ComponentHealth>,
    pub ledger: ComponentHealth,
    pub usage_log: ComponentHealth,
    pub configuration: ComponentHealth,
}

impl HealthReport {
    /// Assemble a report, deriving the overall status from the components.
    pub fn new(
        timestamp: DateTime<Utc>,
        clients: BTreeMap<String, ComponentHealth>,
        ledger: ComponentHealth,
        usage_log: ComponentHealth,
        configuration: ComponentHealth,
    ) -> Self {
        let degraded = clients.values().any(ComponentHealth::is_error)
            || ledger.is_error()
            || usage_log.is_error()
            || configuration.is_error();
        Self {
            status: if degraded {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            },
            timestamp,
            clients,
            ledger,
            usage_log,
            configuration,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(clients: BTreeMap<String, ComponentHealth>, ledger: ComponentHealth) -> HealthReport {
        HealthReport::new(
            Utc::now(),
            clients,
            ledger,
            ComponentHealth::healthy(),
            ComponentHealth::healthy(),
        )
    }

    #[test]
    fn disabled_client_does_not_degrade() {
        let clients = BTreeMap::from([
            ("a".to_string(), ComponentHealth::healthy()),
            ("b".to_string(), ComponentHealth::disabled()),
        ]);
        assert!(report(clients, ComponentHealth::healthy()).is_healthy());
    }

    #[test]
    fn any_component_error_degrades() {
        let clients = BTreeMap::from([("a".to_string(), ComponentHealth::error("no client"))]);
        assert_eq!(
            report(clients, ComponentHealth::healthy()).status,
            HealthStatus::Degraded
        );

        let degraded = report(BTreeMap::new(), ComponentHealth::error("database is locked"));
        assert_eq!(degraded.status, HealthStatus::Degraded);
    }

    #[test]
    fn serializes_lowercase_and_omits_empty_detail() {
        let json = serde_json::to_value(report(BTreeMap::new(), ComponentHealth::healthy()))
            .expect("serialize");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["ledger"]["status"], "healthy");
        assert!(json["ledger"].get("detail").is_none());
    }
}
