use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quota::WindowKind;

/// Normalized failure kind reported by a provider client.
///
/// Clients translate vendor-specific failures (HTTP status codes, socket
/// errors) into one of these kinds; the executor's classification table
/// decides which of them are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    Connection,
    RateLimited,
    Server,
    MalformedRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidResponse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Connection => "connection",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::Server => "server",
            ProviderErrorKind::MalformedRequest => "malformed_request",
            ProviderErrorKind::Unauthorized => "unauthorized",
            ProviderErrorKind::Forbidden => "forbidden",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::InvalidResponse => "invalid_response",
        };
        f.write_str(s)
    }
}

impl FromStr for ProviderErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timeout" => Ok(ProviderErrorKind::Timeout),
            "connection" => Ok(ProviderErrorKind::Connection),
            "rate_limited" => Ok(ProviderErrorKind::RateLimited),
            "server" => Ok(ProviderErrorKind::Server),
            "malformed_request" => Ok(ProviderErrorKind::MalformedRequest),
            "unauthorized" => Ok(ProviderErrorKind::Unauthorized),
            "forbidden" => Ok(ProviderErrorKind::Forbidden),
            "not_found" => Ok(ProviderErrorKind::NotFound),
            "invalid_response" => Ok(ProviderErrorKind::InvalidResponse),
            other => Err(format!("invalid provider error kind: '{other}'")),
        }
    }
}

/// Error returned by a provider client invocation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Server-suggested wait before retrying (from `Retry-After`).
    pub retry_after_ms: Option<u64>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after_ms: Option<u64>) -> Self {
        self.retry_after_ms = retry_after_ms;
        self
    }
}

/// Errors surfaced by the orchestrator.
///
/// `QuotaExhausted`, `RateLimited` and `TransientProviderError` are handled
/// inside the dispatcher (they trigger fallback). The remaining variants are
/// terminal for a task and are returned to the caller as rejections.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("{kind} quota exhausted for provider '{provider}'")]
    QuotaExhausted { provider: String, kind: WindowKind },

    #[error("provider '{provider}' is rate limited")]
    RateLimited { provider: String },

    #[error("transient error from provider '{provider}': {error}")]
    TransientProviderError { provider: String, error: ProviderError },

    #[error("permanent error from provider '{provider}': {error}")]
    PermanentProviderError { provider: String, error: ProviderError },

    #[error("no provider configured for task type '{task_type}'")]
    NoProviderConfigured { task_type: String },

    #[error(
        "estimate of {estimated_tokens} tokens exceeds the quota limits of every provider for task type '{task_type}'"
    )]
    EstimateExceedsLimits {
        task_type: String,
        estimated_tokens: u64,
    },

    #[error("deferred queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("request cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Stable machine-readable code, used in usage events and API errors.
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::QuotaExhausted { .. } => "quota_exhausted",
            OrchestratorError::RateLimited { .. } => "rate_limited",
            OrchestratorError::TransientProviderError { .. } => "transient_provider_error",
            OrchestratorError::PermanentProviderError { .. } => "permanent_provider_error",
            OrchestratorError::NoProviderConfigured { .. } => "no_provider_configured",
            OrchestratorError::EstimateExceedsLimits { .. } => "estimate_exceeds_limits",
            OrchestratorError::QueueFull { .. } => "queue_full",
            OrchestratorError::Cancelled => "cancelled",
        }
    }

    /// Whether this error makes the dispatcher move to the next candidate.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            OrchestratorError::QuotaExhausted { .. }
                | OrchestratorError::RateLimited { .. }
                | OrchestratorError::TransientProviderError { .. }
        )
    }
}

/// Errors from quota ledger operations.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("{kind} quota exhausted for '{provider}': requested {requested}, remaining {remaining}")]
    QuotaExhausted {
        provider: String,
        kind: WindowKind,
        requested: u64,
        remaining: u64,
    },

    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Errors from repository operations (usage log, persisted state).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to watch config '{path}': {reason}")]
    Watch { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_kind_roundtrip() {
        for kind in [
            ProviderErrorKind::Timeout,
            ProviderErrorKind::Connection,
            ProviderErrorKind::RateLimited,
            ProviderErrorKind::Server,
            ProviderErrorKind::MalformedRequest,
            ProviderErrorKind::Unauthorized,
            ProviderErrorKind::Forbidden,
            ProviderErrorKind::NotFound,
            ProviderErrorKind::InvalidResponse,
        ] {
            let parsed: ProviderErrorKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_orchestrator_error_display() {
        let err = OrchestratorError::PermanentProviderError {
            provider: "groq".to_string(),
            error: ProviderError::new(ProviderErrorKind::Unauthorized, "bad key"),
        };
        let msg = err.to_string();
        assert!(msg.contains("groq"));
        assert!(msg.contains("unauthorized: bad key"));
        assert_eq!(err.code(), "permanent_provider_error");
    }

    #[test]
    fn test_triggers_fallback() {
        assert!(
            OrchestratorError::RateLimited {
                provider: "a".to_string()
            }
            .triggers_fallback()
        );
        assert!(!OrchestratorError::Cancelled.triggers_fallback());
        assert!(!OrchestratorError::QueueFull { capacity: 1 }.triggers_fallback());
    }

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::QuotaExhausted {
            provider: "a".to_string(),
            kind: WindowKind::Daily,
            requested: 150,
            remaining: 100,
        };
        assert!(err.to_string().contains("requested 150, remaining 100"));
    }
}
