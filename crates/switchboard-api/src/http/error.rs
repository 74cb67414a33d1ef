//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use switchboard_types::error::{ConfigError, LedgerError, OrchestratorError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// The orchestrator rejected the task.
    Rejected(OrchestratorError),
    /// Config reload failed; the previous config is still active.
    Config(ConfigError),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Rejected(e)
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl AppError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, String) {
        match self {
            AppError::Rejected(e) => {
                let status = match e {
                    OrchestratorError::NoProviderConfigured { .. }
                    | OrchestratorError::EstimateExceedsLimits { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    OrchestratorError::PermanentProviderError { .. } => StatusCode::BAD_GATEWAY,
                    OrchestratorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    OrchestratorError::QueueFull { .. }
                    | OrchestratorError::QuotaExhausted { .. }
                    | OrchestratorError::TransientProviderError { .. }
                    | OrchestratorError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.code().to_uppercase())
            }
            AppError::Config(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIG".to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
            ),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Rejected(e) => e.to_string(),
            AppError::Config(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.message();

        if status.is_server_error() {
            tracing::warn!(code = %code, error = %message, "Request failed");
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
