//! GET /health - Component health for load balancers and operators.
//!
//! Answers 200 when every component is healthy and 503 when degraded, with
//! the per-component report in the body either way.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use switchboard_types::health::HealthReport;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub version: &'static str,
    #[serde(flatten)]
    pub report: HealthReport,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let report = state.orchestrator.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthBody {
            version: env!("CARGO_PKG_VERSION"),
            report,
        }),
    )
}
