//! Quota and usage reporting endpoints.
//!
//! GET /api/v1/quota - Live window and rate status per provider.
//! GET /api/v1/usage - Usage aggregates over a trailing window.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use switchboard_types::quota::ProviderQuotaStatus;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Longest lookback accepted by the usage endpoint.
const MAX_SINCE_HOURS: u32 = 24 * 366;

/// Query parameters for the usage endpoint.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Trailing window in hours.
    #[serde(default = "default_since_hours")]
    pub since_hours: u32,
}

fn default_since_hours() -> u32 {
    24
}

/// GET /api/v1/quota - Daily/monthly usage and request rate per provider.
pub async fn get_quota(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProviderQuotaStatus>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let statuses = state.orchestrator.quota_summary().await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(statuses, request_id, elapsed)
        .with_link("self", "/api/v1/quota")
        .with_link("usage", "/api/v1/usage");
    Ok(Json(resp))
}

/// GET /api/v1/usage?since_hours=24 - Executions, outcomes, tokens and
/// average latency per provider.
pub async fn get_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    if query.since_hours == 0 || query.since_hours > MAX_SINCE_HOURS {
        return Err(AppError::Validation(format!(
            "since_hours must be between 1 and {MAX_SINCE_HOURS}"
        )));
    }

    let since = chrono::Utc::now() - chrono::Duration::hours(i64::from(query.since_hours));
    let summaries = state.orchestrator.usage_summary(since).await?;

    let data = serde_json::json!({
        "since": since.to_rfc3339(),
        "providers": summaries,
    });

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(data, request_id, elapsed).with_link("self", "/api/v1/usage");
    Ok(Json(resp))
}
