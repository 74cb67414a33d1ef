//! GET /api/v1/providers - Configured providers in priority order.

use std::time::Instant;

use axum::extract::State;
use axum::Json;

use switchboard_types::provider::ProviderSpec;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProviderSpec>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let providers = state.orchestrator.providers();

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(providers, request_id, elapsed)
        .with_link("self", "/api/v1/providers")
        .with_link("quota", "/api/v1/quota");
    Ok(Json(resp))
}
