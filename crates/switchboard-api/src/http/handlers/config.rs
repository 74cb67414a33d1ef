//! POST /api/v1/config/reload - Re-read the config file and swap the
//! provider registry.
//!
//! An invalid file is rejected with 400 and the running config stays in
//! place.

use std::time::Instant;

use axum::extract::State;
use axum::Json;

use switchboard_infra::config::{build_clients, load_config};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub async fn reload_config(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let config = load_config(&state.config_path).await?;
    let clients = build_clients(&config);
    state.orchestrator.reload(&config, clients)?;

    let data = serde_json::json!({
        "path": state.config_path.display().to_string(),
        "providers": config.providers.len(),
    });

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(data, request_id, elapsed)
        .with_link("providers", "/api/v1/providers");
    Ok(Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    const ONE_PROVIDER: &str = r#"
[[providers]]
name = "groq"
priority = 1
[providers.budget]
daily_token_limit = 1000
monthly_token_limit = 10000
requests_per_minute_limit = 10
[providers.models]
default = "llama-3.3-70b-versatile"
"#;

    #[tokio::test]
    async fn reload_picks_up_new_providers_and_rejects_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("switchboard.toml");
        let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let state = AppState::open(&db_url, config_path.clone(), dir.path().to_path_buf())
            .await
            .unwrap();
        assert!(state.orchestrator.providers().is_empty());

        tokio::fs::write(&config_path, ONE_PROVIDER).await.unwrap();
        let Json(resp) = reload_config(State(state.clone())).await.unwrap();
        assert_eq!(resp.data.unwrap()["providers"], 1);
        assert_eq!(state.orchestrator.providers()[0].name, "groq");

        tokio::fs::write(&config_path, "[queue]\ncapacity = 0\n")
            .await
            .unwrap();
        let err = reload_config(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.orchestrator.providers().len(), 1);
    }
}
