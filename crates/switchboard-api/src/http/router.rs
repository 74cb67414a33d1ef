//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Dispatch
        .route("/tasks", post(handlers::task::submit_task))
        .route("/queue", get(handlers::task::get_queue))
        // Reporting
        .route("/quota", get(handlers::quota::get_quota))
        .route("/usage", get(handlers::quota::get_usage))
        .route("/providers", get(handlers::provider::list_providers))
        // Config
        .route("/config/reload", post(handlers::config::reload_config));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health::health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
