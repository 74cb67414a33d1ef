//! Task submission and deferred-queue endpoints.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::field::{display, Empty};
use tracing::Instrument;

use switchboard_observe::attrs;
use switchboard_types::dispatch::SubmitOutcome;
use switchboard_types::task::{RequestTask, TaskType};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for submitting a task.
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    /// Task type name; defaults to "default".
    #[serde(default)]
    pub task_type: Option<String>,
    pub estimated_tokens: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// POST /api/v1/tasks - Submit a task for dispatch.
///
/// 200 with the provider result when dispatched, 202 with the queue
/// position when deferred, an error envelope when rejected. If the client
/// disconnects mid-call, the dropped request releases its reservations.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let task_type: TaskType = body
        .task_type
        .as_deref()
        .unwrap_or("default")
        .parse()
        .map_err(AppError::Validation)?;
    let task = RequestTask::new(task_type, body.estimated_tokens, body.payload);

    let span = tracing::info_span!(
        "http.submit_task",
        request_id = %request_id,
        switchboard.task.id = Empty,
        switchboard.task_type = Empty,
        switchboard.task.estimated_tokens = Empty,
        switchboard.provider = Empty,
        switchboard.model = Empty,
        switchboard.tokens_consumed = Empty,
        switchboard.fallback_depth = Empty,
        switchboard.outcome = Empty,
        switchboard.error.code = Empty,
    );
    span.record(attrs::TASK_ID, display(task.id));
    span.record(attrs::TASK_TYPE, display(&task.task_type));
    span.record(attrs::TASK_ESTIMATED_TOKENS, task.estimated_tokens);

    let outcome = state
        .orchestrator
        .submit(task)
        .instrument(span.clone())
        .await;
    span.record(attrs::OUTCOME, outcome.status());

    match outcome {
        SubmitOutcome::Dispatched(result) => {
            span.record(attrs::PROVIDER, result.provider.as_str());
            span.record(attrs::MODEL, result.model.as_str());
            span.record(attrs::TOKENS_CONSUMED, result.tokens_consumed);
            span.record(attrs::FALLBACK_DEPTH, result.fallback_from.len() as u64);

            let data = serde_json::to_value(&result)
                .map_err(|e| AppError::Internal(format!("failed to serialize result: {e}")))?;
            let elapsed = start.elapsed().as_millis() as u64;
            let resp = ApiResponse::success(data, request_id, elapsed)
                .with_link("quota", "/api/v1/quota");
            Ok((StatusCode::OK, Json(resp)))
        }
        SubmitOutcome::Deferred {
            task_id,
            queue_position,
        } => {
            let data = serde_json::json!({
                "status": "deferred",
                "task_id": task_id,
                "queue_position": queue_position,
            });
            let elapsed = start.elapsed().as_millis() as u64;
            let resp = ApiResponse::success(data, request_id, elapsed)
                .with_link("queue", "/api/v1/queue");
            Ok((StatusCode::ACCEPTED, Json(resp)))
        }
        SubmitOutcome::Rejected(error) => {
            span.record(attrs::ERROR_CODE, error.code());
            Err(AppError::Rejected(error))
        }
    }
}

/// GET /api/v1/queue - Deferred tasks awaiting capacity, oldest first.
pub async fn get_queue(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let tasks: Vec<serde_json::Value> = state
        .orchestrator
        .pending_tasks()
        .iter()
        .enumerate()
        .map(|(i, task)| {
            serde_json::json!({
                "position": i + 1,
                "task_id": task.id,
                "task_type": task.task_type.to_string(),
                "estimated_tokens": task.estimated_tokens,
                "submitted_at": task.submitted_at.to_rfc3339(),
            })
        })
        .collect();

    let data = serde_json::json!({
        "capacity": state.orchestrator.queue_capacity(),
        "pending": tasks.len(),
        "tasks": tasks,
    });

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(data, request_id, elapsed).with_link("self", "/api/v1/queue");
    Ok(Json(resp))
}
