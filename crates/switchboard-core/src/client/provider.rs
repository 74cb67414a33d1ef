//! ProviderClient trait definition.
//!
//! The orchestrator never sees vendor wire formats. A client receives a model
//! name, an opaque payload and a timeout, and answers with a normalized
//! `ProviderReply` or a `ProviderError` carrying a `ProviderErrorKind`.

use std::time::Duration;

use switchboard_types::dispatch::ProviderReply;
use switchboard_types::error::ProviderError;
use switchboard_types::task::TaskType;

/// A single invocation handed to a provider client.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub model: String,
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    /// Per-attempt deadline. Clients should apply it to their transport;
    /// the executor enforces it regardless.
    pub timeout: Duration,
}

/// Trait for provider backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in switchboard-infra (e.g., `OpenAiCompatClient`).
pub trait ProviderClient: Send + Sync {
    /// Provider name this client serves (matches `ProviderSpec.name`).
    fn name(&self) -> &str;

    /// Execute one request against the provider.
    fn invoke(
        &self,
        request: &InvokeRequest,
    ) -> impl std::future::Future<Output = Result<ProviderReply, ProviderError>> + Send;
}
