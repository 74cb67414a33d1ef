//! Dispatch decisions and caller-facing outcomes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrchestratorError;

/// The provider chosen for one in-flight task, with its reserved budget.
///
/// Lives only for the duration of a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub provider: String,
    pub model: String,
    pub reserved_tokens: u64,
    /// 1-based position of this provider in the fallback chain.
    pub attempt: u32,
}

/// Normalized reply from a provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub tokens_consumed: u64,
    pub content: serde_json::Value,
}

/// A successfully dispatched task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub task_id: Uuid,
    pub provider: String,
    pub model: String,
    pub tokens_consumed: u64,
    pub content: serde_json::Value,
    /// Client invocations at the winning provider (1 plus retries).
    pub attempts: u32,
    pub latency_ms: u64,
    /// Providers tried before the winner, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_from: Vec<String>,
}

/// The three outcomes a caller can receive from `submit`.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Dispatched(DispatchResult),
    Deferred { task_id: Uuid, queue_position: usize },
    Rejected(OrchestratorError),
}

impl SubmitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, SubmitOutcome::Dispatched(_))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, SubmitOutcome::Deferred { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            SubmitOutcome::Dispatched(_) => "dispatched",
            SubmitOutcome::Deferred { .. } => "deferred",
            SubmitOutcome::Rejected(_) => "rejected",
        }
    }
}
