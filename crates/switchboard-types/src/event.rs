//! Event types for the orchestrator event bus.
//!
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle events emitted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A task was executed successfully by a provider.
    Dispatched {
        task_id: Uuid,
        provider: String,
        tokens_consumed: u64,
        /// Providers tried before the winner.
        fallback_from: Vec<String>,
    },

    /// No provider could take the task; it was queued.
    Deferred { task_id: Uuid, queue_position: usize },

    /// A task ended with a terminal error.
    Rejected {
        task_id: Uuid,
        code: String,
        reason: String,
    },

    /// A deferred task was re-dispatched by the queue sweep.
    Replayed {
        task_id: Uuid,
        provider: String,
        tokens_consumed: u64,
    },

    /// The provider registry was replaced by a config reload.
    RegistryReloaded { provider_count: usize },
}

impl OrchestratorEvent {
    /// Task this event refers to, if any.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            OrchestratorEvent::Dispatched { task_id, .. }
            | OrchestratorEvent::Deferred { task_id, .. }
            | OrchestratorEvent::Rejected { task_id, .. }
            | OrchestratorEvent::Replayed { task_id, .. } => Some(*task_id),
            OrchestratorEvent::RegistryReloaded { .. } => None,
        }
    }
}
