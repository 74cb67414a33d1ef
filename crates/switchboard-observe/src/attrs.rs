//! Span attribute names for dispatch instrumentation.
//!
//! The orchestrator's own spans (`switchboard.submit`, `switchboard.replay`)
//! use these same dotted names, so request spans opened by callers and the
//! dispatcher's spans line up in an exporter.
//!
//! Record them on fields declared with `tracing::field::Empty`:
//!
//! ```
//! use switchboard_observe::attrs;
//!
//! let span = tracing::info_span!(
//!     "http.submit_task",
//!     switchboard.task.id = tracing::field::Empty,
//!     switchboard.outcome = tracing::field::Empty,
//! );
//! span.record(attrs::TASK_ID, "0190a6c2-0000-7000-8000-000000000000");
//! span.record(attrs::OUTCOME, attrs::OUTCOME_DEFERRED);
//! ```

// --- Task ---

/// Task identifier (UUID v7).
pub const TASK_ID: &str = "switchboard.task.id";

/// Task type (e.g., "default", "synthesis").
pub const TASK_TYPE: &str = "switchboard.task_type";

/// Caller's token estimate for the task.
pub const TASK_ESTIMATED_TOKENS: &str = "switchboard.task.estimated_tokens";

// --- Dispatch ---

/// Provider that served the task.
pub const PROVIDER: &str = "switchboard.provider";

/// Model the provider was asked to run.
pub const MODEL: &str = "switchboard.model";

/// Tokens the provider reported as consumed.
pub const TOKENS_CONSUMED: &str = "switchboard.tokens_consumed";

/// Number of providers tried before the one that served the task.
pub const FALLBACK_DEPTH: &str = "switchboard.fallback_depth";

/// Final outcome: one of the `OUTCOME_*` values.
pub const OUTCOME: &str = "switchboard.outcome";

/// Rejection code (e.g., "queue_full") when the outcome is rejected.
pub const ERROR_CODE: &str = "switchboard.error.code";

// --- Outcome values ---

pub const OUTCOME_DISPATCHED: &str = "dispatched";
pub const OUTCOME_DEFERRED: &str = "deferred";
pub const OUTCOME_REJECTED: &str = "rejected";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_names_are_namespaced() {
        for name in [
            TASK_ID,
            TASK_TYPE,
            TASK_ESTIMATED_TOKENS,
            PROVIDER,
            MODEL,
            TOKENS_CONSUMED,
            FALLBACK_DEPTH,
            OUTCOME,
            ERROR_CODE,
        ] {
            assert!(name.starts_with("switchboard."), "{name}");
            assert!(!name.contains(' '), "{name}");
        }
    }
}
