//! Usage event types.
//!
//! A `UsageEvent` is appended once per provider execution (covering all of
//! its retries) and once per deferral. Events are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::task::TaskType;

/// Outcome recorded for a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageOutcome {
    Success,
    Failure,
    Queued,
}

impl fmt::Display for UsageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageOutcome::Success => write!(f, "success"),
            UsageOutcome::Failure => write!(f, "failure"),
            UsageOutcome::Queued => write!(f, "queued"),
        }
    }
}

impl FromStr for UsageOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(UsageOutcome::Success),
            "failure" => Ok(UsageOutcome::Failure),
            "queued" => Ok(UsageOutcome::Queued),
            other => Err(format!("invalid usage outcome: '{other}'")),
        }
    }
}

/// Append-only audit record of one provider execution or deferral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Provider that executed the task. `None` for queued events.
    pub provider: Option<String>,
    pub task_type: TaskType,
    pub tokens_consumed: u64,
    pub outcome: UsageOutcome,
    /// Number of client invocations made (1 plus retries).
    pub attempts: u32,
    pub latency_ms: u64,
    /// Stable error code for failures and deferrals (e.g. "timeout").
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn success(
        task_id: Uuid,
        provider: &str,
        task_type: TaskType,
        tokens_consumed: u64,
        attempts: u32,
        latency_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            provider: Some(provider.to_string()),
            task_type,
            tokens_consumed,
            outcome: UsageOutcome::Success,
            attempts,
            latency_ms,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(
        task_id: Uuid,
        provider: &str,
        task_type: TaskType,
        attempts: u32,
        latency_ms: u64,
        error_kind: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            provider: Some(provider.to_string()),
            task_type,
            tokens_consumed: 0,
            outcome: UsageOutcome::Failure,
            attempts,
            latency_ms,
            error_kind: Some(error_kind.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn queued(task_id: Uuid, task_type: TaskType) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            provider: None,
            task_type,
            tokens_consumed: 0,
            outcome: UsageOutcome::Queued,
            attempts: 0,
            latency_ms: 0,
            error_kind: Some("capacity_exhausted".to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == UsageOutcome::Success
    }
}

/// Aggregated usage for one provider over a time range.
///
/// Queued events carry no provider and are aggregated under `"(queued)"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub provider: String,
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub queued: u64,
    pub tokens_consumed: u64,
    pub avg_latency_ms: f64,
}

impl UsageSummary {
    /// Provider label used for queued events in summaries.
    pub const QUEUED_LABEL: &'static str = "(queued)";

    /// Fraction of executions that succeeded (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.successes as f64 / self.executions as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_roundtrip() {
        for outcome in [UsageOutcome::Success, UsageOutcome::Failure, UsageOutcome::Queued] {
            let parsed: UsageOutcome = outcome.to_string().parse().unwrap();
            assert_eq!(outcome, parsed);
        }
    }

    #[test]
    fn test_constructors() {
        let task_id = Uuid::now_v7();
        let ok = UsageEvent::success(task_id, "groq", TaskType::Default, 42, 1, 120);
        assert!(ok.is_success());
        assert_eq!(ok.provider.as_deref(), Some("groq"));
        assert!(ok.error_kind.is_none());

        let failed = UsageEvent::failure(task_id, "groq", TaskType::Default, 3, 900, "timeout");
        assert_eq!(failed.outcome, UsageOutcome::Failure);
        assert_eq!(failed.tokens_consumed, 0);
        assert_eq!(failed.error_kind.as_deref(), Some("timeout"));

        let queued = UsageEvent::queued(task_id, TaskType::Synthesis);
        assert!(queued.provider.is_none());
        assert_eq!(queued.attempts, 0);
    }

    #[test]
    fn test_success_rate() {
        let summary = UsageSummary {
            provider: "groq".to_string(),
            executions: 4,
            successes: 3,
            failures: 1,
            queued: 0,
            tokens_consumed: 300,
            avg_latency_ms: 100.0,
        };
        assert!((summary.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
