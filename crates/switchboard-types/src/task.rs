//! Request task types.
//!
//! A `RequestTask` is the unit of work submitted by a caller. It is created
//! once, consumed exactly once by the dispatcher, and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of inference work a task represents.
///
/// Providers declare which task types they support and which model serves
/// each one. Unknown names are kept as `Custom` so operators can add task
/// types in configuration without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskType {
    Default,
    Synthesis,
    Embedding,
    Custom(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Default => "default",
            TaskType::Synthesis => "synthesis",
            TaskType::Embedding => "embedding",
            TaskType::Custom(name) => name,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "" => Err("task type must not be empty".to_string()),
            "default" => Ok(TaskType::Default),
            "synthesis" => Ok(TaskType::Synthesis),
            "embedding" => Ok(TaskType::Embedding),
            _ => Ok(TaskType::Custom(name)),
        }
    }
}

impl TryFrom<String> for TaskType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.to_string()
    }
}

/// A unit of inference work submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTask {
    pub id: Uuid,
    pub task_type: TaskType,
    /// Caller-supplied upper bound on the tokens this task will consume.
    pub estimated_tokens: u64,
    /// Opaque request body handed to the provider client.
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl RequestTask {
    /// Create a new task stamped with a fresh time-sortable id.
    pub fn new(task_type: TaskType, estimated_tokens: u64, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_type,
            estimated_tokens,
            payload,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_roundtrip() {
        for tt in [TaskType::Default, TaskType::Synthesis, TaskType::Embedding] {
            let parsed: TaskType = tt.to_string().parse().unwrap();
            assert_eq!(tt, parsed);
        }
    }

    #[test]
    fn test_unknown_task_type_is_custom() {
        let parsed: TaskType = "  Summarize ".parse().unwrap();
        assert_eq!(parsed, TaskType::Custom("summarize".to_string()));
        assert_eq!(parsed.as_str(), "summarize");
    }

    #[test]
    fn test_empty_task_type_rejected() {
        assert!("   ".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_task_type_serde_as_string() {
        let json = serde_json::to_string(&TaskType::Synthesis).unwrap();
        assert_eq!(json, "\"synthesis\"");
        let parsed: TaskType = serde_json::from_str("\"embedding\"").unwrap();
        assert_eq!(parsed, TaskType::Embedding);
    }

    #[test]
    fn test_new_task_has_distinct_ids() {
        let a = RequestTask::new(TaskType::Default, 10, serde_json::Value::Null);
        let b = RequestTask::new(TaskType::Default, 10, serde_json::Value::Null);
        assert_ne!(a.id, b.id);
    }
}
