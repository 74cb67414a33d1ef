//! Usage event storage and recording.
//!
//! `UsageRepository` is the append-only port implemented by infra (SQLite)
//! and by `InMemoryUsageLog` here. `UsageRecorder` is what the orchestrator
//! calls: a failed append is logged and never fails the request.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use switchboard_types::error::RepositoryError;
use switchboard_types::usage::{UsageEvent, UsageOutcome, UsageSummary};

/// Append-only store of usage events.
pub trait UsageRepository: Send + Sync {
    /// Append one event. Events are never updated or deleted.
    fn append(
        &self,
        event: &UsageEvent,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Events at or after `since`, oldest first.
    fn list_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<UsageEvent>, RepositoryError>> + Send;

    /// Events for one task, oldest first.
    fn list_for_task(
        &self,
        task_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<UsageEvent>, RepositoryError>> + Send;

    /// Per-provider aggregates over events at or after `since`.
    fn summarize(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<UsageSummary>, RepositoryError>> + Send;
}

/// Aggregate events per provider, sorted by provider name.
pub fn summarize_events(events: &[UsageEvent]) -> Vec<UsageSummary> {
    struct Acc {
        executions: u64,
        successes: u64,
        failures: u64,
        queued: u64,
        tokens: u64,
        latency_total: u64,
    }

    let mut by_provider: BTreeMap<&str, Acc> = BTreeMap::new();
    for event in events {
        let key = event
            .provider
            .as_deref()
            .unwrap_or(UsageSummary::QUEUED_LABEL);
        let acc = by_provider.entry(key).or_insert(Acc {
            executions: 0,
            successes: 0,
            failures: 0,
            queued: 0,
            tokens: 0,
            latency_total: 0,
        });
        match event.outcome {
            UsageOutcome::Success => {
                acc.executions += 1;
                acc.successes += 1;
                acc.latency_total += event.latency_ms;
            }
            UsageOutcome::Failure => {
                acc.executions += 1;
                acc.failures += 1;
                acc.latency_total += event.latency_ms;
            }
            UsageOutcome::Queued => acc.queued += 1,
        }
        acc.tokens += event.tokens_consumed;
    }

    by_provider
        .into_iter()
        .map(|(provider, acc)| UsageSummary {
            provider: provider.to_string(),
            executions: acc.executions,
            successes: acc.successes,
            failures: acc.failures,
            queued: acc.queued,
            tokens_consumed: acc.tokens,
            avg_latency_ms: if acc.executions == 0 {
                0.0
            } else {
                acc.latency_total as f64 / acc.executions as f64
            },
        })
        .collect()
}

// ---------------------------------------------------------------------------
// InMemoryUsageLog
// ---------------------------------------------------------------------------

/// Process-local usage log.
#[derive(Debug, Default)]
pub struct InMemoryUsageLog {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl UsageRepository for InMemoryUsageLog {
    async fn append(&self, event: &UsageEvent) -> Result<(), RepositoryError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>, RepositoryError> {
        Ok(self
            .events()
            .into_iter()
            .filter(|e| e.timestamp >= since)
            .collect())
    }

    async fn list_for_task(&self, task_id: &Uuid) -> Result<Vec<UsageEvent>, RepositoryError> {
        Ok(self
            .events()
            .into_iter()
            .filter(|e| e.task_id == *task_id)
            .collect())
    }

    async fn summarize(&self, since: DateTime<Utc>) -> Result<Vec<UsageSummary>, RepositoryError> {
        let events = self.list_since(since).await?;
        Ok(summarize_events(&events))
    }
}

// ---------------------------------------------------------------------------
// UsageRecorder
// ---------------------------------------------------------------------------

/// Records usage events on behalf of the dispatcher.
pub struct UsageRecorder<U: UsageRepository> {
    repo: Arc<U>,
}

impl<U: UsageRepository> UsageRecorder<U> {
    pub fn new(repo: Arc<U>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<U> {
        &self.repo
    }

    /// Append `event`. Storage failures are logged, not propagated.
    pub async fn record(&self, event: UsageEvent) {
        if let Err(e) = self.repo.append(&event).await {
            tracing::error!(
                task_id = %event.task_id,
                outcome = %event.outcome,
                error = %e,
                "Failed to record usage event"
            );
        }
    }
}

impl<U: UsageRepository> Clone for UsageRecorder<U> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_types::task::TaskType;

    #[tokio::test]
    async fn append_and_list_for_task() {
        let log = InMemoryUsageLog::new();
        let task_a = Uuid::now_v7();
        let task_b = Uuid::now_v7();
        log.append(&UsageEvent::success(task_a, "a", TaskType::Default, 10, 1, 5))
            .await
            .unwrap();
        log.append(&UsageEvent::queued(task_b, TaskType::Default))
            .await
            .unwrap();

        let events = log.list_for_task(&task_a).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].provider.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn list_since_filters_old_events() {
        let log = InMemoryUsageLog::new();
        let mut old = UsageEvent::success(Uuid::now_v7(), "a", TaskType::Default, 10, 1, 5);
        old.timestamp = Utc::now() - chrono::Duration::days(2);
        log.append(&old).await.unwrap();
        log.append(&UsageEvent::success(Uuid::now_v7(), "a", TaskType::Default, 20, 1, 5))
            .await
            .unwrap();

        let recent = log
            .list_since(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].tokens_consumed, 20);
    }

    #[test]
    fn summarize_groups_by_provider() {
        let task = Uuid::now_v7();
        let events = vec![
            UsageEvent::success(task, "b", TaskType::Default, 100, 1, 200),
            UsageEvent::failure(task, "a", TaskType::Default, 3, 600, "timeout"),
            UsageEvent::success(task, "b", TaskType::Default, 50, 2, 400),
            UsageEvent::queued(task, TaskType::Default),
        ];

        let summary = summarize_events(&events);
        assert_eq!(summary.len(), 3);

        // BTreeMap ordering: "(queued)" sorts before letters
        assert_eq!(summary[0].provider, UsageSummary::QUEUED_LABEL);
        assert_eq!(summary[0].queued, 1);
        assert_eq!(summary[0].executions, 0);

        let a = &summary[1];
        assert_eq!((a.executions, a.failures, a.tokens_consumed), (1, 1, 0));

        let b = &summary[2];
        assert_eq!((b.executions, b.successes, b.tokens_consumed), (2, 2, 150));
        assert!((b.avg_latency_ms - 300.0).abs() < f64::EPSILON);
    }
}
