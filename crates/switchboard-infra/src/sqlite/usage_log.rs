//! SQLite usage log.
//!
//! Append-only: rows in `usage_events` are inserted and never updated.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use switchboard_core::usage::UsageRepository;
use switchboard_types::error::RepositoryError;
use switchboard_types::usage::{UsageEvent, UsageSummary};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of [`UsageRepository`].
pub struct SqliteUsageLog {
    pool: DatabasePool,
}

impl SqliteUsageLog {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl UsageRepository for SqliteUsageLog {
    async fn append(&self, event: &UsageEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO usage_events (id, task_id, provider, task_type, tokens_consumed, outcome, attempts, latency_ms, error_kind, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.task_id.to_string())
        .bind(&event.provider)
        .bind(event.task_type.to_string())
        .bind(event.tokens_consumed as i64)
        .bind(event.outcome.to_string())
        .bind(event.attempts as i64)
        .bind(event.latency_ms as i64)
        .bind(&event.error_kind)
        .bind(format_datetime(&event.timestamp))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM usage_events WHERE timestamp >= ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(format_datetime(&since))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(to_event).collect()
    }

    async fn list_for_task(&self, task_id: &Uuid) -> Result<Vec<UsageEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM usage_events WHERE task_id = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(to_event).collect()
    }

    async fn summarize(&self, since: DateTime<Utc>) -> Result<Vec<UsageSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT
                   COALESCE(provider, ?) AS provider,
                   SUM(CASE WHEN outcome != 'queued' THEN 1 ELSE 0 END) AS executions,
                   SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END) AS successes,
                   SUM(CASE WHEN outcome = 'failure' THEN 1 ELSE 0 END) AS failures,
                   SUM(CASE WHEN outcome = 'queued' THEN 1 ELSE 0 END) AS queued,
                   SUM(tokens_consumed) AS tokens_consumed,
                   SUM(CASE WHEN outcome != 'queued' THEN latency_ms ELSE 0 END) AS latency_total
               FROM usage_events
               WHERE timestamp >= ?
               GROUP BY 1
               ORDER BY 1"#,
        )
        .bind(UsageSummary::QUEUED_LABEL)
        .bind(format_datetime(&since))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let summary = SummarySqlRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            summaries.push(summary.into_summary());
        }
        Ok(summaries)
    }
}

fn to_event(row: &sqlx::sqlite::SqliteRow) -> Result<UsageEvent, RepositoryError> {
    UsageSqlRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_event()
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct UsageSqlRow {
    id: String,
    task_id: String,
    provider: Option<String>,
    task_type: String,
    tokens_consumed: i64,
    outcome: String,
    attempts: i64,
    latency_ms: i64,
    error_kind: Option<String>,
    timestamp: String,
}

impl UsageSqlRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            provider: row.try_get("provider")?,
            task_type: row.try_get("task_type")?,
            tokens_consumed: row.try_get("tokens_consumed")?,
            outcome: row.try_get("outcome")?,
            attempts: row.try_get("attempts")?,
            latency_ms: row.try_get("latency_ms")?,
            error_kind: row.try_get("error_kind")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_event(self) -> Result<UsageEvent, RepositoryError> {
        Ok(UsageEvent {
            id: parse_uuid(&self.id)?,
            task_id: parse_uuid(&self.task_id)?,
            provider: self.provider,
            task_type: self.task_type.parse().map_err(RepositoryError::Query)?,
            tokens_consumed: self.tokens_consumed as u64,
            outcome: self.outcome.parse().map_err(RepositoryError::Query)?,
            attempts: self.attempts as u32,
            latency_ms: self.latency_ms as u64,
            error_kind: self.error_kind,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

struct SummarySqlRow {
    provider: String,
    executions: i64,
    successes: i64,
    failures: i64,
    queued: i64,
    tokens_consumed: i64,
    latency_total: i64,
}

impl SummarySqlRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            provider: row.try_get("provider")?,
            executions: row.try_get("executions")?,
            successes: row.try_get("successes")?,
            failures: row.try_get("failures")?,
            queued: row.try_get("queued")?,
            tokens_consumed: row.try_get("tokens_consumed")?,
            latency_total: row.try_get("latency_total")?,
        })
    }

    fn into_summary(self) -> UsageSummary {
        UsageSummary {
            provider: self.provider,
            executions: self.executions as u64,
            successes: self.successes as u64,
            failures: self.failures as u64,
            queued: self.queued as u64,
            tokens_consumed: self.tokens_consumed as u64,
            avg_latency_ms: if self.executions == 0 {
                0.0
            } else {
                self.latency_total as f64 / self.executions as f64
            },
        }
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid uuid: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::usage::summarize_events;
    use switchboard_types::task::TaskType;
    use switchboard_types::usage::UsageOutcome;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let log = SqliteUsageLog::new(test_pool().await);
        let task_id = Uuid::now_v7();

        let failed = UsageEvent::failure(task_id, "groq", TaskType::Synthesis, 3, 950, "timeout");
        let ok = UsageEvent::success(task_id, "gemini", TaskType::Synthesis, 812, 1, 420);
        log.append(&failed).await.unwrap();
        log.append(&ok).await.unwrap();
        log.append(&UsageEvent::queued(Uuid::now_v7(), TaskType::Default))
            .await
            .unwrap();

        let events = log.list_for_task(&task_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, UsageOutcome::Failure);
        assert_eq!(events[0].error_kind.as_deref(), Some("timeout"));
        assert_eq!(events[0].attempts, 3);
        assert_eq!(events[1].provider.as_deref(), Some("gemini"));
        assert_eq!(events[1].tokens_consumed, 812);
        assert_eq!(events[1].task_type, TaskType::Synthesis);
    }

    #[tokio::test]
    async fn list_since_excludes_older_events() {
        let log = SqliteUsageLog::new(test_pool().await);
        let mut old = UsageEvent::success(Uuid::now_v7(), "a", TaskType::Default, 5, 1, 10);
        old.timestamp = Utc::now() - chrono::Duration::days(3);
        log.append(&old).await.unwrap();
        let recent = UsageEvent::success(Uuid::now_v7(), "a", TaskType::Default, 7, 1, 10);
        log.append(&recent).await.unwrap();

        let events = log
            .list_since(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, recent.id);
    }

    #[tokio::test]
    async fn sql_summary_matches_in_memory_aggregation() {
        let log = SqliteUsageLog::new(test_pool().await);
        let task = Uuid::now_v7();
        let events = vec![
            UsageEvent::success(task, "b", TaskType::Default, 100, 1, 200),
            UsageEvent::failure(task, "a", TaskType::Default, 3, 600, "server"),
            UsageEvent::success(task, "b", TaskType::Default, 50, 2, 400),
            UsageEvent::queued(task, TaskType::Default),
        ];
        for event in &events {
            log.append(event).await.unwrap();
        }

        let since = Utc::now() - chrono::Duration::hours(1);
        let summary = log.summarize(since).await.unwrap();
        assert_eq!(summary, summarize_events(&events));

        let b = summary.iter().find(|s| s.provider == "b").unwrap();
        assert_eq!(b.tokens_consumed, 150);
        assert!((b.avg_latency_ms - 300.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn summary_of_empty_range_is_empty() {
        let log = SqliteUsageLog::new(test_pool().await);
        assert!(log.summarize(Utc::now()).await.unwrap().is_empty());
    }
}
