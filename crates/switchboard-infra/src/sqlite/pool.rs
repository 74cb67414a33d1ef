//! SQLite connections for the quota ledger and usage log.
//!
//! Ledger reservations are atomic because every write goes through a pool
//! of exactly one connection: a reserve, commit or release runs as a single
//! transaction on it. Dashboards and usage queries read through a separate
//! read-only pool so they never wait behind a reservation. WAL mode lets
//! the two run side by side.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SWITCHBOARD_DATA_DIR";

const DATABASE_FILE: &str = "switchboard.db";
const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only, up to eight connections.
    pub reader: SqlitePool,
    /// The one connection that mutates quota windows and reservations.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (or create) the database and bring the schema up to date.
    ///
    /// Foreign keys are on so a reservation cannot outlive its window row.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts.clone())
            .await?;

        // The reader pool opens read-only, so the schema must exist first
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(opts.read_only(true))
            .await?;

        Ok(Self { reader, writer })
    }
}

/// Data directory: `SWITCHBOARD_DATA_DIR`, falling back to `~/.switchboard`.
pub fn data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".switchboard"),
    }
}

/// `sqlite://{dir}/switchboard.db`, created on first open.
pub fn database_url(dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", dir.join(DATABASE_FILE).display())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &Path) -> DatabasePool {
        DatabasePool::new(&database_url(dir)).await.unwrap()
    }

    #[tokio::test]
    async fn migrations_create_ledger_and_usage_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            table_names,
            vec!["quota_reservations", "quota_windows", "usage_events"]
        );

        let mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.0.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reservation_requires_its_window_row() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;

        let orphan = sqlx::query(
            "INSERT INTO quota_reservations (id, provider, kind, tokens, window_start, created_at)
             VALUES ('r1', 'groq', 'daily', 10, '2026-03-14T00:00:00Z', '2026-03-14T12:00:00Z')",
        )
        .execute(&pool.writer)
        .await;
        assert!(orphan.is_err(), "reservation without a window must be refused");
    }

    #[tokio::test]
    async fn writes_go_through_a_single_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;

        assert_eq!(pool.writer.options().get_max_connections(), 1);

        let via_reader = sqlx::query(
            "INSERT INTO usage_events (id, task_id, task_type, outcome, timestamp)
             VALUES ('e1', 't1', 'default', 'queued', '2026-03-14T12:00:00Z')",
        )
        .execute(&pool.reader)
        .await;
        assert!(via_reader.is_err(), "reader pool must be read-only");
    }

    #[tokio::test]
    async fn reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let pool = open(dir.path()).await;
            sqlx::query(
                "INSERT INTO usage_events (id, task_id, task_type, outcome, timestamp)
                 VALUES ('e1', 't1', 'default', 'queued', '2026-03-14T12:00:00Z')",
            )
            .execute(&pool.writer)
            .await
            .unwrap();
            pool.writer.close().await;
            pool.reader.close().await;
        }

        let pool = open(dir.path()).await;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_events")
            .fetch_one(&pool.reader)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[test]
    fn database_url_points_into_data_dir() {
        let url = database_url(Path::new("/tmp/swb"));
        assert_eq!(url, "sqlite:///tmp/swb/switchboard.db?mode=rwc");
    }
}
