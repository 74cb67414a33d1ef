//! SQLite storage layer.
//!
//! Ledger and usage log implementations backed by SQLite with WAL mode and
//! split read/write connection pools.

pub mod pool;
pub mod quota_ledger;
pub mod usage_log;

use chrono::{DateTime, SecondsFormat, Utc};

use switchboard_types::error::RepositoryError;

/// Fixed-width RFC 3339 (`...T12:00:00.000000Z`) so stored timestamps sort
/// lexicographically in SQL comparisons.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}
