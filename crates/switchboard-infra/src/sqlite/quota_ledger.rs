//! SQLite quota ledger.
//!
//! Window counters live in `quota_windows`, outstanding holds in
//! `quota_reservations`. Every mutation is one transaction on the single
//! writer connection, and the increment itself is a conditional
//! `UPDATE ... WHERE used_tokens + ? <= limit_tokens`, so the limit holds
//! even across processes sharing the database file.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use uuid::Uuid;

use switchboard_core::clock::Clock;
use switchboard_core::ledger::QuotaLedger;
use switchboard_types::error::LedgerError;
use switchboard_types::quota::{QuotaSnapshot, QuotaWindow, Reservation, WindowKind};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of [`QuotaLedger`].
pub struct SqliteQuotaLedger {
    pool: DatabasePool,
    clock: Arc<dyn Clock>,
}

impl SqliteQuotaLedger {
    pub fn new(pool: DatabasePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Release every reservation still on disk.
    ///
    /// Reservations only outlive their request when the process died
    /// mid-call. Run once at startup, before serving.
    pub async fn release_stale_reservations(&self) -> Result<usize, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, provider, kind, tokens, window_start FROM quota_reservations ORDER BY created_at",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(storage)?;

        let mut released = 0;
        for row in &rows {
            let reservation = ReservationSqlRow::from_row(row)
                .map_err(storage)?
                .into_reservation()?;
            if self.release(&reservation).await? {
                released += 1;
            }
        }

        if released > 0 {
            tracing::warn!(released, "Released reservations left by a previous run");
        }
        Ok(released)
    }
}

impl QuotaLedger for SqliteQuotaLedger {
    async fn reserve(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
        tokens: u64,
    ) -> Result<Reservation, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        let window = sync_window(&mut tx, provider, kind, limit_tokens, now).await?;

        // Checked in Rust before binding: SQLite integers are i64, so an
        // oversized request must never reach the conditional update.
        let amount = match i64::try_from(tokens) {
            Ok(amount) if tokens <= window.remaining() => amount,
            _ => {
                // Keep the limit sync and any rollover.
                tx.commit().await.map_err(storage)?;
                return Err(LedgerError::QuotaExhausted {
                    provider: provider.to_string(),
                    kind,
                    requested: tokens,
                    remaining: window.remaining(),
                });
            }
        };

        let updated = sqlx::query(
            r#"UPDATE quota_windows
               SET used_tokens = used_tokens + ?, updated_at = ?
               WHERE provider = ? AND kind = ? AND used_tokens + ? <= limit_tokens"#,
        )
        .bind(amount)
        .bind(format_datetime(&now))
        .bind(provider)
        .bind(kind.to_string())
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if updated.rows_affected() == 0 {
            // Keep the limit sync and any rollover.
            tx.commit().await.map_err(storage)?;
            return Err(LedgerError::QuotaExhausted {
                provider: provider.to_string(),
                kind,
                requested: tokens,
                remaining: window.remaining(),
            });
        }

        let reservation = Reservation {
            id: Uuid::now_v7(),
            provider: provider.to_string(),
            kind,
            tokens,
            window_start: window.window_start,
        };

        sqlx::query(
            r#"INSERT INTO quota_reservations (id, provider, kind, tokens, window_start, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(reservation.id.to_string())
        .bind(&reservation.provider)
        .bind(kind.to_string())
        .bind(amount)
        .bind(format_datetime(&reservation.window_start))
        .bind(format_datetime(&now))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(reservation)
    }

    async fn commit(&self, reservation: &Reservation) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM quota_reservations WHERE id = ?")
            .bind(reservation.id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, reservation: &Reservation) -> Result<bool, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.pool.writer.begin().await.map_err(storage)?;

        let held = sqlx::query(
            "DELETE FROM quota_reservations WHERE id = ? RETURNING id, provider, kind, tokens, window_start",
        )
        .bind(reservation.id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let Some(row) = held else {
            tx.commit().await.map_err(storage)?;
            return Ok(false);
        };
        let held = ReservationSqlRow::from_row(&row)
            .map_err(storage)?
            .into_reservation()?;

        let window = roll_window(&mut tx, &held.provider, held.kind, now).await?;
        if window.is_some_and(|w| w.window_start == held.window_start) {
            sqlx::query(
                r#"UPDATE quota_windows
                   SET used_tokens = MAX(used_tokens - ?, 0), updated_at = ?
                   WHERE provider = ? AND kind = ?"#,
            )
            .bind(sql_int(held.tokens))
            .bind(format_datetime(&now))
            .bind(&held.provider)
            .bind(held.kind.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(true)
    }

    async fn snapshot(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
    ) -> Result<QuotaSnapshot, LedgerError> {
        let now = self.clock.now();
        let row = sqlx::query(
            "SELECT used_tokens, limit_tokens, window_start, window_end FROM quota_windows WHERE provider = ? AND kind = ?",
        )
        .bind(provider)
        .bind(kind.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(storage)?;

        let mut window = match row {
            Some(row) => WindowSqlRow::from_row(&row)
                .map_err(storage)?
                .into_window(kind)?,
            None => QuotaWindow::open(kind, limit_tokens, now),
        };
        // Read-only view: rollover is applied here and persisted on the next write.
        window.roll_forward(now);
        window.limit_tokens = limit_tokens;
        Ok(window.snapshot())
    }

    async fn outstanding(&self) -> Result<usize, LedgerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM quota_reservations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(storage)?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// Window helpers (run inside a writer transaction)
// ---------------------------------------------------------------------------

/// Ensure the window row exists with the current limit, then roll it forward.
async fn sync_window(
    conn: &mut SqliteConnection,
    provider: &str,
    kind: WindowKind,
    limit_tokens: u64,
    now: DateTime<Utc>,
) -> Result<QuotaWindow, LedgerError> {
    let fresh = QuotaWindow::open(kind, limit_tokens, now);
    sqlx::query(
        r#"INSERT INTO quota_windows (provider, kind, used_tokens, limit_tokens, window_start, window_end, updated_at)
           VALUES (?, ?, 0, ?, ?, ?, ?)
           ON CONFLICT (provider, kind) DO UPDATE SET
               limit_tokens = excluded.limit_tokens"#,
    )
    .bind(provider)
    .bind(kind.to_string())
    .bind(sql_int(limit_tokens))
    .bind(format_datetime(&fresh.window_start))
    .bind(format_datetime(&fresh.window_end))
    .bind(format_datetime(&now))
    .execute(&mut *conn)
    .await
    .map_err(storage)?;

    roll_window(conn, provider, kind, now)
        .await?
        .ok_or_else(|| LedgerError::Storage(format!("quota window {provider}/{kind} vanished")))
}

/// Load a window and persist a rollover if one is due.
async fn roll_window(
    conn: &mut SqliteConnection,
    provider: &str,
    kind: WindowKind,
    now: DateTime<Utc>,
) -> Result<Option<QuotaWindow>, LedgerError> {
    let row = sqlx::query(
        "SELECT used_tokens, limit_tokens, window_start, window_end FROM quota_windows WHERE provider = ? AND kind = ?",
    )
    .bind(provider)
    .bind(kind.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut window = WindowSqlRow::from_row(&row)
        .map_err(storage)?
        .into_window(kind)?;

    if window.roll_forward(now) {
        tracing::debug!(
            provider,
            kind = %kind,
            window_start = %window.window_start,
            "Quota window rolled over"
        );
        sqlx::query(
            r#"UPDATE quota_windows
               SET used_tokens = 0, window_start = ?, window_end = ?, updated_at = ?
               WHERE provider = ? AND kind = ?"#,
        )
        .bind(format_datetime(&window.window_start))
        .bind(format_datetime(&window.window_end))
        .bind(format_datetime(&now))
        .bind(provider)
        .bind(kind.to_string())
        .execute(&mut *conn)
        .await
        .map_err(storage)?;
    }

    Ok(Some(window))
}

/// Limits beyond `i64::MAX` are stored as `i64::MAX`.
fn sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn storage(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct WindowSqlRow {
    used_tokens: i64,
    limit_tokens: i64,
    window_start: String,
    window_end: String,
}

impl WindowSqlRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            used_tokens: row.try_get("used_tokens")?,
            limit_tokens: row.try_get("limit_tokens")?,
            window_start: row.try_get("window_start")?,
            window_end: row.try_get("window_end")?,
        })
    }

    fn into_window(self, kind: WindowKind) -> Result<QuotaWindow, LedgerError> {
        Ok(QuotaWindow {
            kind,
            used_tokens: self.used_tokens.max(0) as u64,
            limit_tokens: self.limit_tokens.max(0) as u64,
            window_start: parse_datetime(&self.window_start).map_err(storage)?,
            window_end: parse_datetime(&self.window_end).map_err(storage)?,
        })
    }
}

struct ReservationSqlRow {
    id: String,
    provider: String,
    kind: String,
    tokens: i64,
    window_start: String,
}

impl ReservationSqlRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            provider: row.try_get("provider")?,
            kind: row.try_get("kind")?,
            tokens: row.try_get("tokens")?,
            window_start: row.try_get("window_start")?,
        })
    }

    fn into_reservation(self) -> Result<Reservation, LedgerError> {
        Ok(Reservation {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| LedgerError::Storage(format!("invalid reservation id: {e}")))?,
            provider: self.provider,
            kind: self.kind.parse().map_err(LedgerError::Storage)?,
            tokens: self.tokens.max(0) as u64,
            window_start: parse_datetime(&self.window_start).map_err(storage)?,
        })
    }
}
