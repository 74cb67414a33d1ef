//! Quota window types.
//!
//! A `QuotaWindow` caps token consumption for one provider over one window
//! kind (daily or monthly). Windows roll forward lazily: when accessed at or
//! after `window_end`, usage resets to zero and the window advances by whole
//! window lengths anchored to the previous end, so the boundaries never drift
//! with access time.

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length class of a quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Daily,
    Monthly,
}

impl WindowKind {
    pub const ALL: [WindowKind; 2] = [WindowKind::Daily, WindowKind::Monthly];

    /// Start of the calendar window (UTC) that contains `now`.
    pub fn window_start_containing(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        match self {
            WindowKind::Daily => Utc.from_utc_datetime(&midnight),
            WindowKind::Monthly => {
                let first = midnight.with_day(1).unwrap_or(midnight);
                Utc.from_utc_datetime(&first)
            }
        }
    }

    /// Advance a window boundary by exactly one window length.
    pub fn advance(&self, boundary: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            WindowKind::Daily => boundary + Duration::days(1),
            WindowKind::Monthly => boundary
                .checked_add_months(Months::new(1))
                .unwrap_or(boundary + Duration::days(30)),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Daily => write!(f, "daily"),
            WindowKind::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(WindowKind::Daily),
            "monthly" => Ok(WindowKind::Monthly),
            other => Err(format!("invalid window kind: '{other}'")),
        }
    }
}

/// Token counter for one provider over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub kind: WindowKind,
    pub used_tokens: u64,
    pub limit_tokens: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl QuotaWindow {
    /// Open a fresh window aligned to the calendar window containing `now`.
    pub fn open(kind: WindowKind, limit_tokens: u64, now: DateTime<Utc>) -> Self {
        let window_start = kind.window_start_containing(now);
        Self {
            kind,
            used_tokens: 0,
            limit_tokens,
            window_start,
            window_end: kind.advance(window_start),
        }
    }

    /// Reset and advance the window if `now` has reached `window_end`.
    ///
    /// Returns `true` if the window rolled over.
    pub fn roll_forward(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.window_end {
            return false;
        }
        while now >= self.window_end {
            self.window_start = self.window_end;
            self.window_end = self.kind.advance(self.window_end);
        }
        self.used_tokens = 0;
        true
    }

    pub fn remaining(&self) -> u64 {
        self.limit_tokens.saturating_sub(self.used_tokens)
    }

    /// Add `tokens` if they fit within the limit. No partial additions.
    pub fn try_consume(&mut self, tokens: u64) -> bool {
        match self.used_tokens.checked_add(tokens) {
            Some(total) if total <= self.limit_tokens => {
                self.used_tokens = total;
                true
            }
            _ => false,
        }
    }

    /// Return previously consumed tokens, never going below zero.
    pub fn credit(&mut self, tokens: u64) {
        self.used_tokens = self.used_tokens.saturating_sub(tokens);
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            kind: self.kind,
            used_tokens: self.used_tokens,
            limit_tokens: self.limit_tokens,
            window_start: self.window_start,
            window_end: self.window_end,
        }
    }
}

/// A provisional hold against one quota window.
///
/// Returned by the ledger on a successful reserve and later passed back to
/// `commit` or `release`. `window_start` identifies the window the tokens
/// were taken from, so a release after rollover never credits a newer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub provider: String,
    pub kind: WindowKind,
    pub tokens: u64,
    pub window_start: DateTime<Utc>,
}

/// Read-only view of a quota window for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub kind: WindowKind,
    pub used_tokens: u64,
    pub limit_tokens: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Percentage of the window consumed (0.0 to 100.0).
    pub fn percent_used(&self) -> f64 {
        if self.limit_tokens == 0 {
            return 100.0;
        }
        self.used_tokens as f64 / self.limit_tokens as f64 * 100.0
    }
}

/// Per-provider quota and rate status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQuotaStatus {
    pub provider: String,
    pub priority: u32,
    pub enabled: bool,
    pub daily: QuotaSnapshot,
    pub monthly: QuotaSnapshot,
    pub requests_this_minute: u32,
    pub requests_per_minute_limit: u32,
}
