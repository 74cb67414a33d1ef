//! Per-provider request admission over fixed 60-second buckets.
//!
//! Independent of the quota ledger: a provider with token budget left can
//! still be rate limited in the current minute. Buckets are aligned to
//! whole UTC minutes and reset when the minute changes.

use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;

const BUCKET_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    bucket: i64,
    count: u32,
}

pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    fn current_bucket(&self) -> i64 {
        self.clock.now().timestamp().div_euclid(BUCKET_SECS)
    }

    /// Count one request against `provider` if it is under `limit` for the
    /// current bucket. A refused request leaves the count untouched.
    pub fn admit(&self, provider: &str, limit: u32) -> bool {
        let bucket = self.current_bucket();
        let mut window = self
            .windows
            .entry(provider.to_string())
            .or_insert(RateWindow { bucket, count: 0 });

        if window.bucket != bucket {
            *window = RateWindow { bucket, count: 0 };
        }
        if window.count >= limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Requests admitted for `provider` in the current bucket.
    pub fn current_count(&self, provider: &str) -> u32 {
        let bucket = self.current_bucket();
        self.windows
            .get(provider)
            .filter(|w| w.bucket == bucket)
            .map(|w| w.count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 5).unwrap(),
        ));
        (clock.clone(), RateLimiter::new(clock))
    }

    #[test]
    fn admits_up_to_limit_then_refuses() {
        let (_, limiter) = limiter();
        assert!(limiter.admit("a", 3));
        assert!(limiter.admit("a", 3));
        assert!(limiter.admit("a", 3));
        assert!(!limiter.admit("a", 3));
        assert!(!limiter.admit("a", 3));
        assert_eq!(limiter.current_count("a"), 3);
    }

    #[test]
    fn providers_have_separate_buckets() {
        let (_, limiter) = limiter();
        assert!(limiter.admit("a", 1));
        assert!(!limiter.admit("a", 1));
        assert!(limiter.admit("b", 1));
    }

    #[test]
    fn bucket_resets_on_next_minute() {
        let (clock, limiter) = limiter();
        assert!(limiter.admit("a", 1));
        assert!(!limiter.admit("a", 1));

        // Still inside the same minute
        clock.advance(Duration::seconds(50));
        assert!(!limiter.admit("a", 1));

        clock.advance(Duration::seconds(10));
        assert_eq!(limiter.current_count("a"), 0);
        assert!(limiter.admit("a", 1));
    }

    #[test]
    fn zero_limit_never_admits() {
        let (_, limiter) = limiter();
        assert!(!limiter.admit("a", 0));
        assert_eq!(limiter.current_count("a"), 0);
    }

    #[test]
    fn concurrent_admission_respects_limit() {
        let (_, limiter) = limiter();
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..10).filter(|_| limiter.admit("a", 25)).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }
}
