//! In-memory quota ledger.
//!
//! Each provider/window pair is one `DashMap` entry. The entry guard is the
//! per-key critical section: rollover, the limit check and the increment all
//! happen while it is held, and different pairs live in different shards.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use switchboard_types::error::LedgerError;
use switchboard_types::quota::{QuotaSnapshot, QuotaWindow, Reservation, WindowKind};

use super::QuotaLedger;
use crate::clock::Clock;

pub struct InMemoryQuotaLedger {
    windows: DashMap<(String, WindowKind), QuotaWindow>,
    outstanding: DashMap<Uuid, Reservation>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQuotaLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            outstanding: DashMap::new(),
            clock,
        }
    }

    fn settle(&self, reservation: &Reservation) -> Option<Reservation> {
        self.outstanding.remove(&reservation.id).map(|(_, r)| r)
    }
}

impl QuotaLedger for InMemoryQuotaLedger {
    async fn reserve(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
        tokens: u64,
    ) -> Result<Reservation, LedgerError> {
        let now = self.clock.now();
        let reservation = {
            let mut window = self
                .windows
                .entry((provider.to_string(), kind))
                .or_insert_with(|| QuotaWindow::open(kind, limit_tokens, now));
            window.roll_forward(now);
            window.limit_tokens = limit_tokens;

            if !window.try_consume(tokens) {
                return Err(LedgerError::QuotaExhausted {
                    provider: provider.to_string(),
                    kind,
                    requested: tokens,
                    remaining: window.remaining(),
                });
            }

            Reservation {
                id: Uuid::now_v7(),
                provider: provider.to_string(),
                kind,
                tokens,
                window_start: window.window_start,
            }
        };

        self.outstanding.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn commit(&self, reservation: &Reservation) -> Result<bool, LedgerError> {
        Ok(self.settle(reservation).is_some())
    }

    async fn release(&self, reservation: &Reservation) -> Result<bool, LedgerError> {
        let Some(held) = self.settle(reservation) else {
            return Ok(false);
        };

        let now = self.clock.now();
        if let Some(mut window) = self.windows.get_mut(&(held.provider.clone(), held.kind)) {
            window.roll_forward(now);
            if window.window_start == held.window_start {
                window.credit(held.tokens);
            }
        }
        Ok(true)
    }

    async fn snapshot(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
    ) -> Result<QuotaSnapshot, LedgerError> {
        let now = self.clock.now();
        let mut window = self
            .windows
            .entry((provider.to_string(), kind))
            .or_insert_with(|| QuotaWindow::open(kind, limit_tokens, now));
        window.roll_forward(now);
        window.limit_tokens = limit_tokens;
        Ok(window.snapshot())
    }

    async fn outstanding(&self) -> Result<usize, LedgerError> {
        Ok(self.outstanding.len())
    }
}
