//! Quota ledger: atomic token reservations against per-provider windows.
//!
//! Accounting is reserve-then-settle. `reserve` takes tokens out of a window
//! up front, `commit` keeps them counted, and `release` hands them back when
//! the call failed before consuming anything. Every reservation is settled
//! exactly once; settling an already-settled reservation is a no-op.

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use switchboard_types::error::LedgerError;
use switchboard_types::quota::{QuotaSnapshot, Reservation, WindowKind};

/// Durable token counters per provider per window.
///
/// Implementations must serialize concurrent mutations of the same
/// provider/window pair so `used_tokens` never exceeds `limit_tokens`, while
/// leaving different pairs fully concurrent. Windows roll over lazily on any
/// access at or after `window_end`.
///
/// `limit_tokens` is passed on each call because limits belong to the
/// provider registry, which can be reloaded at runtime.
pub trait QuotaLedger: Send + Sync {
    /// Reserve `tokens` or fail with `LedgerError::QuotaExhausted`.
    /// Never reserves a partial amount.
    fn reserve(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
        tokens: u64,
    ) -> impl Future<Output = Result<Reservation, LedgerError>> + Send;

    /// Finalize a reservation; its tokens stay counted.
    ///
    /// Returns `false` if the reservation was already settled.
    fn commit(
        &self,
        reservation: &Reservation,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Roll back a reservation, crediting its tokens to the window it was
    /// taken from. If that window has since rolled over, nothing is credited.
    ///
    /// Returns `false` if the reservation was already settled.
    fn release(
        &self,
        reservation: &Reservation,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Current state of a window, after applying any pending rollover.
    fn snapshot(
        &self,
        provider: &str,
        kind: WindowKind,
        limit_tokens: u64,
    ) -> impl Future<Output = Result<QuotaSnapshot, LedgerError>> + Send;

    /// Number of reservations that are neither committed nor released.
    fn outstanding(&self) -> impl Future<Output = Result<usize, LedgerError>> + Send;
}

// ---------------------------------------------------------------------------
// HeldReservations
// ---------------------------------------------------------------------------

/// Reservations held by one in-flight task.
///
/// Settled explicitly with [`commit`](Self::commit) or
/// [`release`](Self::release). If dropped unsettled (the owning future was
/// cancelled mid-flight), the reservations are released on a background task
/// so quota is never left permanently reserved.
pub struct HeldReservations<L: QuotaLedger + 'static> {
    ledger: Arc<L>,
    reservations: Vec<Reservation>,
}

impl<L: QuotaLedger + 'static> HeldReservations<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            reservations: Vec::with_capacity(WindowKind::ALL.len()),
        }
    }

    pub fn push(&mut self, reservation: Reservation) {
        self.reservations.push(reservation);
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// Commit every held reservation.
    pub async fn commit(mut self) {
        let reservations = std::mem::take(&mut self.reservations);
        for reservation in &reservations {
            if let Err(e) = self.ledger.commit(reservation).await {
                tracing::error!(
                    provider = %reservation.provider,
                    window = %reservation.kind,
                    reservation_id = %reservation.id,
                    error = %e,
                    "Failed to commit reservation"
                );
            }
        }
    }

    /// Release every held reservation.
    pub async fn release(mut self) {
        let reservations = std::mem::take(&mut self.reservations);
        release_all(self.ledger.as_ref(), &reservations).await;
    }
}

impl<L: QuotaLedger + 'static> Drop for HeldReservations<L> {
    fn drop(&mut self) {
        if self.reservations.is_empty() {
            return;
        }
        let reservations = std::mem::take(&mut self.reservations);
        let ledger = Arc::clone(&self.ledger);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_all(ledger.as_ref(), &reservations).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    count = reservations.len(),
                    "Dropped unsettled reservations outside a runtime; quota stays reserved"
                );
            }
        }
    }
}

async fn release_all<L: QuotaLedger>(ledger: &L, reservations: &[Reservation]) {
    for reservation in reservations {
        if let Err(e) = ledger.release(reservation).await {
            tracing::error!(
                provider = %reservation.provider,
                window = %reservation.kind,
                reservation_id = %reservation.id,
                error = %e,
                "Failed to release reservation"
            );
        }
    }
}
