//! Shared upload quota accounting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Remaining-upload-budget counter shared across staging decisions.
///
/// The tracker is injected into each [`Session`](crate::Session) rather than
/// living in a process-wide static, so tests can run independent trackers;
/// sharing one `Arc<QuotaTracker>` across sessions gives the process-wide
/// behavior. Reservation is all-or-nothing and safe under concurrent staging.
///
/// Invariant: `0 <= remaining() <= bound()` at all times. Every `release`
/// must pair with an earlier `try_reserve`.
#[derive(Debug)]
pub struct QuotaTracker {
    bound: u64,
    remaining: AtomicU64,
}

impl QuotaTracker {
    /// Creates a tracker with the given total byte budget.
    pub fn new(bound: u64) -> Self {
        Self {
            bound,
            remaining: AtomicU64::new(bound),
        }
    }

    /// Atomically reserves `size` bytes. Returns `false`, reserving nothing,
    /// when the remaining budget is insufficient.
    pub fn try_reserve(&self, size: u64) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                cur.checked_sub(size)
            })
            .is_ok()
    }

    /// Returns a reservation to the budget, saturating at the bound.
    pub fn release(&self, size: u64) {
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_add(size).min(self.bound))
            });
    }

    /// Bytes still available for staging.
    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Total budget the tracker was created with.
    pub fn bound(&self) -> u64 {
        self.bound
    }
}
