//! Quota Ledger
//!
//! Per-user admission control with optimistic reservations.
//!
//! ## Contract
//!
//! - `reserve` is the single admission point and must run before
//!   dispatch. Check-and-increment is serialized per user, so two
//!   concurrent requests from one user cannot jointly pass a reservation
//!   that exceeds the quota; different users never block each other.
//! - `commit` finalizes actual usage, replacing the optimistic estimate,
//!   and writes the append-only usage record. Consuming the reservation
//!   makes double-commit unrepresentable.
//! - `release` returns the full allowance on failure paths with no
//!   usable output. A dropped, unsettled reservation releases itself, so
//!   early-return error paths cannot leak reserved headroom.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::store::UsageStore;
use crate::types::{ForgeError, Result, UsageDelta, UsageRecord};

// =============================================================================
// Ledger
// =============================================================================

struct LedgerInner {
    limit: u64,
    window: Duration,
    store: Arc<dyn UsageStore>,
    /// Per-user in-flight reservation totals. The per-user mutex is the
    /// only lock in the pipeline held across a quota decision.
    reserved: DashMap<String, Arc<Mutex<u64>>>,
}

impl LedgerInner {
    fn slot(&self, user_id: &str) -> Arc<Mutex<u64>> {
        self.reserved
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(0)))
            .clone()
    }

    fn return_tokens(&self, user_id: &str, tokens: u64) {
        let slot = self.slot(user_id);
        let mut reserved = slot.lock().expect("quota slot lock poisoned");
        *reserved = reserved.saturating_sub(tokens);
    }
}

/// Thread-safe per-user quota ledger.
#[derive(Clone)]
pub struct QuotaLedger {
    inner: Arc<LedgerInner>,
}

impl QuotaLedger {
    /// Create a ledger over the given store. `window_secs` and
    /// `limit_tokens` come from configuration.
    pub fn new(store: Arc<dyn UsageStore>, limit_tokens: u64, window_secs: u64) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                limit: limit_tokens,
                window: Duration::seconds(window_secs as i64),
                store,
                reserved: DashMap::new(),
            }),
        }
    }

    /// Reserve `estimated_tokens` for a user, or deny admission.
    ///
    /// No side effects on denial.
    pub fn reserve(&self, user_id: &str, estimated_tokens: u64) -> Result<Reservation> {
        let slot = self.inner.slot(user_id);
        let mut reserved = slot.lock().expect("quota slot lock poisoned");

        let since = Utc::now() - self.inner.window;
        let committed = self.inner.store.window_total(user_id, since)?;
        let used = committed + *reserved;

        if used + estimated_tokens > self.inner.limit {
            return Err(ForgeError::QuotaExceeded {
                user_id: user_id.to_string(),
                used,
                limit: self.inner.limit,
                requested: estimated_tokens,
            });
        }

        *reserved += estimated_tokens;
        debug!(
            user = user_id,
            reserved = estimated_tokens,
            in_flight = *reserved,
            "Quota reserved"
        );

        Ok(Reservation {
            inner: self.inner.clone(),
            user_id: user_id.to_string(),
            tokens: estimated_tokens,
            settled: false,
        })
    }

    /// Finalize actual usage for a reservation and append the usage
    /// record. The optimistic estimate is fully returned; committed
    /// usage is carried by the store from here on.
    pub fn commit(
        &self,
        mut reservation: Reservation,
        usage: UsageDelta,
        provider: &str,
        model: &str,
    ) -> Result<()> {
        reservation.settled = true;
        self.inner
            .return_tokens(&reservation.user_id, reservation.tokens);

        let record = UsageRecord::new(&reservation.user_id, usage, provider, model);
        debug!(
            user = %reservation.user_id,
            input = usage.input_tokens,
            output = usage.output_tokens,
            approximate = usage.approximate,
            "Usage committed"
        );
        self.inner.store.append(record)
    }

    /// Release a reservation without committing any usage (failure paths
    /// that produced no usable output).
    pub fn release(&self, reservation: Reservation) {
        drop(reservation); // Drop impl returns the allowance
    }

    /// Current window snapshot for a user
    pub fn snapshot(&self, user_id: &str) -> Result<QuotaSnapshot> {
        let since = Utc::now() - self.inner.window;
        let committed = self.inner.store.window_total(user_id, since)?;
        let reserved = {
            let slot = self.inner.slot(user_id);
            let guard = slot.lock().expect("quota slot lock poisoned");
            *guard
        };
        Ok(QuotaSnapshot {
            limit: self.inner.limit,
            committed,
            reserved,
        })
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// An admitted, not-yet-settled quota claim.
///
/// Settled by `QuotaLedger::commit` or `release`; dropping an unsettled
/// reservation returns its allowance automatically.
pub struct Reservation {
    inner: Arc<LedgerInner>,
    user_id: String,
    tokens: u64,
    settled: bool,
}

impl Reservation {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The optimistic allowance this reservation holds
    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                user = %self.user_id,
                tokens = self.tokens,
                "Releasing unsettled reservation"
            );
            self.inner.return_tokens(&self.user_id, self.tokens);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("user_id", &self.user_id)
            .field("tokens", &self.tokens)
            .field("settled", &self.settled)
            .finish()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of a user's quota window.
#[derive(Debug, Clone, Copy)]
pub struct QuotaSnapshot {
    pub limit: u64,
    pub committed: u64,
    pub reserved: u64,
}

impl QuotaSnapshot {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.committed + self.reserved)
    }

    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        (self.committed + self.reserved) as f64 / self.limit as f64
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::MemoryUsageStore;

    fn ledger_with(limit: u64) -> (QuotaLedger, Arc<MemoryUsageStore>) {
        let store = Arc::new(MemoryUsageStore::new());
        (QuotaLedger::new(store.clone(), limit, 86_400), store)
    }

    #[test]
    fn test_reserve_within_limit() {
        let (ledger, _) = ledger_with(1000);
        let reservation = ledger.reserve("u1", 400).unwrap();
        assert_eq!(reservation.tokens(), 400);
        assert_eq!(ledger.snapshot("u1").unwrap().reserved, 400);
    }

    #[test]
    fn test_reserve_denied_when_jointly_exceeding() {
        let (ledger, _) = ledger_with(1000);
        let _first = ledger.reserve("u1", 600).unwrap();
        let err = ledger.reserve("u1", 600).unwrap_err();
        match err {
            ForgeError::QuotaExceeded { used, limit, .. } => {
                assert_eq!(used, 600);
                assert_eq!(limit, 1000);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_users_do_not_share_quota() {
        let (ledger, _) = ledger_with(1000);
        let _a = ledger.reserve("u1", 900).unwrap();
        assert!(ledger.reserve("u2", 900).is_ok());
    }

    #[test]
    fn test_commit_replaces_estimate_with_actual() {
        let (ledger, store) = ledger_with(1000);
        let reservation = ledger.reserve("u1", 800).unwrap();
        ledger
            .commit(reservation, UsageDelta::exact(50, 100), "openai", "gpt-4o")
            .unwrap();

        let snapshot = ledger.snapshot("u1").unwrap();
        assert_eq!(snapshot.reserved, 0);
        assert_eq!(snapshot.committed, 150);
        assert_eq!(store.records_for("u1").len(), 1);
    }

    #[test]
    fn test_release_returns_full_allowance() {
        let (ledger, store) = ledger_with(1000);
        let reservation = ledger.reserve("u1", 800).unwrap();
        ledger.release(reservation);

        let snapshot = ledger.snapshot("u1").unwrap();
        assert_eq!(snapshot.reserved, 0);
        assert_eq!(snapshot.committed, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_dropped_reservation_self_releases() {
        let (ledger, _) = ledger_with(1000);
        {
            let _reservation = ledger.reserve("u1", 999).unwrap();
        }
        assert!(ledger.reserve("u1", 999).is_ok());
    }

    #[test]
    fn test_committed_usage_counts_against_window() {
        let (ledger, _) = ledger_with(1000);
        let reservation = ledger.reserve("u1", 100).unwrap();
        ledger
            .commit(reservation, UsageDelta::exact(400, 500), "openai", "gpt-4o")
            .unwrap();
        // 900 committed, only 100 left
        assert!(ledger.reserve("u1", 200).is_err());
        assert!(ledger.reserve("u1", 100).is_ok());
    }

    #[test]
    fn test_concurrent_reservations_bounded_overshoot() {
        // Many threads racing for one user: committed + admitted
        // reservations can never jointly exceed the limit.
        let (ledger, _) = ledger_with(1000);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(std::thread::spawn(move || {
                // Keep admitted reservations alive for the duration
                ledger.reserve("u1", 300).ok().map(std::mem::forget).is_some()
            }));
        }
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|&ok| ok)
            .count();
        assert!(admitted <= 3, "admitted {admitted} reservations of 300 against limit 1000");
        assert!(admitted >= 1);
    }

    #[test]
    fn test_snapshot_remaining() {
        let (ledger, _) = ledger_with(1000);
        let _r = ledger.reserve("u1", 250).unwrap();
        let snapshot = ledger.snapshot("u1").unwrap();
        assert_eq!(snapshot.remaining(), 750);
        assert!((snapshot.utilization() - 0.25).abs() < f64::EPSILON);
    }
}
