//! Delivery counters.
//!
//! One [`BrokerMetrics`] is shared by every component of a client. Counters
//! only grow; read them through [`BrokerMetrics::snapshot`].
//!
//! ```ignore
//! let snapshot = client.metrics();
//! assert_eq!(snapshot.acked, snapshot.dispatched - snapshot.handler_failures);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe broker counters.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Envelopes appended by this client
    pub published: AtomicU64,
    /// Claims won
    pub claims_won: AtomicU64,
    /// Claims that matched nothing
    pub claims_lost: AtomicU64,
    /// Envelopes handed to the executor
    pub dispatched: AtomicU64,
    /// Envelopes whose handlers failed overall
    pub handler_failures: AtomicU64,
    pub acked: AtomicU64,
    pub ack_failures: AtomicU64,
    pub decode_errors: AtomicU64,
    /// Second sightings dropped by the delivery ledger
    pub duplicates_suppressed: AtomicU64,
    pub feed_reconnects: AtomicU64,
    /// Envelopes returned by recovery scans
    pub recovered: AtomicU64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim(&self, won: bool) {
        if won {
            self.claims_won.fetch_add(1, Ordering::Relaxed);
        } else {
            self.claims_lost.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self, ok: bool) {
        if ok {
            self.acked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ack_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.feed_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovered(&self, count: usize) {
        self.recovered.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            claims_won: self.claims_won.load(Ordering::Relaxed),
            claims_lost: self.claims_lost.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            feed_reconnects: self.feed_reconnects.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`BrokerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub claims_won: u64,
    pub claims_lost: u64,
    pub dispatched: u64,
    pub handler_failures: u64,
    pub acked: u64,
    pub ack_failures: u64,
    pub decode_errors: u64,
    pub duplicates_suppressed: u64,
    pub feed_reconnects: u64,
    pub recovered: u64,
}
