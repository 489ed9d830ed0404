//! In-process delivery ledger.
//!
//! Recovery and the live watcher for a topic are independent streams that
//! can surface the same envelope at the same time. The ledger records which
//! envelope ids this client instance currently has in flight or has already
//! finished, so the second sighting is dropped locally. Nothing here is
//! shared across processes.

use super::envelope::{EnvelopeId, Timestamp};
use std::collections::HashMap;

/// Completed entries are swept every this many completions.
const PRUNE_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    InFlight,
    Done { expire_at: Timestamp },
}

/// Tracks envelope ids per subscription.
#[derive(Debug, Default)]
pub struct DeliveryLedger {
    entries: HashMap<EnvelopeId, Entry>,
    completions: u64,
}

impl DeliveryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an envelope for dispatch. `false` if it is already in flight
    /// or was already completed by this instance.
    pub fn begin(&mut self, id: EnvelopeId) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, Entry::InFlight);
        true
    }

    /// Mark as finished. Kept until `expire_at` so late duplicates are still dropped.
    pub fn complete(&mut self, id: EnvelopeId, expire_at: Timestamp) {
        self.entries.insert(id, Entry::Done { expire_at });
        self.completions += 1;
        if self.completions % PRUNE_EVERY == 0 {
            self.prune(Timestamp::now());
        }
    }

    /// Drop a reservation after a failed attempt so it can be retried.
    pub fn release(&mut self, id: EnvelopeId) {
        if matches!(self.entries.get(&id), Some(Entry::InFlight)) {
            self.entries.remove(&id);
        }
    }

    /// Forget completed entries whose envelope has expired.
    pub fn prune(&mut self, now: Timestamp) {
        self.entries.retain(|_, entry| match entry {
            Entry::InFlight => true,
            Entry::Done { expire_at } => !expire_at.has_passed(now),
        });
    }

    #[must_use]
    pub fn is_in_flight(&self, id: &EnvelopeId) -> bool {
        matches!(self.entries.get(id), Some(Entry::InFlight))
    }

    #[must_use]
    pub fn is_done(&self, id: &EnvelopeId) -> bool {
        matches!(self.entries.get(id), Some(Entry::Done { .. }))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
