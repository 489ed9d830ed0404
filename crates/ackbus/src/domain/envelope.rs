//! # Envelope
//!
//! The only persisted entity: one published message plus its delivery
//! metadata. Everything except `claimed_by` and `acked_by` is immutable
//! after creation, and those two sets only ever grow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Globally unique envelope identifier, assigned at publish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create from raw milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Raw milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// This instant shifted forward by `ttl`, saturating.
    #[must_use]
    pub fn saturating_add(&self, ttl: Duration) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ttl_ms))
    }

    /// Whether this instant is at or before `now`.
    #[must_use]
    pub fn has_passed(&self, now: Timestamp) -> bool {
        self.0 <= now.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The two append-only identity sets on an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetField {
    /// Identities that won the competing-consumer claim.
    ClaimedBy,
    /// Identities that finished processing.
    AckedBy,
}

impl SetField {
    /// Stored field name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaimedBy => "claimed_by",
            Self::AckedBy => "acked_by",
        }
    }
}

/// A published message and its delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub topic: String,
    /// Codec-encoded application payload.
    pub payload: Vec<u8>,
    pub created_at: Timestamp,
    /// `created_at + ttl`; the store may delete the envelope after this.
    pub expire_at: Timestamp,
    #[serde(default)]
    pub claimed_by: BTreeSet<String>,
    #[serde(default)]
    pub acked_by: BTreeSet<String>,
}

impl Envelope {
    /// Build a fresh envelope stamped with the current time.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, ttl: Duration) -> Self {
        Self::at(topic, payload, Timestamp::now(), ttl)
    }

    /// Build a fresh envelope created at a given instant.
    #[must_use]
    pub fn at(topic: impl Into<String>, payload: Vec<u8>, created_at: Timestamp, ttl: Duration) -> Self {
        Self {
            id: EnvelopeId::new(),
            topic: topic.into(),
            payload,
            created_at,
            expire_at: created_at.saturating_add(ttl),
            claimed_by: BTreeSet::new(),
            acked_by: BTreeSet::new(),
        }
    }

    /// Borrow one of the identity sets.
    #[must_use]
    pub fn set(&self, field: SetField) -> &BTreeSet<String> {
        match field {
            SetField::ClaimedBy => &self.claimed_by,
            SetField::AckedBy => &self.acked_by,
        }
    }

    /// Insert into one of the identity sets. Returns `true` if it was absent.
    pub fn add_to_set(&mut self, field: SetField, identity: &str) -> bool {
        let set = match field {
            SetField::ClaimedBy => &mut self.claimed_by,
            SetField::AckedBy => &mut self.acked_by,
        };
        set.insert(identity.to_string())
    }

    #[must_use]
    pub fn is_acked_by(&self, identity: &str) -> bool {
        self.acked_by.contains(identity)
    }

    #[must_use]
    pub fn is_claimed_by(&self, identity: &str) -> bool {
        self.claimed_by.contains(identity)
    }

    /// Whether the envelope is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expire_at.has_passed(now)
    }
}
