//! # Envelope Predicates and Mutations
//!
//! The small query language the broker needs from a document store:
//! match by id, "set does not contain identity", conjunction; and a
//! single mutation, set-insert into one of the identity sets.

use super::envelope::{Envelope, EnvelopeId, SetField};
use serde::{Deserialize, Serialize};

/// Predicate over envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeFilter {
    /// Every envelope.
    All,
    /// Exactly one envelope.
    Id(EnvelopeId),
    /// The given set does not contain the identity.
    Lacks { field: SetField, identity: String },
    /// Every inner predicate holds.
    And(Vec<EnvelopeFilter>),
}

impl EnvelopeFilter {
    /// Match one envelope by id.
    #[must_use]
    pub fn id(id: EnvelopeId) -> Self {
        Self::Id(id)
    }

    /// Envelopes not yet acknowledged by `identity`.
    #[must_use]
    pub fn not_acked_by(identity: impl Into<String>) -> Self {
        Self::Lacks {
            field: SetField::AckedBy,
            identity: identity.into(),
        }
    }

    /// Envelopes not yet claimed by `identity`.
    #[must_use]
    pub fn not_claimed_by(identity: impl Into<String>) -> Self {
        Self::Lacks {
            field: SetField::ClaimedBy,
            identity: identity.into(),
        }
    }

    /// Conjunction with another predicate.
    #[must_use]
    pub fn and(self, other: EnvelopeFilter) -> Self {
        match self {
            Self::And(mut inner) => {
                inner.push(other);
                Self::And(inner)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Check if an envelope matches this predicate.
    #[must_use]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => envelope.id == *id,
            Self::Lacks { field, identity } => !envelope.set(*field).contains(identity),
            Self::And(inner) => inner.iter().all(|f| f.matches(envelope)),
        }
    }
}

/// Mutation applied atomically by a conditional update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeUpdate {
    /// Insert the identity into the set; no-op if already present.
    AddToSet { field: SetField, identity: String },
}

impl EnvelopeUpdate {
    /// Record a competing-consumer claim.
    #[must_use]
    pub fn claim(identity: impl Into<String>) -> Self {
        Self::AddToSet {
            field: SetField::ClaimedBy,
            identity: identity.into(),
        }
    }

    /// Record an acknowledgment.
    #[must_use]
    pub fn ack(identity: impl Into<String>) -> Self {
        Self::AddToSet {
            field: SetField::AckedBy,
            identity: identity.into(),
        }
    }

    /// Apply to an envelope. Returns `true` if the document changed.
    pub fn apply(&self, envelope: &mut Envelope) -> bool {
        match self {
            Self::AddToSet { field, identity } => envelope.add_to_set(*field, identity),
        }
    }
}
