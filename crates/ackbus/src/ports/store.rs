//! Document store port (driven).
//!
//! The broker needs five things from a durable store: append, an atomic
//! find-and-modify, a snapshot query, an insert change feed, and an
//! expiry index. Every mutation the broker performs on a shared envelope
//! goes through `conditional_update`; the broker never reads and then
//! writes an envelope from client-side logic.

use crate::domain::{Envelope, EnvelopeFilter, EnvelopeId, EnvelopeUpdate};
use crate::error::StoreError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Kind of change carried by a feed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
}

/// One change-feed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub operation: OperationType,
    pub topic: String,
    pub envelope_id: EnvelopeId,
    /// Full post-change document; always present for inserts.
    pub full_document: Option<Envelope>,
}

impl ChangeEvent {
    /// Insert notification for a freshly appended envelope.
    #[must_use]
    pub fn insert(envelope: Envelope) -> Self {
        Self {
            operation: OperationType::Insert,
            topic: envelope.topic.clone(),
            envelope_id: envelope.id,
            full_document: Some(envelope),
        }
    }

    /// Update notification carrying the post-mutation document.
    #[must_use]
    pub fn update(envelope: Envelope) -> Self {
        Self {
            operation: OperationType::Update,
            topic: envelope.topic.clone(),
            envelope_id: envelope.id,
            full_document: Some(envelope),
        }
    }

    /// Delete notification.
    #[must_use]
    pub fn delete(topic: impl Into<String>, envelope_id: EnvelopeId) -> Self {
        Self {
            operation: OperationType::Delete,
            topic: topic.into(),
            envelope_id,
            full_document: None,
        }
    }
}

/// Tailing stream of notifications. Dropping it closes the feed.
pub type ChangeFeed = Pin<Box<dyn Stream<Item = Result<ChangeEvent, StoreError>> + Send>>;

/// TTL index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryIndex {
    pub name: String,
    /// Timestamp field the store expires on.
    pub field: String,
    /// Grace period after `field` before deletion.
    pub expire_after_secs: u64,
}

impl Default for ExpiryIndex {
    fn default() -> Self {
        Self {
            name: crate::EXPIRY_INDEX_NAME.to_string(),
            field: crate::EXPIRY_FIELD.to_string(),
            expire_after_secs: 0,
        }
    }
}

/// Durable envelope store, scoped to one database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Durable insert. Returns the envelope id once the write is confirmed.
    async fn append(&self, topic: &str, envelope: Envelope) -> Result<EnvelopeId, StoreError>;

    /// Atomic find-and-modify on a single document.
    ///
    /// Returns the post-mutation document only if `filter` matched.
    async fn conditional_update(
        &self,
        topic: &str,
        filter: &EnvelopeFilter,
        update: &EnvelopeUpdate,
    ) -> Result<Option<Envelope>, StoreError>;

    /// Point-in-time snapshot of matching envelopes.
    async fn query(&self, topic: &str, filter: &EnvelopeFilter)
        -> Result<Vec<Envelope>, StoreError>;

    /// Open a tailing change feed on the topic.
    async fn change_feed(&self, topic: &str) -> Result<ChangeFeed, StoreError>;

    /// Create the TTL index. Reports [`StoreError::IndexExists`] if it is
    /// already there; callers treat that as success.
    async fn ensure_expiry_index(&self, topic: &str, index: &ExpiryIndex)
        -> Result<(), StoreError>;
}
