//! # In-Memory Document Store
//!
//! Reference implementation of the [`DocumentStore`] port.
//!
//! - One mutex per database serializes every mutation, which gives
//!   `conditional_update` the same single-document atomicity a real store
//!   provides.
//! - Change feeds are `tokio::sync::broadcast` receivers per collection.
//! - With an expiry index present, documents past `expire_at` are swept
//!   before every operation.
//! - Fault injection hooks let tests sever feeds and take the store down.
//!
//! Several clients sharing one `InMemoryStore` behave like several processes
//! sharing one database server.

use crate::domain::{Envelope, EnvelopeFilter, EnvelopeId, EnvelopeUpdate, Timestamp};
use crate::error::StoreError;
use crate::ports::{ChangeEvent, ChangeFeed, DocumentStore, ExpiryIndex};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// Notifications buffered per feed before a slow reader lags.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// A process-local store holding any number of databases.
#[derive(Clone)]
pub struct InMemoryStore {
    databases: Arc<Mutex<HashMap<String, Arc<DatabaseState>>>>,
    feed_capacity: usize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    #[must_use]
    pub fn with_feed_capacity(feed_capacity: usize) -> Self {
        Self {
            databases: Arc::new(Mutex::new(HashMap::new())),
            feed_capacity: feed_capacity.max(1),
        }
    }

    /// Handle to a database, created on first use.
    #[must_use]
    pub fn database(&self, name: &str) -> InMemoryDatabase {
        let mut databases = self.databases.lock();
        let state = databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DatabaseState::new(self.feed_capacity)))
            .clone();
        InMemoryDatabase {
            name: name.to_string(),
            state,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct DatabaseState {
    collections: Mutex<HashMap<String, Collection>>,
    feed_capacity: usize,
    reads_available: AtomicBool,
    writes_available: AtomicBool,
    feeds_available: AtomicBool,
}

impl DatabaseState {
    fn new(feed_capacity: usize) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            feed_capacity,
            reads_available: AtomicBool::new(true),
            writes_available: AtomicBool::new(true),
            feeds_available: AtomicBool::new(true),
        }
    }
}

struct Collection {
    /// Insertion order.
    documents: Vec<Envelope>,
    expiry: Option<ExpiryIndex>,
    feed: broadcast::Sender<ChangeEvent>,
}

impl Collection {
    fn new(feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity);
        Self {
            documents: Vec::new(),
            expiry: None,
            feed,
        }
    }

    fn notify(&self, event: ChangeEvent) {
        // No open feeds is fine
        let _ = self.feed.send(event);
    }

    fn sweep(&mut self, topic: &str, now: Timestamp) -> usize {
        let Some(index) = &self.expiry else {
            return 0;
        };
        let grace = Duration::from_secs(index.expire_after_secs);

        let mut expired = Vec::new();
        self.documents.retain(|doc| {
            let keep = !doc.expire_at.saturating_add(grace).has_passed(now);
            if !keep {
                expired.push(doc.id);
            }
            keep
        });
        for id in &expired {
            self.notify(ChangeEvent::delete(topic, *id));
        }
        expired.len()
    }
}

/// A database inside an [`InMemoryStore`].
#[derive(Clone)]
pub struct InMemoryDatabase {
    name: String,
    state: Arc<DatabaseState>,
}

impl InMemoryDatabase {
    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{what} unavailable")))
        }
    }

    fn with_collection<R>(&self, topic: &str, f: impl FnOnce(&mut Collection) -> R) -> R {
        let mut collections = self.state.collections.lock();
        let collection = collections
            .entry(topic.to_string())
            .or_insert_with(|| Collection::new(self.state.feed_capacity));
        let swept = collection.sweep(topic, Timestamp::now());
        if swept > 0 {
            debug!(database = %self.name, topic, swept, "Expired envelopes removed");
        }
        f(collection)
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    /// Snapshot of every live document on a topic.
    #[must_use]
    pub fn documents(&self, topic: &str) -> Vec<Envelope> {
        self.with_collection(topic, |c| c.documents.clone())
    }

    /// A single document by id.
    #[must_use]
    pub fn get(&self, topic: &str, id: EnvelopeId) -> Option<Envelope> {
        self.with_collection(topic, |c| c.documents.iter().find(|d| d.id == id).cloned())
    }

    /// Number of open change feeds on a topic.
    #[must_use]
    pub fn open_feeds(&self, topic: &str) -> usize {
        self.with_collection(topic, |c| c.feed.receiver_count())
    }

    /// Whether the topic has an expiry index.
    #[must_use]
    pub fn has_expiry_index(&self, topic: &str) -> bool {
        self.with_collection(topic, |c| c.expiry.is_some())
    }

    /// Insert a document directly, bypassing the write-availability switch.
    pub fn seed(&self, envelope: Envelope) {
        let topic = envelope.topic.clone();
        self.with_collection(&topic, |c| {
            c.documents.push(envelope.clone());
            c.notify(ChangeEvent::insert(envelope));
        });
    }

    // =========================================================================
    // FAULT INJECTION
    // =========================================================================

    /// Close every open feed on the topic, as a dropped connection would.
    pub fn sever_feeds(&self, topic: &str) {
        self.with_collection(topic, |c| {
            let (feed, _) = broadcast::channel(self.state.feed_capacity);
            c.feed = feed;
        });
        debug!(database = %self.name, topic, "Change feeds severed");
    }

    /// Make `change_feed` fail (or succeed again).
    pub fn set_feeds_available(&self, available: bool) {
        self.state.feeds_available.store(available, Ordering::SeqCst);
    }

    /// Make mutations fail (or succeed again).
    pub fn set_writes_available(&self, available: bool) {
        self.state.writes_available.store(available, Ordering::SeqCst);
    }

    /// Make queries fail (or succeed again).
    pub fn set_reads_available(&self, available: bool) {
        self.state.reads_available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDatabase {
    async fn append(&self, topic: &str, envelope: Envelope) -> Result<EnvelopeId, StoreError> {
        Self::check(&self.state.writes_available, "writes")?;

        self.with_collection(topic, |c| {
            if c.documents.iter().any(|d| d.id == envelope.id) {
                return Err(StoreError::Backend(format!(
                    "duplicate envelope id {}",
                    envelope.id
                )));
            }
            let id = envelope.id;
            c.documents.push(envelope.clone());
            c.notify(ChangeEvent::insert(envelope));
            Ok(id)
        })
    }

    async fn conditional_update(
        &self,
        topic: &str,
        filter: &EnvelopeFilter,
        update: &EnvelopeUpdate,
    ) -> Result<Option<Envelope>, StoreError> {
        Self::check(&self.state.writes_available, "writes")?;

        Ok(self.with_collection(topic, |c| {
            let doc = c.documents.iter_mut().find(|d| filter.matches(d))?;
            let changed = update.apply(doc);
            let after = doc.clone();
            if changed {
                c.notify(ChangeEvent::update(after.clone()));
            }
            Some(after)
        }))
    }

    async fn query(
        &self,
        topic: &str,
        filter: &EnvelopeFilter,
    ) -> Result<Vec<Envelope>, StoreError> {
        Self::check(&self.state.reads_available, "reads")?;

        Ok(self.with_collection(topic, |c| {
            c.documents
                .iter()
                .filter(|d| filter.matches(d))
                .cloned()
                .collect()
        }))
    }

    async fn change_feed(&self, topic: &str) -> Result<ChangeFeed, StoreError> {
        Self::check(&self.state.feeds_available, "change feeds")?;

        let receiver = self.with_collection(topic, |c| c.feed.subscribe());
        let stream = BroadcastStream::new(receiver).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(missed)| {
                StoreError::Transport(format!("change feed lagged by {missed} events"))
            })
        });
        Ok(Box::pin(stream))
    }

    async fn ensure_expiry_index(
        &self,
        topic: &str,
        index: &ExpiryIndex,
    ) -> Result<(), StoreError> {
        Self::check(&self.state.writes_available, "writes")?;

        self.with_collection(topic, |c| match &c.expiry {
            Some(existing) if existing.name == index.name => Err(StoreError::IndexExists {
                topic: topic.to_string(),
                name: index.name.clone(),
            }),
            _ => {
                c.expiry = Some(index.clone());
                Ok(())
            }
        })
    }
}
