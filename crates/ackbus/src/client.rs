//! # Client
//!
//! The public face of the broker. A client is bound to one store database
//! and one subscriber identity, and orchestrates everything else:
//!
//! - `publish` delegates to the [`Publisher`]
//! - the first `subscribe` on a topic starts exactly one watch task and
//!   one recovery task, which provisions the expiry index before scanning
//! - later `subscribe` calls on the topic only add handlers
//! - `unsubscribe` stops both tasks and closes the feed
//!
//! Clients are cheap to clone. Dropping the last clone unsubscribes
//! every topic.

use crate::adapters::{connect_store, JsonCodec};
use crate::config::BrokerConfig;
use crate::domain::{EnvelopeId, SubscriptionPhase};
use crate::error::{BrokerError, BrokerResult, StoreError};
use crate::metrics::MetricsSnapshot;
use crate::ports::{handler_fn, DocumentStore, ExpiryIndex, Handler, PayloadCodec};
use crate::service::subscription::{NewSubscription, Registration};
use crate::service::{
    stopped, BrokerContext, ChangeFeedWatcher, DeliveryPipeline, Publisher, RecoveryReport,
    RecoveryScanner, Registry, SubscriptionStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// What a `subscribe` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// New subscription; recovery has run.
    Started(RecoveryReport),
    /// Handler added to a live subscription.
    Attached { handlers: usize },
}

/// Pub/sub client over a document store.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    ctx: Arc<BrokerContext>,
    registry: Arc<Registry>,
    pipeline: Arc<DeliveryPipeline>,
    scanner: Arc<RecoveryScanner>,
    publisher: Publisher,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let stopped = self.registry.remove_all();
        if stopped > 0 {
            debug!(identity = %self.ctx.identity, stopped, "Client dropped, subscriptions stopped");
        }
    }
}

impl Client {
    /// Connect to `uri`, open `database`, and subscribe as `identity`.
    ///
    /// Configuration comes from the environment (see [`BrokerConfig::from_env`]).
    pub fn connect(uri: &str, database: &str, identity: &str) -> BrokerResult<Self> {
        Self::connect_with(uri, database, identity, BrokerConfig::from_env())
    }

    /// [`Client::connect`] with explicit configuration.
    pub fn connect_with(
        uri: &str,
        database: &str,
        identity: &str,
        config: BrokerConfig,
    ) -> BrokerResult<Self> {
        let store = connect_store(uri, database)?;
        info!(uri, database, identity, "Connecting client");
        Self::builder(store, identity).config(config).build()
    }

    /// Build a client over any [`DocumentStore`].
    pub fn builder(store: Arc<dyn DocumentStore>, identity: &str) -> ClientBuilder {
        ClientBuilder {
            store,
            identity: identity.to_string(),
            codec: Arc::new(JsonCodec),
            config: BrokerConfig::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.ctx.identity
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.ctx.config
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Publish with the default TTL. Returns once the store confirms the write.
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> BrokerResult<EnvelopeId> {
        self.inner.publisher.publish(topic, payload, None).await
    }

    /// Publish with an explicit TTL.
    pub async fn publish_with_ttl<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
        ttl: Duration,
    ) -> BrokerResult<EnvelopeId> {
        self.inner.publisher.publish(topic, payload, Some(ttl)).await
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Register an async callback for `topic`. Payloads are decoded into `T`.
    ///
    /// For a new topic this completes once the recovery scan has run.
    pub async fn subscribe<T, F, Fut>(&self, topic: &str, callback: F) -> BrokerResult<SubscribeOutcome>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_handler(topic, handler_fn(callback)).await
    }

    /// Register a type-erased handler for `topic`.
    ///
    /// Resolves `Cancelled` if the topic is unsubscribed before recovery
    /// finishes. A failed recovery query is returned as an error, but the
    /// subscription stays live and its watcher keeps running.
    pub async fn subscribe_handler(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
    ) -> BrokerResult<SubscribeOutcome> {
        let payload_type = handler.payload_type();
        let new = match self.inner.registry.register(topic, handler) {
            Registration::Attached { handlers } => {
                info!(topic, handlers, payload_type, "Handler added to live subscription");
                return Ok(SubscribeOutcome::Attached { handlers });
            }
            Registration::Created(new) => new,
        };
        info!(topic, identity = %self.identity(), payload_type, "Subscription created");

        // No await between register and spawn: a dropped caller still
        // leaves a running subscription behind.
        let recovery = self.start_tasks(topic, new);

        match recovery.await {
            Ok(Ok(report)) => Ok(SubscribeOutcome::Started(report)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BrokerError::Cancelled {
                topic: topic.to_string(),
            }),
        }
    }

    /// Spawn the watcher, then the recovery task gated on the watcher's
    /// first feed-open attempt. The recovery task provisions the expiry
    /// index before scanning. Returns the recovery result channel.
    fn start_tasks(
        &self,
        topic: &str,
        new: NewSubscription,
    ) -> oneshot::Receiver<BrokerResult<RecoveryReport>> {
        let inner = &self.inner;
        let (first_attempt_tx, first_attempt_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let watcher = ChangeFeedWatcher::new(
            inner.ctx.clone(),
            inner.pipeline.clone(),
            inner.scanner.clone(),
            topic,
            new.status.clone(),
        );
        let watch_shutdown = new.shutdown.clone();
        let watch_topic = topic.to_string();
        let watch_task = tokio::spawn(async move {
            match watcher.run(watch_shutdown, first_attempt_tx).await {
                Ok(()) => {}
                Err(e @ BrokerError::WatcherHalted { .. }) => {
                    error!(topic = %watch_topic, error = %e, "Change feed watcher halted; resubscribe to restart");
                }
                Err(e) => warn!(topic = %watch_topic, error = %e, "Change feed watcher failed"),
            }
        });

        let store = inner.ctx.store.clone();
        let scanner = inner.scanner.clone();
        let status = new.status.clone();
        let mut shutdown = new.shutdown.clone();
        let recovery_topic = topic.to_string();
        let recovery_task = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                _ = first_attempt_rx => {}
            }
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                _ = provision_expiry_index(store.as_ref(), &recovery_topic) => {}
            }
            let result = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                result = scanner.scan(&recovery_topic) => result,
            };
            status.set_recovering(false);
            if done_tx.send(result).is_err() {
                debug!(topic = %recovery_topic, "Recovery finished after the subscribe call was dropped");
            }
        });

        inner
            .registry
            .attach_tasks(topic, new.generation, vec![watch_task, recovery_task]);
        done_rx
    }

    // =========================================================================
    // UNSUBSCRIBE
    // =========================================================================

    /// Stop a topic's recovery and watch tasks and drop its handlers.
    /// Returns `false` if the topic was not subscribed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.inner.registry.remove(topic)
    }

    /// Unsubscribe every topic. Returns how many were live.
    pub fn unsubscribe_all(&self) -> usize {
        self.inner.registry.remove_all()
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    pub fn status(&self, topic: &str) -> Option<SubscriptionStatus> {
        self.inner.registry.status(topic)
    }

    /// Subscribed topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.inner.registry.topics()
    }

    /// Whether any subscription still has recovery pending.
    pub fn is_recovering(&self) -> bool {
        self.inner.registry.statuses().iter().any(|s| s.recovering)
    }

    /// Whether any subscription has a live watcher.
    pub fn is_watching(&self) -> bool {
        self.inner
            .registry
            .statuses()
            .iter()
            .any(|s| s.watch.is_active())
    }

    /// Phase of one topic's subscription.
    pub fn phase(&self, topic: &str) -> Option<SubscriptionPhase> {
        self.status(topic).map(|s| s.phase())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.ctx.metrics.snapshot()
    }
}

async fn provision_expiry_index(store: &dyn DocumentStore, topic: &str) {
    let index = ExpiryIndex::default();
    match store.ensure_expiry_index(topic, &index).await {
        Ok(()) => debug!(topic, index = %index.name, "Expiry index created"),
        Err(StoreError::IndexExists { .. }) => {}
        Err(e) => warn!(topic, error = %e, "Could not provision expiry index"),
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    store: Arc<dyn DocumentStore>,
    identity: String,
    codec: Arc<dyn PayloadCodec>,
    config: BrokerConfig,
}

impl ClientBuilder {
    #[must_use]
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn build(self) -> BrokerResult<Client> {
        if self.identity.trim().is_empty() {
            return Err(BrokerError::Config("identity cannot be empty".to_string()));
        }
        self.config.validate()?;

        let ctx = Arc::new(BrokerContext::new(
            self.store,
            self.codec,
            self.identity,
            self.config,
        ));
        let registry = Arc::new(Registry::new());
        let pipeline = Arc::new(DeliveryPipeline::new(ctx.clone(), registry.clone()));
        let scanner = Arc::new(RecoveryScanner::new(ctx.clone(), pipeline.clone()));

        Ok(Client {
            inner: Arc::new(ClientInner {
                publisher: Publisher::new(ctx.clone()),
                ctx,
                registry,
                pipeline,
                scanner,
            }),
        })
    }
}
