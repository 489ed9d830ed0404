//! Service Layer
//!
//! The delivery protocol, leaves first:
//! - `Publisher` appends envelopes
//! - `ClaimCoordinator` wins or loses the competing-consumer claim
//! - `Executor` fans an envelope out to every handler of its topic
//! - `AckWriter` records that an identity finished an envelope
//! - `DeliveryPipeline` chains claim, execute and ack for one envelope
//! - `RecoveryScanner` and `ChangeFeedWatcher` discover envelopes and feed the pipeline
//! - `Registry` owns the per-topic subscriptions

pub mod ack;
pub mod claim;
pub mod execution;
pub mod pipeline;
pub mod publisher;
pub mod recovery;
pub mod subscription;
pub mod watcher;

pub use ack::AckWriter;
pub use claim::{Claim, ClaimCoordinator};
pub use execution::{ExecutionReport, Executor};
pub use pipeline::{Delivery, DeliveryPipeline};
pub use publisher::Publisher;
pub use recovery::{RecoveryReport, RecoveryScanner};
pub use subscription::{Registry, SubscriptionStatus};
pub use watcher::ChangeFeedWatcher;

use crate::config::BrokerConfig;
use crate::metrics::BrokerMetrics;
use crate::ports::{DocumentStore, PayloadCodec};
use std::sync::Arc;
use tokio::sync::watch;

/// Everything a client's components share.
pub struct BrokerContext {
    pub store: Arc<dyn DocumentStore>,
    pub codec: Arc<dyn PayloadCodec>,
    /// Subscriber identity used for claims and acks.
    pub identity: String,
    pub config: BrokerConfig,
    pub metrics: Arc<BrokerMetrics>,
}

impl BrokerContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        codec: Arc<dyn PayloadCodec>,
        identity: impl Into<String>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            store,
            codec,
            identity: identity.into(),
            config,
            metrics: Arc::new(BrokerMetrics::new()),
        }
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
