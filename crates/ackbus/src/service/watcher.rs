//! # Change Feed Watcher
//!
//! One long-lived task per subscription. It tails the topic's change feed
//! and pushes each inserted envelope through the delivery pipeline, one at
//! a time, in feed order.
//!
//! ## Reconnect Loop
//!
//! ```text
//! open feed ──ok──→ [catch-up scan if retrying] ──→ drain ──feed lost──┐
//!     ↑  │                                                            │
//!     │  └──err──────────────────────────────────────────────────────→┤
//!     │                                                               ↓
//!     └──────────── sleep(backoff) ←── attempts left? ──no──→ [HALTED]
//! ```
//!
//! Only consecutive failed reopens count toward `max_attempts`: a reopen
//! whose catch-up scan succeeds clears the count, and the delay drops back
//! to the base once a feed delivers a notification. Shutdown is observed
//! while opening, draining and sleeping.

use super::subscription::StatusCell;
use super::{stopped, BrokerContext, DeliveryPipeline, RecoveryScanner};
use crate::domain::{Backoff, WatchEvent};
use crate::error::{BrokerError, StoreError};
use crate::ports::{ChangeFeed, OperationType};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

enum Drained {
    Stopped,
    Lost(BrokerError),
}

pub struct ChangeFeedWatcher {
    ctx: Arc<BrokerContext>,
    pipeline: Arc<DeliveryPipeline>,
    scanner: Arc<RecoveryScanner>,
    topic: String,
    status: Arc<StatusCell>,
}

impl ChangeFeedWatcher {
    pub fn new(
        ctx: Arc<BrokerContext>,
        pipeline: Arc<DeliveryPipeline>,
        scanner: Arc<RecoveryScanner>,
        topic: impl Into<String>,
        status: Arc<StatusCell>,
    ) -> Self {
        Self {
            ctx,
            pipeline,
            scanner,
            topic: topic.into(),
            status,
        }
    }

    /// Watch until shutdown or until retries are exhausted.
    ///
    /// `first_attempt` fires once the first feed open has been tried,
    /// whatever its outcome. Returns `WatcherHalted` if the watcher gave up.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        first_attempt: oneshot::Sender<()>,
    ) -> Result<(), BrokerError> {
        let topic = self.topic.as_str();
        let mut backoff = Backoff::new(self.ctx.config.reconnect);
        let mut first_attempt = Some(first_attempt);
        let mut retrying = false;

        loop {
            let opened = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                opened = self.ctx.store.change_feed(topic) => opened,
            };
            if opened.is_ok() {
                self.status.apply(WatchEvent::FeedOpened);
            }
            if let Some(signal) = first_attempt.take() {
                let _ = signal.send(());
            }

            match opened {
                Ok(feed) => {
                    info!(topic, identity = %self.ctx.identity, retrying, "Change feed opened");

                    // Inserts made while no feed was open are only found by a scan
                    let mut healthy = true;
                    if retrying {
                        self.ctx.metrics.record_reconnect();
                        if self.ctx.config.recover_on_reconnect {
                            tokio::select! {
                                _ = stopped(&mut shutdown) => break,
                                result = self.scanner.scan(topic) => {
                                    if let Err(e) = result {
                                        warn!(topic, error = %e, "Catch-up scan after reconnect failed");
                                        healthy = false;
                                    }
                                }
                            }
                        }
                    }
                    if healthy {
                        backoff.record_success();
                    }
                    retrying = true;

                    match self.drain(feed, &mut shutdown, &mut backoff).await {
                        Drained::Stopped => break,
                        Drained::Lost(e) => warn!(topic, error = %e, "Change feed lost"),
                    }
                }
                Err(source) => {
                    let e = BrokerError::Transport {
                        topic: topic.to_string(),
                        source,
                    };
                    warn!(topic, error = %e, "Opening change feed failed");
                    retrying = true;
                }
            }

            let state = self.status.apply(WatchEvent::FeedLost);
            let delay = backoff.next_delay();
            if backoff.is_exhausted() {
                self.status.apply(WatchEvent::RetriesExhausted);
                return Err(BrokerError::WatcherHalted {
                    topic: topic.to_string(),
                    attempts: backoff.failures(),
                });
            }
            debug!(topic, ?state, delay_ms = delay.as_millis() as u64, "Reconnecting change feed");

            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.apply(WatchEvent::Stop);
        debug!(topic, "Change feed watcher stopped");
        Ok(())
    }

    async fn drain(
        &self,
        mut feed: ChangeFeed,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> Drained {
        let topic = self.topic.as_str();
        let identity = self.ctx.identity.as_str();

        loop {
            let next = tokio::select! {
                _ = stopped(shutdown) => return Drained::Stopped,
                next = feed.next() => next,
            };

            let event = match next {
                None => return Drained::Lost(self.transport(StoreError::Transport(
                    "change feed closed".to_string(),
                ))),
                Some(Err(e)) => return Drained::Lost(self.transport(e)),
                Some(Ok(event)) => event,
            };
            backoff.reset();

            if event.operation != OperationType::Insert {
                continue;
            }
            let Some(envelope) = event.full_document else {
                warn!(topic, envelope_id = %event.envelope_id, "Insert notification without a document");
                continue;
            };
            if envelope.is_acked_by(identity) {
                continue;
            }

            let envelope_id = envelope.id;
            // Sequential by construction: the next notification is not
            // read until this delivery settles.
            match self.pipeline.deliver(topic, envelope).await {
                Ok(delivery) => debug!(topic, %envelope_id, ?delivery, "Feed delivery settled"),
                // Left unacked for the next scan
                Err(e) if e.is_item_scoped() => {
                    debug!(topic, %envelope_id, error = %e, "Feed delivery failed");
                }
                Err(e) => warn!(topic, %envelope_id, error = %e, "Feed delivery aborted"),
            }
        }
    }

    fn transport(&self, source: StoreError) -> BrokerError {
        BrokerError::Transport {
            topic: self.topic.clone(),
            source,
        }
    }
}
