//! # Recovery Scanner
//!
//! One-shot catch-up: every envelope on the topic not yet acked by this
//! identity goes through the delivery pipeline, oldest first, with at most
//! `recovery_concurrency` in flight. A change feed only sees inserts made
//! while it is open; this scan covers everything before that.

use super::{BrokerContext, Delivery, DeliveryPipeline};
use crate::domain::EnvelopeFilter;
use crate::error::{BrokerError, BrokerResult};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-scan tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Unacked envelopes the query returned.
    pub found: usize,
    pub delivered: usize,
    /// Claim lost, duplicate or already acked.
    pub skipped: usize,
    /// Decode, handler, claim or ack failures; left for a later attempt.
    pub failed: usize,
}

impl RecoveryReport {
    fn record(&mut self, outcome: &BrokerResult<Delivery>) {
        match outcome {
            Ok(Delivery::Delivered) => self.delivered += 1,
            Ok(_) => self.skipped += 1,
            Err(e) => {
                if !e.is_item_scoped() {
                    warn!(error = %e, "Recovery delivery aborted");
                }
                self.failed += 1;
            }
        }
    }
}

pub struct RecoveryScanner {
    ctx: Arc<BrokerContext>,
    pipeline: Arc<DeliveryPipeline>,
}

impl RecoveryScanner {
    pub fn new(ctx: Arc<BrokerContext>, pipeline: Arc<DeliveryPipeline>) -> Self {
        Self { ctx, pipeline }
    }

    /// Scan `topic` once. Only the query itself can fail the scan; item
    /// failures are counted in the report.
    pub async fn scan(&self, topic: &str) -> BrokerResult<RecoveryReport> {
        let identity = self.ctx.identity.as_str();
        let mut pending = self
            .ctx
            .store
            .query(topic, &EnvelopeFilter::not_acked_by(identity))
            .await
            .map_err(|e| {
                warn!(topic, identity, error = %e, "Recovery query failed");
                BrokerError::Store(e)
            })?;
        pending.sort_by_key(|envelope| envelope.created_at);

        let found = pending.len();
        self.ctx.metrics.record_recovered(found);
        debug!(topic, identity, found, "Recovery scan started");

        let report = stream::iter(pending)
            .map(|envelope| self.pipeline.deliver(topic, envelope))
            .buffered(self.ctx.config.recovery_concurrency.max(1))
            .fold(
                RecoveryReport {
                    found,
                    ..RecoveryReport::default()
                },
                |mut report, outcome| async move {
                    report.record(&outcome);
                    report
                },
            )
            .await;

        info!(
            topic,
            identity,
            found = report.found,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Recovery scan finished"
        );
        Ok(report)
    }
}
