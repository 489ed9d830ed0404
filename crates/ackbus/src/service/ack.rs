//! Acknowledgment writer.

use super::BrokerContext;
use crate::domain::{EnvelopeFilter, EnvelopeId, EnvelopeUpdate};
use crate::error::{BrokerError, BrokerResult};
use ackbus_telemetry::log_delivery;
use std::sync::Arc;

/// Records that an identity finished an envelope. Set-insert, so repeated
/// acks are no-ops after the first.
pub struct AckWriter {
    ctx: Arc<BrokerContext>,
}

impl AckWriter {
    pub fn new(ctx: Arc<BrokerContext>) -> Self {
        Self { ctx }
    }

    /// Add `identity` to the envelope's `acked_by`.
    ///
    /// `Ok(false)` means the envelope no longer exists.
    pub async fn ack(&self, topic: &str, id: EnvelopeId, identity: &str) -> BrokerResult<bool> {
        let result = self
            .ctx
            .store
            .conditional_update(topic, &EnvelopeFilter::id(id), &EnvelopeUpdate::ack(identity))
            .await;

        match result {
            Ok(found) => {
                self.ctx.metrics.record_ack(true);
                if found.is_some() {
                    log_delivery!(debug, "Envelope acked", topic, id, identity);
                } else {
                    log_delivery!(debug, "Acked envelope no longer exists", topic, id, identity);
                }
                Ok(found.is_some())
            }
            Err(e) => {
                self.ctx.metrics.record_ack(false);
                log_delivery!(warn, "Ack failed", topic, id, identity, error = %e);
                Err(BrokerError::Store(e))
            }
        }
    }
}
