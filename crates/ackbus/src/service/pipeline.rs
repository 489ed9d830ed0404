//! # Delivery Pipeline
//!
//! The single path every discovered envelope takes, whether it came from a
//! recovery scan or the change feed:
//!
//! ```text
//! route ─→ ledger.begin ─→ bind (decode) ─→ claim ─→ execute ─→ ack ─→ ledger.complete
//! ```
//!
//! Per-item failures are logged here and returned to the caller, which
//! only counts them. A failed attempt is released from the ledger so the
//! envelope stays redeliverable.

use super::{AckWriter, BrokerContext, Claim, ClaimCoordinator, Executor, Registry};
use crate::domain::Envelope;
use crate::error::{BrokerError, BrokerResult};
use crate::ports::{Handler, HandlerCall};
use ackbus_telemetry::log_delivery;
use std::sync::Arc;

/// Successful outcomes of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handlers ran and the ack was written.
    Delivered,
    /// Another process with this identity owns the envelope, or it expired.
    ClaimLost,
    /// This client already has the envelope in flight or done.
    Duplicate,
    /// The identity had already acked it.
    AlreadyAcked,
}

pub struct DeliveryPipeline {
    ctx: Arc<BrokerContext>,
    registry: Arc<Registry>,
    claims: ClaimCoordinator,
    acks: AckWriter,
    executor: Executor,
}

impl DeliveryPipeline {
    pub fn new(ctx: Arc<BrokerContext>, registry: Arc<Registry>) -> Self {
        let executor = Executor::new(ctx.config.execution_strategy, ctx.config.handler_timeout);
        Self {
            claims: ClaimCoordinator::new(ctx.clone()),
            acks: AckWriter::new(ctx.clone()),
            executor,
            registry,
            ctx,
        }
    }

    /// Run one envelope through claim, dispatch and ack.
    pub async fn deliver(&self, topic: &str, envelope: Envelope) -> BrokerResult<Delivery> {
        let identity = self.ctx.identity.as_str();
        if envelope.is_acked_by(identity) {
            return Ok(Delivery::AlreadyAcked);
        }

        let Some(route) = self.registry.route(topic) else {
            log_delivery!(warn, "Dispatch reached an unregistered topic", topic, envelope.id, identity);
            return Err(BrokerError::TopicNotRegistered {
                topic: topic.to_string(),
            });
        };

        if !route.ledger.lock().begin(envelope.id) {
            self.ctx.metrics.record_duplicate();
            log_delivery!(debug, "Duplicate sighting suppressed", topic, envelope.id, identity);
            return Ok(Delivery::Duplicate);
        }

        let result = self.attempt(topic, &route.handlers, &envelope).await;

        let mut ledger = route.ledger.lock();
        match &result {
            Ok(_) | Err(BrokerError::ClaimLost { .. }) => ledger.complete(envelope.id, envelope.expire_at),
            Err(_) => ledger.release(envelope.id),
        }
        drop(ledger);

        match result {
            Err(BrokerError::ClaimLost { .. }) => {
                log_delivery!(debug, "Claim lost, skipping", topic, envelope.id, identity);
                Ok(Delivery::ClaimLost)
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        topic: &str,
        handlers: &[Arc<dyn Handler>],
        envelope: &Envelope,
    ) -> BrokerResult<Delivery> {
        let identity = self.ctx.identity.as_str();
        let calls = self.bind(topic, handlers, envelope)?;

        if let Claim::Lost = self.claims.claim(topic, envelope).await? {
            return Err(BrokerError::ClaimLost {
                topic: topic.to_string(),
                envelope_id: envelope.id,
            });
        }

        self.ctx.metrics.record_dispatched();
        let report = self.executor.run(calls).await;
        if let Err(e) = report.into_result(topic) {
            self.ctx.metrics.record_handler_failure();
            log_delivery!(error, "Handlers failed, envelope left unacked", topic, envelope.id, identity, error = %e);
            return Err(e);
        }

        self.acks.ack(topic, envelope.id, identity).await?;
        Ok(Delivery::Delivered)
    }

    /// Decode the payload once per handler. Any handler that cannot decode
    /// it fails the whole envelope before a claim is spent.
    fn bind(
        &self,
        topic: &str,
        handlers: &[Arc<dyn Handler>],
        envelope: &Envelope,
    ) -> BrokerResult<Vec<HandlerCall>> {
        handlers
            .iter()
            .map(|handler| {
                handler
                    .bind(&envelope.payload, self.ctx.codec.as_ref())
                    .map_err(|source| {
                        self.ctx.metrics.record_decode_error();
                        log_delivery!(
                            warn,
                            "Payload decode failed, skipping",
                            topic,
                            envelope.id,
                            self.ctx.identity,
                            payload_type = handler.payload_type(),
                            error = %source
                        );
                        BrokerError::Decode {
                            topic: topic.to_string(),
                            source,
                        }
                    })
            })
            .collect()
    }
}
