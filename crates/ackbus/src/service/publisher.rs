//! # Publisher
//!
//! Appends new envelopes to a topic. No deduplication: every call produces a
//! fresh envelope with a fresh id. Store errors surface to the caller and
//! are never retried here.

use super::BrokerContext;
use crate::domain::{Envelope, EnvelopeId};
use crate::error::{BrokerError, BrokerResult};
use crate::ports::encode_payload;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Publisher {
    ctx: Arc<BrokerContext>,
}

impl Publisher {
    pub fn new(ctx: Arc<BrokerContext>) -> Self {
        Self { ctx }
    }

    /// Encode `payload` and append it. `ttl` defaults to the configured TTL.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
        ttl: Option<Duration>,
    ) -> BrokerResult<EnvelopeId> {
        let bytes = encode_payload(self.ctx.codec.as_ref(), payload)?;
        self.publish_bytes(topic, bytes, ttl).await
    }

    /// Append an already encoded payload.
    pub async fn publish_bytes(
        &self,
        topic: &str,
        payload: Vec<u8>,
        ttl: Option<Duration>,
    ) -> BrokerResult<EnvelopeId> {
        let ttl = ttl.unwrap_or(self.ctx.config.default_ttl);
        let envelope = Envelope::new(topic, payload, ttl);

        let id = self
            .ctx
            .store
            .append(topic, envelope)
            .await
            .map_err(|e| {
                warn!(topic, error = %e, "Publish failed");
                BrokerError::Store(e)
            })?;

        self.ctx.metrics.record_published();
        debug!(topic, envelope_id = %id, ttl_secs = ttl.as_secs(), "Envelope published");
        Ok(id)
    }
}
