//! # Claim Coordinator
//!
//! Competing-consumer exclusion built from one conditional update:
//! "append my identity to `claimed_by` if it is not already there".
//!
//! The claim key is the subscriber identity, not a process id. Processes
//! sharing an identity race for the same update and the store lets exactly
//! one of them win. Distinct identities never contend.

use super::BrokerContext;
use crate::domain::{Envelope, EnvelopeFilter, EnvelopeUpdate};
use crate::error::{BrokerError, BrokerResult};
use std::sync::Arc;
use tracing::warn;

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Cluster strategy is `None`; dispatch unconditionally.
    NotRequired,
    /// This identity won; carries the post-claim document.
    Won(Envelope),
    /// Already claimed by this identity, or the envelope is gone.
    Lost,
}

pub struct ClaimCoordinator {
    ctx: Arc<BrokerContext>,
}

impl ClaimCoordinator {
    pub fn new(ctx: Arc<BrokerContext>) -> Self {
        Self { ctx }
    }

    /// Attempt the claim for `envelope` under the configured cluster strategy.
    ///
    /// A store error is a failed attempt, never a lost claim.
    pub async fn claim(&self, topic: &str, envelope: &Envelope) -> BrokerResult<Claim> {
        if !self.ctx.config.cluster_strategy.requires_claim() {
            return Ok(Claim::NotRequired);
        }

        let identity = self.ctx.identity.as_str();
        let filter = EnvelopeFilter::id(envelope.id).and(EnvelopeFilter::not_claimed_by(identity));
        let update = EnvelopeUpdate::claim(identity);

        let claimed = self
            .ctx
            .store
            .conditional_update(topic, &filter, &update)
            .await
            .map_err(|e| {
                warn!(topic, envelope_id = %envelope.id, identity, error = %e, "Claim attempt failed");
                BrokerError::Store(e)
            })?;

        self.ctx.metrics.record_claim(claimed.is_some());
        Ok(match claimed {
            Some(doc) => Claim::Won(doc),
            None => Claim::Lost,
        })
    }
}
