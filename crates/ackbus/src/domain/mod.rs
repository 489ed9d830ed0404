//! Domain Layer - pure types and state machines
//!
//! This layer contains:
//! - The persisted `Envelope` and its identifiers
//! - Store predicates and mutations over envelopes
//! - Execution and cluster strategies
//! - Reconnect backoff
//! - Subscription lifecycle state machine
//! - In-process delivery ledger
//!
//! RULES:
//! - No I/O operations
//! - No async code

pub mod backoff;
pub mod envelope;
pub mod ledger;
pub mod query;
pub mod state;
pub mod strategy;

pub use backoff::{Backoff, ReconnectPolicy};
pub use envelope::{Envelope, EnvelopeId, SetField, Timestamp};
pub use ledger::DeliveryLedger;
pub use query::{EnvelopeFilter, EnvelopeUpdate};
pub use state::{SubscriptionPhase, WatchEvent, WatchState};
pub use strategy::{ClusterStrategy, ExecutionStrategy};
