//! # ackbus
//!
//! At-least-once publish/subscribe on top of a document store. Each topic
//! is a collection of envelopes; subscribers discover them through a
//! recovery scan plus a change feed, claim them, run their handlers and
//! record an ack.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure types and rules, no I/O
//!   - `Envelope`: The stored message and its ack/claim sets
//!   - `EnvelopeFilter` / `EnvelopeUpdate`: Store-neutral query language
//!   - `WatchState`: Watcher lifecycle state machine
//!   - `Backoff`: Jittered reconnect delays
//!   - `DeliveryLedger`: Per-instance duplicate suppression
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `DocumentStore`: Driven port for the backing store
//!   - `PayloadCodec`: Payload bytes to typed values
//!   - `Handler`: Type-erased subscriber callback
//!
//! - **Adapters Layer** (`adapters/`): In-memory store, JSON codec, URI connect
//!
//! - **Service Layer** (`service/`): Claim, execute, ack, recovery and watch
//!
//! ## Delivery
//!
//! ```text
//! publish ──→ [store] ──insert──→ change feed ──┐
//!                │                              ├──→ claim ──→ handlers ──→ ack
//!                └──── recovery scan (unacked) ─┘
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use ackbus::Client;
//!
//! let client = Client::connect("memory://local", "events", "billing-1")?;
//! client
//!     .subscribe("invoices", |invoice: Invoice| async move {
//!         process(invoice).await
//!     })
//!     .await?;
//! client.publish("invoices", &invoice).await?;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{
    connect_store, shared_memory_store, InMemoryDatabase, InMemoryStore, JsonCodec, StoreUri,
};
pub use client::{Client, ClientBuilder, SubscribeOutcome};
pub use config::{BrokerConfig, BrokerConfigBuilder, DEFAULT_RECOVERY_CONCURRENCY, DEFAULT_TTL};
pub use domain::{
    ClusterStrategy, Envelope, EnvelopeFilter, EnvelopeId, EnvelopeUpdate, ExecutionStrategy,
    ReconnectPolicy, SubscriptionPhase, Timestamp, WatchState,
};
pub use error::{BrokerError, BrokerResult, CodecError, StoreError};
pub use metrics::{BrokerMetrics, MetricsSnapshot};
pub use ports::{
    handler_fn, ChangeEvent, ChangeFeed, DocumentStore, ExpiryIndex, Handler, OperationType,
    PayloadCodec,
};
pub use service::{Delivery, RecoveryReport, SubscriptionStatus};

/// Name of the TTL index provisioned on every subscribed topic.
pub const EXPIRY_INDEX_NAME: &str = "expire";

/// Envelope field the TTL index expires on.
pub const EXPIRY_FIELD: &str = "expire_at";
