//! Error types for the broker.

use crate::domain::EnvelopeId;
use thiserror::Error;

/// Errors reported by a [`DocumentStore`](crate::ports::DocumentStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("index {name} already exists on {topic}")]
    IndexExists { topic: String, name: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from the payload codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("payload does not match {target}: {reason}")]
    TypeMismatch { target: &'static str, reason: String },
}

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Dispatch reached a topic with no live subscription.
    #[error("topic not registered: {topic}")]
    TopicNotRegistered { topic: String },

    /// Another process under the same identity won the claim, or the
    /// envelope is gone.
    #[error("claim lost for {envelope_id} on {topic}")]
    ClaimLost { topic: String, envelope_id: EnvelopeId },

    #[error("decode error on {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: CodecError,
    },

    #[error("{failed} of {total} handlers failed on {topic}: {first}")]
    HandlerFailure {
        topic: String,
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("transport error on {topic}: {source}")]
    Transport {
        topic: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported store uri: {0}")]
    UnsupportedUri(String),

    #[error("subscription to {topic} was cancelled")]
    Cancelled { topic: String },

    #[error("watcher for {topic} halted after {attempts} failed attempts")]
    WatcherHalted { topic: String, attempts: u32 },
}

impl BrokerError {
    /// Per-item failures that leave the envelope redeliverable and never
    /// abort the surrounding scan or feed.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::TopicNotRegistered { .. }
                | Self::ClaimLost { .. }
                | Self::Decode { .. }
                | Self::HandlerFailure { .. }
                | Self::Store(_)
        )
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
