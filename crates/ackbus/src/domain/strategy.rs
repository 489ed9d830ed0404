//! Delivery strategies: how handler failures aggregate, and whether
//! subscribers sharing an identity compete for envelopes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation policy for the handlers registered on one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Stop on the first handler failure and cancel the rest.
    FailFast,
    /// Run every handler to completion; fail if any failed.
    #[default]
    FailSlow,
}

/// Cross-process coordination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStrategy {
    /// Dispatch unconditionally. Every subscriber sees every envelope.
    None,
    /// Claim the envelope for this identity before dispatching.
    /// Processes sharing an identity split the stream between them.
    #[default]
    Claimed,
}

impl ClusterStrategy {
    /// Whether a claim must be won before dispatch.
    #[must_use]
    pub fn requires_claim(&self) -> bool {
        matches!(self, Self::Claimed)
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail-fast"),
            Self::FailSlow => f.write_str("fail-slow"),
        }
    }
}

impl fmt::Display for ClusterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Claimed => f.write_str("claimed"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "failfast" => Ok(Self::FailFast),
            "fail-slow" | "failslow" => Ok(Self::FailSlow),
            other => Err(format!("unknown execution strategy: {other}")),
        }
    }
}

impl FromStr for ClusterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "claimed" | "all-subscribed" => Ok(Self::Claimed),
            other => Err(format!("unknown cluster strategy: {other}")),
        }
    }
}
