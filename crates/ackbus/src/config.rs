//! Broker configuration.
//!
//! # Example
//!
//! ```ignore
//! use ackbus::{BrokerConfigBuilder, ClusterStrategy, ExecutionStrategy};
//!
//! let config = BrokerConfigBuilder::new()
//!     .default_ttl(Duration::from_secs(60))
//!     .cluster_strategy(ClusterStrategy::None)
//!     .execution_strategy(ExecutionStrategy::FailFast)
//!     .build()?;
//! ```

use crate::domain::{ClusterStrategy, ExecutionStrategy, ReconnectPolicy};
use crate::error::BrokerError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default envelope time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default number of recovered envelopes dispatched at once.
pub const DEFAULT_RECOVERY_CONCURRENCY: usize = 16;

/// Per-client broker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// TTL applied by `publish` when no override is given.
    pub default_ttl: Duration,
    /// How handler failures on one envelope aggregate.
    pub execution_strategy: ExecutionStrategy,
    /// Whether subscribers sharing an identity compete.
    pub cluster_strategy: ClusterStrategy,
    /// Upper bound on a single handler invocation.
    pub handler_timeout: Option<Duration>,
    /// Recovered envelopes in flight at once.
    pub recovery_concurrency: usize,
    /// Run a catch-up scan each time the watcher reopens its feed.
    pub recover_on_reconnect: bool,
    /// Change-feed reconnect policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            execution_strategy: ExecutionStrategy::default(),
            cluster_strategy: ClusterStrategy::default(),
            handler_timeout: None,
            recovery_concurrency: DEFAULT_RECOVERY_CONCURRENCY,
            recover_on_reconnect: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl BrokerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ACKBUS_DEFAULT_TTL_SECS`: default TTL (default: 300)
    /// - `ACKBUS_EXECUTION_STRATEGY`: `fail-fast` or `fail-slow` (default: fail-slow)
    /// - `ACKBUS_CLUSTER_STRATEGY`: `none` or `claimed` (default: claimed)
    /// - `ACKBUS_HANDLER_TIMEOUT_MS`: per-handler timeout (default: unset)
    /// - `ACKBUS_RECOVERY_CONCURRENCY`: default 16
    /// - `ACKBUS_RECOVER_ON_RECONNECT`: default true
    /// - `ACKBUS_RECONNECT_BASE_MS`: default 100
    /// - `ACKBUS_RECONNECT_MAX_MS`: default 10000
    /// - `ACKBUS_RECONNECT_MAX_ATTEMPTS`: default 20, `0` retries forever
    ///
    /// Unparsable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("ACKBUS_DEFAULT_TTL_SECS") {
            config.default_ttl = Duration::from_secs(secs);
        }
        if let Some(strategy) = env_parse::<ExecutionStrategy>("ACKBUS_EXECUTION_STRATEGY") {
            config.execution_strategy = strategy;
        }
        if let Some(strategy) = env_parse::<ClusterStrategy>("ACKBUS_CLUSTER_STRATEGY") {
            config.cluster_strategy = strategy;
        }
        if let Some(ms) = env_parse::<u64>("ACKBUS_HANDLER_TIMEOUT_MS") {
            config.handler_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(n) = env_parse::<usize>("ACKBUS_RECOVERY_CONCURRENCY") {
            config.recovery_concurrency = n;
        }
        if let Ok(flag) = env::var("ACKBUS_RECOVER_ON_RECONNECT") {
            config.recover_on_reconnect = flag.to_lowercase() != "false" && flag != "0";
        }
        if let Some(ms) = env_parse::<u64>("ACKBUS_RECONNECT_BASE_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("ACKBUS_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("ACKBUS_RECONNECT_MAX_ATTEMPTS") {
            config.reconnect.max_attempts = (n > 0).then_some(n);
        }

        config
    }

    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.recovery_concurrency == 0 {
            return Err(BrokerError::Config(
                "recovery_concurrency cannot be 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(BrokerError::Config(format!(
                "reconnect jitter must be between 0 and 1, got {}",
                self.reconnect.jitter
            )));
        }

        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(BrokerError::Config(
                "reconnect base_delay exceeds max_delay".to_string(),
            ));
        }

        if self.handler_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BrokerError::Config(
                "handler_timeout cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment value");
            None
        }
    }
}

/// Fluent builder for [`BrokerConfig`].
#[derive(Debug, Clone, Default)]
pub struct BrokerConfigBuilder {
    config: BrokerConfig,
}

impl BrokerConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: BrokerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn execution_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.execution_strategy = strategy;
        self
    }

    #[must_use]
    pub fn cluster_strategy(mut self, strategy: ClusterStrategy) -> Self {
        self.config.cluster_strategy = strategy;
        self
    }

    #[must_use]
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn recovery_concurrency(mut self, n: usize) -> Self {
        self.config.recovery_concurrency = n;
        self
    }

    #[must_use]
    pub fn recover_on_reconnect(mut self, enabled: bool) -> Self {
        self.config.recover_on_reconnect = enabled;
        self
    }

    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Validate and produce the configuration.
    pub fn build(self) -> Result<BrokerConfig, BrokerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
