//! # Execution Strategy
//!
//! Runs every bound handler for one envelope as its own task and
//! aggregates the outcome.
//!
//! - **FailFast**: the first failure aborts the remaining tasks and
//!   returns without waiting for them.
//! - **FailSlow**: every task runs to completion; failure iff any failed.
//!
//! A panicking or timed-out handler counts as a failure.

use crate::domain::ExecutionStrategy;
use crate::error::BrokerError;
use crate::ports::HandlerCall;
use std::time::Duration;
use tokio::task::JoinSet;

/// Aggregated outcome of one envelope's handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub total: usize,
    /// Failures observed before the executor stopped waiting.
    pub failed: usize,
    pub first_error: Option<String>,
    /// Whether outstanding handlers were aborted.
    pub cancelled: bool,
}

impl ExecutionReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// `HandlerFailure` for `topic`, if any handler failed.
    pub fn into_result(self, topic: &str) -> Result<(), BrokerError> {
        if self.is_success() {
            return Ok(());
        }
        Err(BrokerError::HandlerFailure {
            topic: topic.to_string(),
            failed: self.failed,
            total: self.total,
            first: self.first_error.unwrap_or_default(),
        })
    }
}

/// Handler fan-out under one [`ExecutionStrategy`].
#[derive(Debug, Clone, Copy)]
pub struct Executor {
    strategy: ExecutionStrategy,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(strategy: ExecutionStrategy, timeout: Option<Duration>) -> Self {
        Self { strategy, timeout }
    }

    /// Run `calls` concurrently. Requires a tokio runtime.
    pub async fn run(&self, calls: Vec<HandlerCall>) -> ExecutionReport {
        let total = calls.len();
        let mut tasks = JoinSet::new();
        for call in calls {
            let limit = self.timeout;
            tasks.spawn(async move {
                match limit {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("handler timed out after {limit:?}"))),
                    None => call.await,
                }
            });
        }

        let mut report = ExecutionReport {
            total,
            failed: 0,
            first_error: None,
            cancelled: false,
        };

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(result) => result.map_err(|e| format!("{e:#}")),
                Err(e) if e.is_panic() => Err("handler panicked".to_string()),
                Err(e) => Err(e.to_string()),
            };

            if let Err(message) = outcome {
                report.failed += 1;
                report.first_error.get_or_insert(message);

                if self.strategy == ExecutionStrategy::FailFast {
                    report.cancelled = !tasks.is_empty();
                    tasks.abort_all();
                    break;
                }
            }
        }

        report
    }
}
