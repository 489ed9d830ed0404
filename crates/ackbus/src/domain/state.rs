//! Subscription lifecycle.
//!
//! Recovery and watching run concurrently, so the lifecycle is tracked as a
//! recovery flag plus a watcher state machine:
//!
//! ```text
//! [IDLE] ──feed opened──→ [WATCHING] ──feed lost──→ [RECONNECTING {attempt: 1}]
//!                              ↑                           │
//!                              └──────── feed opened ──────┤
//!                                                          ├── feed lost ──→ [RECONNECTING {attempt: n+1}]
//!                                                          └── retries exhausted ──→ [HALTED]
//!
//! any ──stop──→ [STOPPED]
//! ```

use serde::{Deserialize, Serialize};

/// State of the change-feed watcher for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WatchState {
    /// Not yet opened.
    #[default]
    Idle,
    /// Feed open and being drained.
    Watching,
    /// Feed lost; waiting to reopen.
    Reconnecting { attempt: u32 },
    /// Gave up after sustained failure.
    Halted,
    /// Subscription removed.
    Stopped,
}

/// Events driving [`WatchState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    FeedOpened,
    FeedLost,
    RetriesExhausted,
    Stop,
}

impl WatchState {
    /// Next state. Pure and deterministic; invalid pairs leave the state unchanged.
    #[must_use]
    pub fn next(self, event: WatchEvent) -> WatchState {
        match (self, event) {
            (Self::Stopped, _) => Self::Stopped,
            (_, WatchEvent::Stop) => Self::Stopped,

            (Self::Idle | Self::Reconnecting { .. }, WatchEvent::FeedOpened) => Self::Watching,

            (Self::Idle | Self::Watching, WatchEvent::FeedLost) => {
                Self::Reconnecting { attempt: 1 }
            }
            (Self::Reconnecting { attempt }, WatchEvent::FeedLost) => Self::Reconnecting {
                attempt: attempt.saturating_add(1),
            },

            (Self::Idle | Self::Reconnecting { .. } | Self::Watching, WatchEvent::RetriesExhausted) => {
                Self::Halted
            }

            (state, _) => state,
        }
    }

    /// Whether a watch task is alive for this subscription.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Watching | Self::Reconnecting { .. })
    }
}

/// Coarse phase derived from the recovery flag and the watcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionPhase {
    Idle,
    Recovering,
    Watching,
    Reconnecting,
    Halted,
    Stopped,
}

impl SubscriptionPhase {
    /// Combine the recovery flag with the watcher state.
    #[must_use]
    pub fn derive(recovering: bool, watch: WatchState) -> Self {
        match watch {
            WatchState::Stopped => Self::Stopped,
            WatchState::Halted => Self::Halted,
            _ if recovering => Self::Recovering,
            WatchState::Idle => Self::Idle,
            WatchState::Watching => Self::Watching,
            WatchState::Reconnecting { .. } => Self::Reconnecting,
        }
    }
}
