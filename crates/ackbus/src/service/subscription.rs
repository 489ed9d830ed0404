//! # Subscription Registry
//!
//! One [`Registry`] per client maps each topic to its live subscription:
//! the handler list, the local delivery ledger, the lifecycle status, and
//! the shutdown signal plus task handles of its recovery and watch tasks.
//!
//! Handler lists are copy-on-write. Dispatch reads an `Arc` snapshot and
//! never holds the registry lock across an `.await`.

use crate::domain::{DeliveryLedger, SubscriptionPhase, WatchEvent, WatchState};
use crate::ports::Handler;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Snapshot of a handler list.
pub type HandlerList = Arc<Vec<Arc<dyn Handler>>>;

/// Lifecycle flags shared between a subscription and its tasks.
#[derive(Debug)]
pub struct StatusCell {
    recovering: AtomicBool,
    watch: Mutex<WatchState>,
}

impl StatusCell {
    /// Recovery is pending from the moment a subscription exists.
    pub fn new() -> Self {
        Self {
            recovering: AtomicBool::new(true),
            watch: Mutex::new(WatchState::Idle),
        }
    }

    /// Drive the watcher state machine; returns the new state.
    pub fn apply(&self, event: WatchEvent) -> WatchState {
        let mut state = self.watch.lock();
        *state = state.next(event);
        *state
    }

    pub fn set_recovering(&self, recovering: bool) {
        self.recovering.store(recovering, Ordering::SeqCst);
    }

    pub fn recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    pub fn watch(&self) -> WatchState {
        *self.watch.lock()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub topic: String,
    pub handler_count: usize,
    pub recovering: bool,
    pub watch: WatchState,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn phase(&self) -> SubscriptionPhase {
        SubscriptionPhase::derive(self.recovering, self.watch)
    }
}

/// What the delivery pipeline needs for one topic.
#[derive(Clone)]
pub struct Route {
    pub handlers: HandlerList,
    pub ledger: Arc<Mutex<DeliveryLedger>>,
}

/// Handed to the caller that created a subscription so it can start the tasks.
pub struct NewSubscription {
    pub generation: u64,
    pub status: Arc<StatusCell>,
    pub shutdown: watch::Receiver<bool>,
}

/// Outcome of [`Registry::register`].
pub enum Registration {
    /// First handler on the topic; tasks must be started.
    Created(NewSubscription),
    /// Added to an existing subscription.
    Attached { handlers: usize },
}

struct Subscription {
    generation: u64,
    handlers: HandlerList,
    ledger: Arc<Mutex<DeliveryLedger>>,
    status: Arc<StatusCell>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    fn stop(self, topic: &str) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
        self.status.apply(WatchEvent::Stop);
        info!(topic, handlers = self.handlers.len(), "Subscription stopped");
    }
}

/// Topic to subscription map for one client.
#[derive(Default)]
pub struct Registry {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    generations: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` to `topic`, creating the subscription if needed.
    pub fn register(&self, topic: &str, handler: Arc<dyn Handler>) -> Registration {
        let mut subscriptions = self.subscriptions.write();

        if let Some(existing) = subscriptions.get_mut(topic) {
            let mut handlers = existing.handlers.as_ref().clone();
            handlers.push(handler);
            existing.handlers = Arc::new(handlers);
            debug!(topic, handlers = existing.handlers.len(), "Handler attached");
            return Registration::Attached {
                handlers: existing.handlers.len(),
            };
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(StatusCell::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        subscriptions.insert(
            topic.to_string(),
            Subscription {
                generation,
                handlers: Arc::new(vec![handler]),
                ledger: Arc::new(Mutex::new(DeliveryLedger::new())),
                status: status.clone(),
                shutdown,
                tasks: Vec::new(),
            },
        );

        Registration::Created(NewSubscription {
            generation,
            status,
            shutdown: shutdown_rx,
        })
    }

    /// Hand the background tasks to the subscription they were started for.
    ///
    /// If that subscription is already gone the tasks are aborted and
    /// `false` is returned.
    pub fn attach_tasks(&self, topic: &str, generation: u64, tasks: Vec<JoinHandle<()>>) -> bool {
        let mut subscriptions = self.subscriptions.write();
        match subscriptions.get_mut(topic) {
            Some(subscription) if subscription.generation == generation => {
                subscription.tasks.extend(tasks);
                true
            }
            _ => {
                for task in &tasks {
                    task.abort();
                }
                false
            }
        }
    }

    /// Handlers and ledger for dispatch.
    pub fn route(&self, topic: &str) -> Option<Route> {
        self.subscriptions.read().get(topic).map(|s| Route {
            handlers: s.handlers.clone(),
            ledger: s.ledger.clone(),
        })
    }

    /// Stop and remove one subscription.
    pub fn remove(&self, topic: &str) -> bool {
        let removed = self.subscriptions.write().remove(topic);
        match removed {
            Some(subscription) => {
                subscription.stop(topic);
                true
            }
            None => false,
        }
    }

    /// Stop and remove every subscription. Returns how many were live.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        let count = drained.len();
        for (topic, subscription) in drained {
            subscription.stop(&topic);
        }
        count
    }

    pub fn status(&self, topic: &str) -> Option<SubscriptionStatus> {
        self.subscriptions
            .read()
            .get(topic)
            .map(|s| status_of(topic, s))
    }

    pub fn statuses(&self) -> Vec<SubscriptionStatus> {
        let mut statuses: Vec<_> = self
            .subscriptions
            .read()
            .iter()
            .map(|(topic, s)| status_of(topic, s))
            .collect();
        statuses.sort_by(|a, b| a.topic.cmp(&b.topic));
        statuses
    }

    pub fn topics(&self) -> Vec<String> {
        self.statuses().into_iter().map(|s| s.topic).collect()
    }
}

fn status_of(topic: &str, subscription: &Subscription) -> SubscriptionStatus {
    SubscriptionStatus {
        topic: topic.to_string(),
        handler_count: subscription.handlers.len(),
        recovering: subscription.status.recovering(),
        watch: subscription.status.watch(),
    }
}
