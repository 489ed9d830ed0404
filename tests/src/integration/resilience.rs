//! # Resilience
//!
//! Store faults injected through the in-memory database:
//!
//! 1. **Severed feed**: the watcher reconnects and catches up
//! 2. **Feed outage**: publishes made during the outage arrive afterwards
//! 3. **Retries exhausted**: the watcher halts and the topic shows it;
//!    drops that reconnect cleanly never count toward the limit
//! 4. **Handler or ack failure**: the envelope is redelivered later

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        acked_by, client, config, eventually, fast_reconnect, memory_db, seed, settle, Recorder,
    };
    use ackbus::{handler_fn, BrokerConfig, ClusterStrategy, SubscriptionPhase, WatchState};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // FEED LOSS
    // =============================================================================

    #[tokio::test]
    async fn test_severed_feed_reconnects_and_catches_up() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        subscriber.publish("t", &json!(1)).await.expect("publish");
        eventually("first delivery", || recorder.count() == 1).await;

        db.sever_feeds("t");
        subscriber.publish("t", &json!(2)).await.expect("publish");

        eventually("second delivery", || recorder.count() == 2).await;
        eventually("watching again", || subscriber.phase("t") == Some(SubscriptionPhase::Watching)).await;
        assert!(subscriber.metrics().feed_reconnects >= 1);
        assert_eq!(recorder.seen(), vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_publishes_during_outage_arrive_afterwards() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        db.set_feeds_available(false);
        db.sever_feeds("t");
        eventually("reconnecting", || {
            subscriber.phase("t") == Some(SubscriptionPhase::Reconnecting)
        })
        .await;

        for n in 0..3 {
            subscriber.publish("t", &json!(n)).await.expect("publish");
        }
        settle().await;
        assert_eq!(recorder.count(), 0);

        db.set_feeds_available(true);
        eventually("outage backlog delivered", || recorder.count() == 3).await;
        assert!(db.documents("t").iter().all(|e| e.is_acked_by("A")));
    }

    #[tokio::test]
    async fn test_exhausted_retries_halt_the_watcher() {
        let db = memory_db();
        db.set_feeds_available(false);
        let recorder = Recorder::new();
        let subscriber = client(
            &db,
            "A",
            BrokerConfig {
                reconnect: fast_reconnect(Some(3)),
                ..config(ClusterStrategy::Claimed)
            },
        );

        // Recovery still runs while the feed cannot open
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        eventually("halted", || subscriber.phase("t") == Some(SubscriptionPhase::Halted)).await;
        assert!(!subscriber.is_watching());

        let status = subscriber.status("t").expect("status");
        assert_eq!(status.watch, WatchState::Halted);

        db.set_feeds_available(true);
        subscriber.publish("t", &json!("late")).await.expect("publish");
        settle().await;
        assert_eq!(recorder.count(), 0);

        // A fresh subscription picks up what the halted one missed
        assert!(subscriber.unsubscribe("t"));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert_eq!(recorder.seen(), vec![json!("late")]);
        assert!(subscriber.is_watching());
    }

    #[tokio::test]
    async fn test_quiet_topic_outlives_more_drops_than_max_attempts() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(
            &db,
            "A",
            BrokerConfig {
                reconnect: fast_reconnect(Some(3)),
                ..config(ClusterStrategy::None)
            },
        );
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        // Every reconnect succeeds; nothing is published in between
        for _ in 0..4 {
            eventually("feed open", || {
                subscriber.status("t").is_some_and(|s| s.watch == WatchState::Watching)
                    && db.open_feeds("t") == 1
            })
            .await;
            db.sever_feeds("t");
        }

        eventually("watching again", || {
            subscriber.phase("t") == Some(SubscriptionPhase::Watching) && db.open_feeds("t") == 1
        })
        .await;
        assert_eq!(subscriber.status("t").expect("status").watch, WatchState::Watching);

        subscriber.publish("t", &json!("after")).await.expect("publish");
        eventually("delivery after drops", || recorder.count() == 1).await;
        assert!(subscriber.metrics().feed_reconnects >= 4);
    }

    // =============================================================================
    // REDELIVERY
    // =============================================================================

    #[tokio::test]
    async fn test_failed_handler_is_retried_on_reconnect() {
        let db = memory_db();
        let attempts = Arc::new(AtomicUsize::new(0));
        let subscriber = client(&db, "A", config(ClusterStrategy::None));

        let counter = attempts.clone();
        subscriber
            .subscribe_handler(
                "t",
                handler_fn(move |_: Value| {
                    let counter = counter.clone();
                    async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::ensure!(attempt > 0, "first attempt fails");
                        Ok(())
                    }
                }),
            )
            .await
            .expect("subscribe");

        let id = subscriber.publish("t", &json!(1)).await.expect("publish");
        eventually("first attempt", || attempts.load(Ordering::SeqCst) == 1).await;
        settle().await;
        assert!(acked_by(&db, "t", id).is_empty());

        // The catch-up scan after reconnect retries it
        db.sever_feeds("t");
        eventually("retried and acked", || acked_by(&db, "t", id) == vec!["A".to_string()]).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_claimed_failure_spends_the_claim() {
        let db = memory_db();
        let attempts = Arc::new(AtomicUsize::new(0));
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));

        let counter = attempts.clone();
        subscriber
            .subscribe_handler(
                "t",
                handler_fn(move |_: Value| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(anyhow::anyhow!("always fails"))
                    }
                }),
            )
            .await
            .expect("subscribe");

        let id = subscriber.publish("t", &json!(1)).await.expect("publish");
        eventually("first attempt", || attempts.load(Ordering::SeqCst) == 1).await;

        db.sever_feeds("t");
        eventually("reconnected", || subscriber.metrics().feed_reconnects >= 1).await;
        settle().await;

        let envelope = db.get("t", id).expect("envelope");
        assert!(envelope.is_claimed_by("A"));
        assert!(!envelope.is_acked_by("A"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ack_failure_leaves_envelope_redeliverable() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::None));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        db.set_writes_available(false);
        let id = seed(&db, "t", &json!("payload"), Duration::ZERO);

        eventually("handler ran", || recorder.count() == 1).await;
        eventually("ack failure recorded", || subscriber.metrics().ack_failures == 1).await;
        assert!(acked_by(&db, "t", id).is_empty());

        db.set_writes_available(true);
        db.sever_feeds("t");
        eventually("acked after retry", || acked_by(&db, "t", id) == vec!["A".to_string()]).await;
        assert_eq!(recorder.count(), 2);
    }
}
