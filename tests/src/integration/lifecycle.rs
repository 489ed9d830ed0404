//! # Subscription Lifecycle
//!
//! Subscribe, unsubscribe, drop, and what the store keeps in between.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, config, eventually, memory_db, seed, settle, Recorder, WAIT};
    use ackbus::{
        shared_memory_store, BrokerError, Client, ClusterStrategy, RecoveryReport,
        SubscribeOutcome, SubscriptionPhase,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    // =============================================================================
    // UNSUBSCRIBE
    // =============================================================================

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        assert!(subscriber.unsubscribe("t"));
        eventually("feed closed", || db.open_feeds("t") == 0).await;
        assert_eq!(subscriber.phase("t"), None);

        subscriber.publish("t", &json!(1)).await.expect("publish");
        settle().await;
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn test_resubscribe_picks_up_the_gap() {
        let db = memory_db();
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        subscriber.unsubscribe("t");

        subscriber.publish("t", &json!("while away")).await.expect("publish");

        let outcome = subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert!(matches!(outcome, SubscribeOutcome::Started(r) if r.delivered == 1));
        assert_eq!(recorder.seen(), vec![json!("while away")]);

        subscriber.publish("t", &json!("live")).await.expect("publish");
        eventually("live delivery", || recorder.count() == 2).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_cancels_pending_subscribe() {
        let db = memory_db();
        seed(&db, "t", &json!("backlog"), Duration::from_secs(1));
        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));

        // Recovery blocks inside the slow handler
        let pending = {
            let subscriber = subscriber.clone();
            let handler = recorder.slow_handler(Duration::from_secs(30));
            tokio::spawn(async move { subscriber.subscribe_handler("t", handler).await })
        };
        eventually("recovery in progress", || {
            db.documents("t").iter().any(|e| e.is_claimed_by("A"))
        })
        .await;
        assert!(subscriber.is_recovering());
        assert_eq!(subscriber.phase("t"), Some(SubscriptionPhase::Recovering));

        assert!(subscriber.unsubscribe("t"));

        let result = timeout(WAIT, pending).await.expect("subscribe settled").expect("task");
        assert!(matches!(result, Err(BrokerError::Cancelled { topic }) if topic == "t"));
        assert_eq!(recorder.count(), 0);
        eventually("feed closed", || db.open_feeds("t") == 0).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_all_and_drop() {
        let db = memory_db();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        for topic in ["c", "a", "b"] {
            subscriber.subscribe_handler(topic, Recorder::new().handler()).await.expect("subscribe");
        }
        assert_eq!(subscriber.topics(), vec!["a", "b", "c"]);
        assert_eq!(subscriber.unsubscribe_all(), 3);
        assert!(subscriber.topics().is_empty());

        subscriber.subscribe_handler("d", Recorder::new().handler()).await.expect("subscribe");
        assert_eq!(db.open_feeds("d"), 1);
        drop(subscriber);
        eventually("feed closed on drop", || db.open_feeds("d") == 0).await;
    }

    // =============================================================================
    // STORE
    // =============================================================================

    #[tokio::test]
    async fn test_expired_envelopes_are_removed() {
        let db = memory_db();
        let publisher = client(&db, "publisher", config(ClusterStrategy::Claimed));

        // Subscribing provisions the expiry index, even for an identity
        // that leaves right away
        let provisioner = client(&db, "provisioner", config(ClusterStrategy::Claimed));
        provisioner.subscribe_handler("t", Recorder::new().handler()).await.expect("subscribe");
        provisioner.unsubscribe("t");
        assert!(db.has_expiry_index("t"));

        publisher
            .publish_with_ttl("t", &json!("short"), Duration::from_millis(1))
            .await
            .expect("publish");
        let kept = publisher.publish("t", &json!("long")).await.expect("publish");
        sleep(Duration::from_millis(20)).await;

        let remaining: Vec<_> = db.documents("t").into_iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![kept]);

        let recorder = Recorder::new();
        let late = client(&db, "late", config(ClusterStrategy::Claimed));
        let outcome = late.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert!(matches!(outcome, SubscribeOutcome::Started(r) if r.found == 1));
        assert_eq!(recorder.seen(), vec![json!("long")]);
    }

    #[tokio::test]
    async fn test_clients_share_a_memory_uri() {
        let uri = "memory://lifecycle-shared";
        let subscriber =
            Client::connect_with(uri, "orders", "A", config(ClusterStrategy::Claimed)).expect("connect");
        let publisher =
            Client::connect_with(uri, "orders", "publisher", config(ClusterStrategy::Claimed)).expect("connect");

        let recorder = Recorder::new();
        let outcome = subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert_eq!(outcome, SubscribeOutcome::Started(RecoveryReport::default()));

        let id = publisher.publish("t", &json!({"shared": true})).await.expect("publish");
        eventually("delivered across clients", || recorder.count() == 1).await;

        let db = shared_memory_store("lifecycle-shared").database("orders");
        eventually("acked in the shared store", || {
            db.get("t", id).is_some_and(|e| e.is_acked_by("A"))
        })
        .await;

        // Another database on the same store is isolated
        assert!(shared_memory_store("lifecycle-shared").database("other").documents("t").is_empty());
    }
}
