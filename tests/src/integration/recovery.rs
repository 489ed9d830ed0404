//! # Recovery
//!
//! Envelopes published while nobody was listening are found by the scan
//! that runs when a topic is first subscribed:
//!
//! 1. **Offline publish**: delivered on subscribe, oldest first
//! 2. **Acked history**: never redelivered to the same identity
//! 3. **Scan/feed race**: envelopes inserted during recovery run once

#[cfg(test)]
mod tests {
    use crate::fixtures::{acked_by, client, config, eventually, memory_db, seed, settle, Recorder};
    use ackbus::{BrokerConfig, ClusterStrategy, RecoveryReport, SubscribeOutcome};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn test_offline_publish_is_recovered() {
        let db = memory_db();
        let publisher = client(&db, "publisher", config(ClusterStrategy::Claimed));
        for n in 0..3 {
            publisher.publish("t", &json!(n)).await.expect("publish");
        }

        let recorder = Recorder::new();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        let outcome = subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        assert_eq!(
            outcome,
            SubscribeOutcome::Started(RecoveryReport {
                found: 3,
                delivered: 3,
                skipped: 0,
                failed: 0,
            })
        );
        assert_eq!(recorder.count(), 3);
        assert!(!subscriber.is_recovering());
        assert!(db.documents("t").iter().all(|e| e.is_acked_by("A")));
    }

    #[tokio::test]
    async fn test_recovery_runs_oldest_first() {
        let db = memory_db();
        seed(&db, "t", &json!("newest"), Duration::from_secs(1));
        seed(&db, "t", &json!("oldest"), Duration::from_secs(30));
        seed(&db, "t", &json!("middle"), Duration::from_secs(10));

        let recorder = Recorder::new();
        let subscriber = client(
            &db,
            "A",
            BrokerConfig {
                recovery_concurrency: 1,
                ..config(ClusterStrategy::None)
            },
        );
        subscriber.subscribe_handler("t", recorder.handler()).await.expect("subscribe");

        assert_eq!(recorder.seen(), vec![json!("oldest"), json!("middle"), json!("newest")]);
    }

    #[tokio::test]
    async fn test_acked_history_is_not_redelivered() {
        let db = memory_db();
        let recorder = Recorder::new();

        let first = client(&db, "A", config(ClusterStrategy::Claimed));
        first.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        let id = first.publish("t", &json!(1)).await.expect("publish");
        eventually("ack", || acked_by(&db, "t", id).len() == 1).await;
        drop(first);

        // Same identity comes back: nothing left to do
        let again = client(&db, "A", config(ClusterStrategy::Claimed));
        let outcome = again.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert_eq!(outcome, SubscribeOutcome::Started(RecoveryReport::default()));
        assert_eq!(recorder.count(), 1);

        // A new identity still sees the history
        let other = client(&db, "B", config(ClusterStrategy::Claimed));
        let outcome = other.subscribe_handler("t", recorder.handler()).await.expect("subscribe");
        assert!(matches!(outcome, SubscribeOutcome::Started(r) if r.delivered == 1));
        assert_eq!(recorder.count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_history_is_skipped() {
        let db = memory_db();
        seed(&db, "t", &json!({"n": 1}), Duration::from_secs(3));
        seed(&db, "t", &json!("not an object"), Duration::from_secs(2));
        seed(&db, "t", &json!({"n": 3}), Duration::from_secs(1));

        #[derive(serde::Deserialize)]
        struct Numbered {
            n: u64,
        }

        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        let outcome = subscriber
            .subscribe("t", |_: Numbered| async { Ok(()) })
            .await
            .expect("subscribe");

        let SubscribeOutcome::Started(report) = outcome else {
            panic!("expected a new subscription, got {outcome:?}");
        };
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(subscriber.metrics().decode_errors, 1);

        // The bad envelope spent no claim
        let unclaimed = db.documents("t").into_iter().filter(|e| e.claimed_by.is_empty()).count();
        assert_eq!(unclaimed, 1);
    }

    async fn race(cluster: ClusterStrategy) {
        let db = memory_db();
        for n in 0..50 {
            seed(&db, "t", &json!(n), Duration::from_millis(500 - n * 5));
        }

        let recorder = Recorder::new();
        let subscriber = client(
            &db,
            "A",
            BrokerConfig {
                recovery_concurrency: 4,
                ..config(cluster)
            },
        );
        let publisher = client(&db, "publisher", config(cluster));

        // Inserts land while recovery is still draining the backlog
        let handler = recorder.slow_handler(Duration::from_millis(2));
        let subscribing = subscriber.subscribe_handler("t", handler);
        let publishing = async {
            for n in 50..80 {
                publisher.publish("t", &json!(n)).await.expect("publish");
                tokio::task::yield_now().await;
            }
        };
        let (outcome, ()) = tokio::join!(subscribing, publishing);
        outcome.expect("subscribe");

        eventually("every envelope acked", || {
            let docs = db.documents("t");
            docs.len() == 80 && docs.iter().all(|e| e.is_acked_by("A"))
        })
        .await;
        settle().await;

        let seen = recorder.seen();
        let distinct: HashSet<_> = seen.iter().filter_map(|v| v.as_u64()).collect();
        assert_eq!(distinct.len(), 80);
        assert_eq!(seen.len(), 80, "an envelope ran twice");
    }

    #[tokio::test]
    async fn test_scan_and_feed_race_runs_once_without_claims() {
        race(ClusterStrategy::None).await;
    }

    #[tokio::test]
    async fn test_scan_and_feed_race_runs_once_with_claims() {
        race(ClusterStrategy::Claimed).await;
    }
}
