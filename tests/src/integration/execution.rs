//! # Execution Strategies
//!
//! How handler failures on one envelope aggregate, and what happens to
//! the envelope afterwards.

#[cfg(test)]
mod tests {
    use crate::fixtures::{client, config, eventually, memory_db, settle};
    use ackbus::{handler_fn, BrokerConfig, ClusterStrategy, ExecutionStrategy, Handler};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    fn failing(calls: &Arc<AtomicUsize>) -> Arc<dyn Handler> {
        let calls = calls.clone();
        handler_fn(move |_: Value| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("rejected"))
            }
        })
    }

    fn slow_success(finished: &Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Handler> {
        let finished = finished.clone();
        handler_fn(move |_: Value| {
            let finished = finished.clone();
            async move {
                sleep(delay).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn with_strategy(execution_strategy: ExecutionStrategy) -> BrokerConfig {
        BrokerConfig {
            execution_strategy,
            ..config(ClusterStrategy::None)
        }
    }

    #[tokio::test]
    async fn test_fail_slow_runs_every_handler() {
        let db = memory_db();
        let subscriber = client(&db, "A", with_strategy(ExecutionStrategy::FailSlow));
        let failures = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        subscriber.subscribe_handler("t", failing(&failures)).await.expect("subscribe");
        subscriber
            .subscribe_handler("t", slow_success(&finished, Duration::from_millis(30)))
            .await
            .expect("subscribe");

        let id = subscriber.publish("t", &json!(1)).await.expect("publish");

        eventually("handler failure recorded", || subscriber.metrics().handler_failures == 1).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!db.get("t", id).expect("envelope").is_acked_by("A"));
    }

    #[tokio::test]
    async fn test_fail_fast_cancels_the_rest() {
        let db = memory_db();
        let subscriber = client(&db, "A", with_strategy(ExecutionStrategy::FailFast));
        let failures = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        subscriber.subscribe_handler("t", failing(&failures)).await.expect("subscribe");
        subscriber
            .subscribe_handler("t", slow_success(&finished, Duration::from_millis(200)))
            .await
            .expect("subscribe");

        let id = subscriber.publish("t", &json!(1)).await.expect("publish");

        eventually("handler failure recorded", || subscriber.metrics().handler_failures == 1).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0, "slow handler was not cancelled");
        assert!(!db.get("t", id).expect("envelope").is_acked_by("A"));
    }

    #[tokio::test]
    async fn test_handler_timeout_counts_as_failure() {
        let db = memory_db();
        let subscriber = client(
            &db,
            "A",
            BrokerConfig {
                handler_timeout: Some(Duration::from_millis(50)),
                ..config(ClusterStrategy::None)
            },
        );
        let finished = Arc::new(AtomicUsize::new(0));
        subscriber
            .subscribe_handler("t", slow_success(&finished, Duration::from_secs(10)))
            .await
            .expect("subscribe");

        let id = subscriber.publish("t", &json!(1)).await.expect("publish");

        eventually("timeout recorded", || subscriber.metrics().handler_failures == 1).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(!db.get("t", id).expect("envelope").is_acked_by("A"));
    }

    #[tokio::test]
    async fn test_decode_failure_never_reaches_handlers() {
        #[derive(serde::Deserialize)]
        struct Order {
            id: u64,
        }

        let db = memory_db();
        let subscriber = client(&db, "A", config(ClusterStrategy::Claimed));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        subscriber
            .subscribe("orders", move |_: Order| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .expect("subscribe");

        let id = subscriber.publish("orders", &json!({"id": "not a number"})).await.expect("publish");

        eventually("decode error recorded", || subscriber.metrics().decode_errors == 1).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let envelope = db.get("orders", id).expect("envelope");
        assert!(envelope.acked_by.is_empty());
        assert!(envelope.claimed_by.is_empty());
    }
}
