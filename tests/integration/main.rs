//! Integration tests for Keyward

use keyward::{
    CacheCoordinator, CacheEntry, CacheError, CoordinatorConfig, KeyValueStore, MemoryStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Report {
    region: String,
    totals: Vec<u64>,
}

fn report(region: &str) -> Report {
    Report {
        region: region.to_string(),
        totals: vec![3, 1, 4, 1, 5],
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shared_coordinator() -> Arc<CacheCoordinator<Arc<MemoryStore>>> {
    init_tracing();
    Arc::new(CacheCoordinator::new(
        Arc::new(MemoryStore::new()),
        CoordinatorConfig::default(),
    ))
}

mod population_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Barrier, Notify};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_factory_call() {
        let cache = shared_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .fetch_or_populate("report:eu", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, CacheError>(CacheEntry::new(
                                report("eu"),
                                Duration::from_secs(60),
                            ))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let value: Report = handle.await.unwrap().unwrap();
            assert_eq!(value, report("eu"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn populate_then_fetch_roundtrip() {
        let cache = shared_coordinator();
        cache
            .populate("report:us", || async {
                Ok::<_, CacheError>(CacheEntry::new(report("us"), Duration::from_secs(60)))
            })
            .await
            .unwrap();

        let fetched: Report = cache.fetch("report:us").await.unwrap();
        assert_eq!(fetched, report("us"));
    }

    #[tokio::test]
    async fn invalidate_then_fetch_is_not_found() {
        let cache = shared_coordinator();
        cache
            .populate("report:apac", || async {
                Ok::<_, CacheError>(CacheEntry::persistent(report("apac")))
            })
            .await
            .unwrap();

        cache.invalidate("report:apac").await.unwrap();

        let err = cache.fetch::<Report>("report:apac").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[tokio::test]
    async fn factory_failure_keeps_previous_value() {
        let cache = shared_coordinator();
        cache
            .populate("report:latam", || async {
                Ok::<_, CacheError>(CacheEntry::persistent(report("latam")))
            })
            .await
            .unwrap();
        let before = cache.store().get("report:latam").await.unwrap();

        let err = cache
            .populate("report:latam", || async {
                Err::<CacheEntry<Report>, _>(std::io::Error::other("warehouse timeout"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Factory { .. }));
        assert_eq!(cache.store().get("report:latam").await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_keys_do_not_contend() {
        let cache = shared_coordinator();
        // Each factory waits for the other, so both must run at once
        let barrier = Arc::new(Barrier::new(2));

        let spawn_for = |key: &'static str| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                cache
                    .fetch_or_populate(key, || async move {
                        barrier.wait().await;
                        Ok::<_, CacheError>(CacheEntry::persistent(key.to_string()))
                    })
                    .await
            })
        };

        let a = spawn_for("a");
        let b = spawn_for("b");

        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            (a.await.unwrap(), b.await.unwrap())
        })
        .await
        .expect("factories for different keys blocked each other");

        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fetch_or_populate_queued_behind_populate_sees_its_value() {
        let cache = shared_coordinator();
        let started = Arc::new(Notify::new());

        let writer = {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            tokio::spawn(async move {
                cache
                    .populate("report:queued", || async move {
                        started.notify_one();
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, CacheError>(CacheEntry::persistent(report("first")))
                    })
                    .await
            })
        };

        started.notified().await;
        let calls = AtomicUsize::new(0);
        let value: Report = cache
            .fetch_or_populate("report:queued", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(CacheEntry::persistent(report("second")))
            })
            .await
            .unwrap();

        writer.await.unwrap().unwrap();
        assert_eq!(value, report("first"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn coordinators_do_not_share_key_locks() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let first = CacheCoordinator::new(Arc::clone(&store), CoordinatorConfig::default());
        let second = CacheCoordinator::new(Arc::clone(&store), CoordinatorConfig::default());

        first
            .populate("k", || async { Ok::<_, CacheError>(CacheEntry::persistent(1)) })
            .await
            .unwrap();

        assert!(first.registry().contains("k"));
        assert!(!second.registry().contains("k"));
        assert_eq!(second.fetch::<i32>("k").await.unwrap(), 1);
    }
}

mod exclusive_tests {
    use super::*;
    use tokio::sync::oneshot;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn second_process_is_busy_until_first_finishes() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let first = Arc::new(CacheCoordinator::new(
            Arc::clone(&store),
            CoordinatorConfig::default(),
        ));
        let second = CacheCoordinator::new(Arc::clone(&store), CoordinatorConfig::default());

        let (entered_tx, entered_rx) = oneshot::channel();
        let (finish_tx, finish_rx) = oneshot::channel::<()>();

        let holder = {
            let first = Arc::clone(&first);
            tokio::spawn(async move {
                first
                    .run_exclusive("rebuild-index", TTL, || async move {
                        let _ = entered_tx.send(());
                        let _ = finish_rx.await;
                        Ok::<_, CacheError>("rebuilt")
                    })
                    .await
            })
        };

        entered_rx.await.unwrap();
        let err = second
            .run_exclusive("rebuild-index", TTL, || async { Ok::<_, CacheError>("g") })
            .await
            .unwrap_err();
        assert!(err.is_busy());

        finish_tx.send(()).unwrap();
        assert_eq!(holder.await.unwrap().unwrap(), "rebuilt");

        let result = second
            .run_exclusive("rebuild-index", TTL, || async { Ok::<_, CacheError>("h") })
            .await
            .unwrap();
        assert_eq!(result, "h");
    }

    #[tokio::test]
    async fn abandoned_lock_frees_after_ttl() {
        let cache = shared_coordinator();
        // A crashed holder that never released
        cache
            .store()
            .set_if_absent("rebuild-index", b"ok".to_vec(), Duration::from_millis(40))
            .await
            .unwrap();

        let err = cache
            .run_exclusive("rebuild-index", TTL, || async { Ok::<_, CacheError>(()) })
            .await
            .unwrap_err();
        assert!(err.is_busy());

        tokio::time::sleep(Duration::from_millis(100)).await;
        cache
            .run_exclusive("rebuild-index", TTL, || async { Ok::<_, CacheError>(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn global_population_composes_with_lock() {
        let cache = shared_coordinator();

        let value: Report = cache
            .run_exclusive("populate:report:eu", TTL, || async {
                cache
                    .fetch_or_populate("report:eu", || async {
                        Ok::<_, CacheError>(CacheEntry::new(report("eu"), Duration::from_secs(60)))
                    })
                    .await
            })
            .await
            .unwrap();

        assert_eq!(value, report("eu"));
        assert!(cache.store().get("populate:report:eu").await.unwrap().is_none());
    }
}
