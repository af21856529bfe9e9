use super::*;
use std::time::Duration;

use crate::error::Error;
use crate::testkit;
use crate::testkit::worker::{Behavior, MockWorkerFactory};

// -- Helpers --------------------------------------------------------------

async fn pool_with(config: PoolConfig, factory: &MockWorkerFactory) -> Pool {
    Pool::build(config, Arc::new(MetricsCollector::new()), factory)
        .await
        .unwrap()
}

fn rates(pool: &Pool) -> Vec<f64> {
    pool.worker_rates()
        .into_iter()
        .map(|(_, rate)| rate.unwrap_or_default())
        .collect()
}

/// Poll `cond` every few milliseconds for up to one second.
async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// -- Construction ---------------------------------------------------------

#[test]
fn test_new_rejects_zero_workers() {
    let err = Pool::new(PoolConfig::new(0)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_new_pool_is_empty_and_stopped() {
    let pool = Pool::new(testkit::config::pool(3)).unwrap();
    assert_eq!(pool.worker_count(), 0);
    assert!(!pool.is_running());
    assert_eq!(pool.config().workers, 3);
}

#[tokio::test]
async fn test_build_creates_configured_workers() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(3), &factory).await;
    assert_eq!(pool.worker_count(), 3);
    assert_eq!(pool.worker_ids(), vec![0, 1, 2]);
    assert_eq!(factory.created().len(), 3);
}

#[tokio::test]
async fn test_build_failure_closes_built_workers() {
    let factory = MockWorkerFactory::new();
    factory.fail_on_call(2);
    let err = Pool::build(
        testkit::config::pool(3),
        Arc::new(MetricsCollector::new()),
        &factory,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Pool(PoolError::Factory { worker_id: 2, .. })));
    let built = factory.created();
    assert_eq!(built.len(), 2);
    assert!(built.iter().all(|w| w.stops() == 1 && w.runs() == 0));
}

// -- Lifecycle ------------------------------------------------------------

#[tokio::test]
async fn test_start_runs_every_worker() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(3), &factory).await;
    let cancel = CancellationToken::new();

    pool.start(&cancel).unwrap();
    assert!(pool.is_running());
    assert!(eventually(|| factory.created().iter().all(|w| w.is_running())).await);

    pool.stop().await.unwrap();
    assert!(!pool.is_running());
    for worker in factory.created() {
        assert!(!worker.is_running());
        assert_eq!(worker.runs(), 1);
        assert_eq!(worker.stops(), 1);
    }
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(1), &factory).await;
    let cancel = CancellationToken::new();

    pool.start(&cancel).unwrap();
    let err = pool.start(&cancel).unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::AlreadyRunning)));
    assert_eq!(factory.created()[0].runs(), 1);
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    pool.stop().await.unwrap();
    pool.stop().await.unwrap();
    for worker in factory.created() {
        assert_eq!(worker.stops(), 1);
    }
}

#[tokio::test]
async fn test_stop_without_start_closes_workers() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;
    pool.stop().await.unwrap();
    for worker in factory.created() {
        assert_eq!(worker.runs(), 0);
        assert_eq!(worker.stops(), 1);
    }
}

#[tokio::test]
async fn test_start_after_stop_is_rejected() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(1), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();
    pool.stop().await.unwrap();

    let err = pool.start(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::Closed)));
    let err = pool.add_worker(&factory).await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::Closed)));
}

#[tokio::test]
async fn test_parent_cancel_reaches_workers() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;
    let parent = CancellationToken::new();
    pool.start(&parent).unwrap();
    assert!(eventually(|| factory.created().iter().all(|w| w.is_running())).await);

    parent.cancel();
    assert!(eventually(|| factory.created().iter().all(|w| !w.is_running())).await);
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_workers_share_metrics() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    pool.stop().await.unwrap();

    let snap = pool.metrics().snapshot();
    assert!(snap.messages_sent >= 2);
    assert_eq!(snap.latency.count, snap.messages_sent);
}

#[tokio::test]
async fn test_stop_reports_timed_out_workers() {
    let factory = MockWorkerFactory::with_behavior(Behavior::Stubborn(Duration::from_secs(5)));
    let config = testkit::config::pool(2).with_stop_timeout(Duration::from_millis(50));
    let pool = pool_with(config, &factory).await;
    pool.start(&CancellationToken::new()).unwrap();
    assert!(eventually(|| factory.created().iter().all(|w| w.is_running())).await);

    let started = std::time::Instant::now();
    let err = pool.stop().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        Error::Pool(PoolError::Shutdown { timed_out, failed }) => {
            assert_eq!(timed_out.len(), 2);
            assert!(failed.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!pool.is_running());
    // Clients are closed even for detached workers.
    assert!(factory.created().iter().all(|w| w.stops() == 1));
}

#[tokio::test]
async fn test_stop_reports_failed_close() {
    let factory = MockWorkerFactory::with_behavior(Behavior::FailingStop);
    let pool = pool_with(testkit::config::pool(1), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    let err = pool.stop().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Pool(PoolError::Shutdown { ref failed, .. })
            if failed.len() == 1 && failed[0].0 == 0
    ));
}

#[tokio::test]
async fn test_stop_abandons_hanging_close() {
    let factory = MockWorkerFactory::with_behavior(Behavior::HangingStop);
    let config = testkit::config::pool(2).with_stop_timeout(Duration::from_millis(100));
    let pool = pool_with(config, &factory).await;
    pool.start(&CancellationToken::new()).unwrap();
    assert!(eventually(|| factory.created().iter().all(|w| w.is_running())).await);

    let err = tokio::time::timeout(Duration::from_secs(3), pool.stop())
        .await
        .expect("stop blocked on a hanging close")
        .unwrap_err();
    match err {
        Error::Pool(PoolError::Shutdown { mut timed_out, failed }) => {
            timed_out.sort_unstable();
            assert_eq!(timed_out, vec![0, 1]);
            assert!(failed.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!pool.is_running());
    assert!(factory.created().iter().all(|w| w.stops() == 1));
}

// -- Resize ---------------------------------------------------------------

#[tokio::test]
async fn test_resize_sequence() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(3), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    pool.remove_worker().await.unwrap();
    pool.remove_worker().await.unwrap();
    assert_eq!(pool.worker_count(), 1);
    pool.add_worker(&factory).await.unwrap();
    assert_eq!(pool.worker_count(), 2);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_remove_last_worker_is_rejected() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(1), &factory).await;

    let err = pool.remove_worker().await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::LastWorker { count: 1 })));
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(factory.created()[0].stops(), 0);
}

#[tokio::test]
async fn test_remove_from_empty_pool_is_rejected() {
    let pool = Pool::new(testkit::config::pool(1)).unwrap();
    let err = pool.remove_worker().await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::LastWorker { count: 0 })));
}

#[tokio::test]
async fn test_remove_takes_most_recent_worker() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(3), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    pool.remove_worker().await.unwrap();
    assert_eq!(pool.worker_ids(), vec![0, 1]);

    let removed = &factory.created()[2];
    assert!(!removed.is_running());
    assert_eq!(removed.stops(), 1);
    // The others keep running.
    assert!(factory.created()[0].is_running());
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_remove_while_stopped_closes_worker() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;
    pool.remove_worker().await.unwrap();
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(factory.created()[1].stops(), 1);
    assert_eq!(factory.created()[1].runs(), 0);
}

#[tokio::test]
async fn test_remove_timeout_detaches_but_removes() {
    let factory = MockWorkerFactory::new();
    let config = testkit::config::pool(1).with_remove_timeout(Duration::from_millis(30));
    let pool = pool_with(config, &factory).await;
    factory.set_behavior(Behavior::Stubborn(Duration::from_secs(5)));
    pool.add_worker(&factory).await.unwrap();
    pool.start(&CancellationToken::new()).unwrap();
    assert!(eventually(|| factory.created()[1].is_running()).await);

    let err = pool.remove_worker().await.unwrap_err();
    match err {
        Error::Pool(PoolError::Shutdown { timed_out, .. }) => assert_eq!(timed_out, vec![1]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(factory.created()[1].stops(), 1);
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_remove_abandons_hanging_close() {
    let factory = MockWorkerFactory::new();
    let config = testkit::config::pool(1).with_remove_timeout(Duration::from_millis(100));
    let pool = pool_with(config, &factory).await;
    factory.set_behavior(Behavior::HangingStop);
    pool.add_worker(&factory).await.unwrap();
    pool.start(&CancellationToken::new()).unwrap();

    let started = std::time::Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(3), pool.remove_worker())
        .await
        .expect("remove blocked on a hanging close")
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    match err {
        Error::Pool(PoolError::Shutdown { timed_out, .. }) => assert_eq!(timed_out, vec![1]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pool.worker_ids(), vec![0]);
    assert_eq!(factory.created()[1].stops(), 1);
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_add_while_running_starts_worker() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(1), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    let id = pool.add_worker(&factory).await.unwrap();
    assert_eq!(id, 1);
    assert!(eventually(|| factory.created()[1].is_running()).await);
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_add_while_stopped_does_not_start() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(1), &factory).await;
    pool.add_worker(&factory).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(factory.created()[1].runs(), 0);
}

#[tokio::test]
async fn test_factory_failure_leaves_pool_unchanged() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(2), &factory).await;

    factory.fail_next();
    let err = pool.add_worker(&factory).await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::Factory { worker_id: 2, .. })));
    assert_eq!(pool.worker_count(), 2);
    assert_eq!(pool.worker_ids(), vec![0, 1]);
}

// -- Rate redistribution --------------------------------------------------

#[tokio::test]
async fn test_build_splits_target_evenly() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::rate_limited_pool(4, 120), &factory).await;
    for rate in rates(&pool) {
        assert!((rate - 30.0).abs() < 1e-9, "rate {rate}");
    }
}

#[tokio::test]
async fn test_remove_redistributes_rate() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::rate_limited_pool(4, 120), &factory).await;
    pool.start(&CancellationToken::new()).unwrap();

    pool.remove_worker().await.unwrap();
    let rates = rates(&pool);
    assert_eq!(rates.len(), 3);
    for rate in rates {
        assert!((rate - 40.0).abs() <= 1.0, "rate {rate}");
    }
    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_add_redistributes_rate() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::rate_limited_pool(2, 100), &factory).await;
    pool.add_worker(&factory).await.unwrap();
    pool.add_worker(&factory).await.unwrap();
    for rate in rates(&pool) {
        assert!((rate - 25.0).abs() < 1e-9, "rate {rate}");
    }
}

#[tokio::test]
async fn test_unlimited_pool_leaves_rates_alone() {
    let factory = MockWorkerFactory::new();
    let pool = pool_with(testkit::config::pool(3), &factory).await;
    pool.remove_worker().await.unwrap();
    assert!(rates(&pool).iter().all(|r| *r == 0.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resizes_settle_on_even_rates() {
    let factory = Arc::new(MockWorkerFactory::new());
    let pool = Arc::new(pool_with(testkit::config::rate_limited_pool(4, 1_200), &factory).await);
    pool.start(&CancellationToken::new()).unwrap();

    for _ in 0..20 {
        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let pool = Arc::clone(&pool);
                let factory = Arc::clone(&factory);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        pool.add_worker(factory.as_ref()).await.map(|_| ())
                    } else {
                        pool.remove_worker().await
                    }
                })
            })
            .collect();
        for task in tasks {
            let _ = task.await.unwrap();
        }

        let expected = 1_200.0 / pool.worker_count() as f64;
        for rate in rates(&pool) {
            assert!((rate - expected).abs() < 1e-9, "rate {rate}, expected {expected}");
        }
    }
    pool.stop().await.unwrap();
}
