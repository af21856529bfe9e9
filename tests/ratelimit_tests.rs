//! Rate limiter behavior under contention and cancellation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use msgload::ratelimit::RateLimiter;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_limiter_caps_combined_rate() {
    let limiter = Arc::new(RateLimiter::new(100.0));
    let acquired = Arc::new(AtomicU64::new(0));
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let acquired = Arc::clone(&acquired);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                while limiter.wait(&cancel).await.is_ok() {
                    acquired.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    for task in tasks {
        task.await.unwrap();
    }

    let elapsed = started.elapsed().as_secs_f64();
    let total = acquired.load(Ordering::Relaxed) as f64;
    // Initial token plus a full bucket of burst.
    let ceiling = 1.0 + 10.0 + 100.0 * elapsed;
    assert!(total <= ceiling, "{total} acquisitions in {elapsed:.3}s");
    assert!(total >= 30.0, "only {total} acquisitions in {elapsed:.3}s");
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_wait() {
    let limiter = RateLimiter::new(0.5);
    assert!(limiter.try_acquire());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    assert!(limiter.wait(&cancel).await.is_err());
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn raising_the_rate_releases_waiters() {
    let limiter = Arc::new(RateLimiter::new(0.1));
    assert!(limiter.try_acquire());

    let cancel = CancellationToken::new();
    let waiter = {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.wait(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    limiter.set_rate(1_000.0);

    let outcome = tokio::time::timeout(Duration::from_millis(500), waiter)
        .await
        .expect("waiter should be released")
        .unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn unlimited_never_waits() {
    let limiter = RateLimiter::unlimited();
    let cancel = CancellationToken::new();
    let started = Instant::now();
    for _ in 0..10_000 {
        limiter.wait(&cancel).await.unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));
}
