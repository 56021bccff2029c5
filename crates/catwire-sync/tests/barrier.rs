//! Integration tests for the start barrier.
//!
//! Uses `tokio::time::pause()` (via `start_paused`) so the timeout path is
//! deterministic: when every task is idle, the runtime auto-advances the
//! clock to the next timer.

use std::sync::Arc;
use std::time::Duration;

use catwire_sync::{BarrierConfig, BarrierError, StartBarrier};

fn barrier(expected: usize, timeout_secs: u64) -> Arc<StartBarrier> {
    Arc::new(StartBarrier::with_config(
        expected,
        BarrierConfig {
            timeout: Duration::from_secs(timeout_secs),
        },
    ))
}

#[tokio::test(start_paused = true)]
async fn test_sync_returns_after_k_arrivals() {
    let b = barrier(3, 60);

    for i in 0..3 {
        let b = Arc::clone(&b);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10 * (i + 1))).await;
            b.count_me();
            b.wait_for_clients().await;
        });
    }

    b.sync().await.expect("all clients arrive within the fake clock");
    assert_eq!(b.arrived(), 3);
    assert!(b.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_sync_blocks_until_last_arrival() {
    let b = barrier(2, 60);
    b.count_me();

    let waiter = {
        let b = Arc::clone(&b);
        tokio::spawn(async move { b.sync().await })
    };

    // One arrival short: the sync future must still be pending.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    b.count_me();
    waiter.await.unwrap().expect("second arrival releases the barrier");
}

#[tokio::test(start_paused = true)]
async fn test_sync_times_out_and_still_releases_waiters() {
    let b = barrier(5, 60);
    b.count_me();

    let client = {
        let b = Arc::clone(&b);
        tokio::spawn(async move {
            b.wait_for_clients().await;
        })
    };

    let err = b.sync().await.unwrap_err();
    assert_eq!(
        err,
        BarrierError::TimedOut {
            arrived: 1,
            expected: 5
        }
    );

    // The waiting client is released, not left hanging.
    client.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_barrier_is_one_shot() {
    let b = barrier(1, 60);
    b.count_me();
    b.sync().await.unwrap();

    // Extra arrivals must not unblock a second rendezvous.
    b.count_me();
    assert_eq!(b.sync().await.unwrap_err(), BarrierError::AlreadyReleased);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sync_claims_are_exclusive() {
    let b = barrier(1, 60);

    let first = {
        let b = Arc::clone(&b);
        tokio::spawn(async move { b.sync().await })
    };
    // Let the first sync claim the barrier before the second tries.
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(b.sync().await.unwrap_err(), BarrierError::AlreadyReleased);

    b.count_me();
    first.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_clients_returns_immediately_after_release() {
    let b = barrier(1, 60);
    b.count_me();
    b.sync().await.unwrap();

    // A straggler checking the barrier late must not block.
    b.wait_for_clients().await;
}
