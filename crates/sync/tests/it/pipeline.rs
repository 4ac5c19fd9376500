//! Confirmation streams driven through a filter chain over an in-memory queue.

use assert_matches::assert_matches;
use std::{sync::Arc, time::Duration};
use txq_config::{RetryConfig, SyncConfig};
use txq_errors::TxqError;
use txq_queue::{
    test_utils::{Failure, MemoryQueue},
    Block, PendingThrottle, QueueStatus, Throttle, Transaction, B256,
};
use txq_sync::{FilterChain, SyncFilter};

fn config() -> SyncConfig {
    SyncConfig { retry: RetryConfig::new(Duration::from_millis(1), Duration::from_millis(20)) }
}

fn hash(n: u8) -> B256 {
    B256::repeat_byte(n)
}

fn block(number: u64) -> Block {
    Block::new(number, B256::repeat_byte(0xb0 | number as u8))
}

#[test]
fn stream_classifies_tracked_transactions() {
    txq_tracing::init_test_tracing();

    let queue = MemoryQueue::new();
    queue.track(hash(1)).track(hash(2)).track(hash(3));
    let throttle = Arc::new(PendingThrottle::new());
    for n in 1..=3 {
        throttle.inc(&hash(n));
    }

    let filter = SyncFilter::new(queue.factory(), &config()).with_throttle(throttle.clone());
    let mut chain = FilterChain::new().with_filter(filter);

    let events = vec![
        Ok::<_, String>((block(1), Transaction::success(hash(1)))),
        Ok((block(1), Transaction::success(hash(9)))),
        Ok((block(2), Transaction::failure(hash(2)))),
        Ok((block(2), Transaction::success(hash(1)))),
        Ok((block(3), Transaction::success(hash(3)))),
    ];
    assert_eq!(chain.run(&(), events, Some("pipeline")).unwrap(), 5);

    assert_eq!(queue.entry(&hash(1)).unwrap().status, QueueStatus::Succeeded);
    assert_eq!(queue.entry(&hash(1)).unwrap().block, Some(1));
    assert_eq!(queue.entry(&hash(2)).unwrap().status, QueueStatus::Failed);
    assert_eq!(queue.entry(&hash(3)).unwrap().status, QueueStatus::Succeeded);
    assert_eq!(queue.entry(&hash(9)), None);
    assert_eq!(queue.writes(), 3);
    assert_eq!(queue.builds(), vec![1, 2, 3]);
    assert_eq!(throttle.total(), 0);
}

#[test]
fn concurrent_writer_noise_is_absorbed() {
    txq_tracing::init_test_tracing();

    let queue = MemoryQueue::new();
    queue
        .track(hash(4))
        .fail_next_get(Failure::MissingFile)
        .fail_next_get(Failure::Backend)
        .fail_next_write(Failure::LockContention);

    let mut chain =
        FilterChain::new().with_filter(SyncFilter::new(queue.factory(), &config()));
    let events = vec![Ok::<_, String>((block(5), Transaction::failure(hash(4))))];
    assert_eq!(chain.run(&(), events, None).unwrap(), 1);

    assert_eq!(queue.entry(&hash(4)).unwrap().status, QueueStatus::Failed);
    assert_eq!(queue.writes(), 1);
}

#[test]
fn exhausted_backoff_aborts_the_stream() {
    txq_tracing::init_test_tracing();

    let queue = MemoryQueue::new();
    queue.track(hash(5)).track(hash(6));
    for _ in 0..16 {
        queue.fail_next_write(Failure::LockContention);
    }

    let mut chain =
        FilterChain::new().with_filter(SyncFilter::new(queue.factory(), &config()));
    let events = vec![
        Ok::<_, String>((block(1), Transaction::success(hash(5)))),
        Ok((block(1), Transaction::success(hash(6)))),
    ];
    assert_matches!(chain.run(&(), events, None), Err(TxqError::QueueLock));
    assert_eq!(queue.entry(&hash(5)).unwrap().status, QueueStatus::Pending);
    assert_eq!(queue.entry(&hash(6)).unwrap().status, QueueStatus::Pending);
}
