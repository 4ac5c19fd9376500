//! Reconciliation of confirmed transactions into the local queue.

use crate::metrics::SyncFilterMetrics;
use std::{fmt, sync::Arc};
use tracing::{debug, trace, warn};
use txq_config::SyncConfig;
use txq_errors::{TxqError, TxqResult};
use txq_queue::{
    Block, BlockNumber, CachedResource, CachedTransaction, QueueAdapter, QueueAdapterFactory,
    QueueError, QueueStatus, Throttle, Transaction, TxHash,
};
use txq_retry::RetryGuard;

/// Outcome of reconciling a single confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The transaction was tracked and has been classified.
    Handled(QueueStatus),
    /// The transaction is not tracked locally. Nothing was changed.
    NotTracked,
    /// The transaction had already been classified, by an earlier event or another writer.
    AlreadyFinal(QueueStatus),
}

impl Reconciled {
    /// Returns true if this call changed the queue.
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// Which queue operation a failure happened in. Decides the error raised once the retry budget
/// is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Lookup,
    Write,
}

impl Phase {
    fn give_up(self, err: QueueError) -> TxqError {
        match self {
            Self::Lookup => TxqError::backend(err),
            Self::Write => err.into(),
        }
    }
}

/// Keeps the local queue consistent with the confirmation stream.
///
/// For every confirmed transaction the filter checks whether it is tracked locally and, if so,
/// marks it succeeded or failed. The queue adapter is bound to the block height of the event and
/// only rebuilt when the height changes or after a storage failure. Failures caused by concurrent
/// writers (lock contention, deleted files, entries vanishing mid-write) are retried with a
/// bounded backoff and stay invisible to the caller unless the backoff is exhausted.
pub struct SyncFilter<F: QueueAdapterFactory> {
    factory: F,
    adapter: CachedResource<BlockNumber, F::Adapter>,
    guard: RetryGuard,
    throttle: Option<Arc<dyn Throttle + Send + Sync>>,
    metrics: SyncFilterMetrics,
}

impl<F: QueueAdapterFactory> SyncFilter<F> {
    /// Creates a new filter building adapters with `factory`.
    pub fn new(factory: F, config: &SyncConfig) -> Self {
        Self {
            factory,
            adapter: CachedResource::new(),
            guard: RetryGuard::from_config(&config.retry),
            throttle: None,
            metrics: SyncFilterMetrics::default(),
        }
    }

    /// Releases backpressure on `throttle` for every classified transaction.
    pub fn with_throttle(mut self, throttle: Arc<dyn Throttle + Send + Sync>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Number of adapters built so far.
    pub const fn adapter_builds(&self) -> u64 {
        self.adapter.builds()
    }

    /// Forces the adapter to be rebuilt on the next event.
    pub fn invalidate(&mut self) {
        self.adapter.invalidate();
    }

    /// Reconciles one confirmed transaction into the queue.
    ///
    /// Returns [`Reconciled::NotTracked`] for transactions the queue does not know about. Fails
    /// with [`TxqError::Backend`] or [`TxqError::QueueLock`] once storage failures outlast the
    /// retry budget.
    pub fn reconcile(&mut self, block: &Block, tx: &Transaction) -> TxqResult<Reconciled> {
        let Some(cached) = self.lookup(block.number, &tx.hash)? else {
            trace!(target: "sync::filter", hash = %tx.hash, block = block.number, "not tracked");
            self.metrics.not_tracked.increment(1);
            return Ok(Reconciled::NotTracked)
        };

        if cached.status.is_final() {
            debug!(
                target: "sync::filter",
                hash = %tx.hash,
                status = ?cached.status,
                "already classified"
            );
            self.metrics.already_final.increment(1);
            self.release(&tx.hash);
            return Ok(Reconciled::AlreadyFinal(cached.status))
        }

        let outcome = self.classify(block, tx)?;
        match outcome {
            Reconciled::Handled(status) => {
                debug!(
                    target: "sync::filter",
                    hash = %tx.hash,
                    block = block.number,
                    ?status,
                    "classified"
                );
                self.metrics.handled.increment(1);
            }
            Reconciled::AlreadyFinal(status) => {
                debug!(
                    target: "sync::filter",
                    hash = %tx.hash,
                    ?status,
                    "classified by another writer"
                );
                self.metrics.already_final.increment(1);
            }
            Reconciled::NotTracked => return Ok(outcome),
        }
        self.release(&tx.hash);
        Ok(outcome)
    }

    /// Releases one pending submission of `hash` once it reached a final status.
    fn release(&self, hash: &TxHash) {
        if let Some(throttle) = &self.throttle {
            throttle.dec(hash);
        }
    }

    /// Looks up `hash`, retrying storage failures with a rebuilt adapter.
    fn lookup(
        &mut self,
        height: BlockNumber,
        hash: &TxHash,
    ) -> TxqResult<Option<CachedTransaction>> {
        self.guard.reset();
        loop {
            if let Err(err) = self.refresh_adapter(height) {
                self.back_off(hash, err, Phase::Lookup)?;
                continue
            }
            let Some(adapter) = self.adapter.get_mut() else { continue };

            match adapter.get(hash) {
                Ok(cached) => return Ok(Some(cached)),
                Err(QueueError::NotTracked(_)) => return Ok(None),
                Err(err) => self.back_off(hash, err, Phase::Lookup)?,
            }
        }
    }

    /// Marks the transaction succeeded or failed.
    ///
    /// Whenever the adapter had to be rebuilt, the entry is fetched again before writing.
    fn classify(&mut self, block: &Block, tx: &Transaction) -> TxqResult<Reconciled> {
        let status =
            if tx.status.is_success() { QueueStatus::Succeeded } else { QueueStatus::Failed };

        self.guard.reset();
        loop {
            let rebuilt = match self.refresh_adapter(block.number) {
                Ok(rebuilt) => rebuilt,
                Err(err) => {
                    self.back_off(&tx.hash, err, Phase::Write)?;
                    continue
                }
            };
            let Some(adapter) = self.adapter.get_mut() else { continue };

            if rebuilt {
                match adapter.get(&tx.hash) {
                    Ok(cached) if cached.status.is_final() => {
                        return Ok(Reconciled::AlreadyFinal(cached.status))
                    }
                    Ok(_) => {}
                    Err(err) => {
                        self.back_off(&tx.hash, err, Phase::Write)?;
                        continue
                    }
                }
            }

            let res = match status {
                QueueStatus::Succeeded => adapter.succeed(block, tx),
                _ => adapter.fail(block, tx),
            };
            match res {
                Ok(()) => return Ok(Reconciled::Handled(status)),
                Err(err) => self.back_off(&tx.hash, err, Phase::Write)?,
            }
        }
    }

    /// Makes sure the current adapter is bound to `height`.
    fn refresh_adapter(&mut self, height: BlockNumber) -> Result<bool, QueueError> {
        let factory = &self.factory;
        self.adapter.refresh(height, |height| {
            debug!(target: "sync::filter", height, "building queue adapter");
            factory.build(*height)
        })
    }

    /// Invalidates the adapter and sleeps before the next attempt.
    ///
    /// Returns the give-up error for `phase` once the retry budget is spent.
    fn back_off(&mut self, hash: &TxHash, err: QueueError, phase: Phase) -> TxqResult<()> {
        warn!(
            target: "sync::filter",
            %hash,
            ?phase,
            %err,
            attempt = self.guard.attempts() + 1,
            "queue operation failed, rebuilding adapter"
        );
        self.adapter.invalidate();
        self.metrics.retries.increment(1);
        let res = self.guard.attempt(phase.give_up(err));
        if res.is_err() {
            self.metrics.failures.increment(1);
        }
        res
    }
}

impl<F: QueueAdapterFactory> fmt::Debug for SyncFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncFilter")
            .field("height", &self.adapter.key())
            .field("adapter_builds", &self.adapter.builds())
            .field("guard", &self.guard)
            .field("throttled", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use txq_config::RetryConfig;
    use txq_queue::{
        test_utils::{Failure, MemoryQueue},
        PendingThrottle, B256,
    };

    fn config() -> SyncConfig {
        SyncConfig { retry: RetryConfig::new(Duration::from_millis(1), Duration::from_millis(10)) }
    }

    fn block(number: u64) -> Block {
        Block::new(number, B256::repeat_byte(number as u8))
    }

    #[test]
    fn untracked_is_a_noop() {
        let queue = MemoryQueue::new();
        let mut filter = SyncFilter::new(queue.factory(), &config());

        let outcome = filter.reconcile(&block(1), &Transaction::success(B256::repeat_byte(7)));
        assert_matches!(outcome, Ok(Reconciled::NotTracked));
        assert_eq!(queue.writes(), 0);
        assert_eq!(queue.entry(&B256::repeat_byte(7)), None);
    }

    #[test]
    fn classifies_success_and_failure() {
        let queue = MemoryQueue::new();
        let ok = B256::repeat_byte(1);
        let reverted = B256::repeat_byte(2);
        queue.track(ok).track(reverted);
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(3), &Transaction::success(ok)),
            Ok(Reconciled::Handled(QueueStatus::Succeeded))
        );
        assert_matches!(
            filter.reconcile(&block(3), &Transaction::failure(reverted)),
            Ok(Reconciled::Handled(QueueStatus::Failed))
        );
        assert_eq!(queue.entry(&ok).unwrap().status, QueueStatus::Succeeded);
        assert_eq!(queue.entry(&reverted).unwrap().block, Some(3));
        // same height, adapter reused
        assert_eq!(queue.builds(), vec![3]);
    }

    #[test]
    fn duplicate_confirmation_is_not_written_twice() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(4);
        queue.track(hash);
        let mut filter = SyncFilter::new(queue.factory(), &config());

        filter.reconcile(&block(1), &Transaction::success(hash)).unwrap();
        assert_matches!(
            filter.reconcile(&block(1), &Transaction::success(hash)),
            Ok(Reconciled::AlreadyFinal(QueueStatus::Succeeded))
        );
        assert_eq!(queue.writes(), 1);
    }

    #[test]
    fn height_change_rebuilds_adapter() {
        let queue = MemoryQueue::new();
        let mut filter = SyncFilter::new(queue.factory(), &config());
        let tx = Transaction::success(B256::ZERO);

        filter.reconcile(&block(1), &tx).unwrap();
        filter.reconcile(&block(1), &tx).unwrap();
        filter.reconcile(&block(2), &tx).unwrap();
        assert_eq!(queue.builds(), vec![1, 2]);

        filter.invalidate();
        filter.reconcile(&block(2), &tx).unwrap();
        assert_eq!(queue.builds(), vec![1, 2, 2]);
    }

    #[test]
    fn one_shot_lookup_race_rebuilds_once() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(5);
        queue.track(hash).fail_next_get(Failure::MissingFile);
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(8), &Transaction::success(hash)),
            Ok(Reconciled::Handled(QueueStatus::Succeeded))
        );
        // initial build plus exactly one rebuild
        assert_eq!(queue.builds(), vec![8, 8]);
        assert_eq!(queue.writes(), 1);
    }

    #[test]
    fn write_races_are_retried_with_refetch() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(6);
        queue
            .track(hash)
            .fail_next_write(Failure::LockContention)
            .fail_next_write(Failure::MissingFile);
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(2), &Transaction::failure(hash)),
            Ok(Reconciled::Handled(QueueStatus::Failed))
        );
        assert_eq!(queue.builds(), vec![2, 2, 2]);
        // one lookup plus one re-fetch per rebuild
        assert_eq!(queue.gets(), 3);
        assert_eq!(queue.entry(&hash).unwrap().status, QueueStatus::Failed);
    }

    #[test]
    fn sustained_lookup_failure_surfaces_backend_error() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(1);
        queue.track(hash);
        for _ in 0..16 {
            queue.fail_next_get(Failure::Backend);
        }
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(1), &Transaction::success(hash)),
            Err(TxqError::Backend(_))
        );
        assert_eq!(queue.writes(), 0);
    }

    #[test]
    fn sustained_lock_contention_surfaces_queue_lock() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(1);
        queue.track(hash);
        for _ in 0..16 {
            queue.fail_next_write(Failure::LockContention);
        }
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(1), &Transaction::success(hash)),
            Err(TxqError::QueueLock)
        );
        assert_eq!(queue.entry(&hash).unwrap().status, QueueStatus::Pending);
    }

    #[test]
    fn build_failure_is_retried() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(3);
        queue.track(hash).fail_next_build(Failure::LockContention);
        let mut filter = SyncFilter::new(queue.factory(), &config());

        assert_matches!(
            filter.reconcile(&block(4), &Transaction::success(hash)),
            Ok(Reconciled::Handled(_))
        );
        assert_eq!(queue.builds(), vec![4]);
    }

    #[test]
    fn classified_transaction_releases_throttle() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(9);
        queue.track(hash);
        let throttle = Arc::new(PendingThrottle::new());
        throttle.inc(&hash);
        throttle.inc(&hash);

        let mut filter =
            SyncFilter::new(queue.factory(), &config()).with_throttle(throttle.clone());
        filter.reconcile(&block(1), &Transaction::success(hash)).unwrap();
        assert_eq!(throttle.pending(&hash), 1);

        // untracked transactions leave the throttle alone
        filter.reconcile(&block(1), &Transaction::success(B256::ZERO)).unwrap();
        assert_eq!(throttle.pending(&hash), 1);

        assert_matches!(
            filter.reconcile(&block(1), &Transaction::success(hash)),
            Ok(Reconciled::AlreadyFinal(QueueStatus::Succeeded))
        );
        assert_eq!(throttle.pending(&hash), 0);
        assert_eq!(throttle.total(), 0);
    }

    #[test]
    fn concurrent_classification_releases_throttle() {
        let queue = MemoryQueue::new();
        let hash = B256::repeat_byte(10);
        queue.track(hash).fail_next_write(Failure::ConcurrentWriter);
        let throttle = Arc::new(PendingThrottle::new());
        throttle.inc(&hash);

        let mut filter =
            SyncFilter::new(queue.factory(), &config()).with_throttle(throttle.clone());
        assert_matches!(
            filter.reconcile(&block(3), &Transaction::failure(hash)),
            Ok(Reconciled::AlreadyFinal(QueueStatus::Succeeded))
        );
        // the re-fetch after the rebuild saw the other writer's result
        assert_eq!(queue.builds(), vec![3, 3]);
        assert_eq!(queue.gets(), 2);
        assert_eq!(queue.writes(), 0);
        assert_eq!(throttle.pending(&hash), 0);
    }
}
