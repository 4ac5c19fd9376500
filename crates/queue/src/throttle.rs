//! Backpressure on locally submitted transactions.

use crate::primitives::TxHash;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// Tracks how many submissions are still awaiting confirmation.
///
/// The session side increments on submit, the confirmation filter decrements once the
/// transaction has been classified.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Throttle {
    /// Records a new pending submission.
    fn inc(&self, hash: &TxHash);

    /// Releases one pending submission.
    fn dec(&self, hash: &TxHash);

    /// Pending submissions for `hash`.
    fn pending(&self, hash: &TxHash) -> usize;
}

/// A [`Throttle`] that keeps per transaction counters in memory.
#[derive(Debug, Default)]
pub struct PendingThrottle {
    counts: Mutex<HashMap<TxHash, usize>>,
}

impl PendingThrottle {
    /// Creates an empty throttle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all pending submissions.
    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }

    /// Returns true if `limit` or more submissions are pending.
    pub fn is_saturated(&self, limit: usize) -> bool {
        self.total() >= limit
    }
}

impl Throttle for PendingThrottle {
    fn inc(&self, hash: &TxHash) {
        let mut counts = self.counts.lock();
        let count = counts.entry(*hash).or_default();
        *count += 1;
        trace!(target: "queue::throttle", %hash, pending = *count, "throttle inc");
    }

    fn dec(&self, hash: &TxHash) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(hash) {
            *count -= 1;
            trace!(target: "queue::throttle", %hash, pending = *count, "throttle dec");
            if *count == 0 {
                counts.remove(hash);
            }
        }
    }

    fn pending(&self, hash: &TxHash) -> usize {
        self.counts.lock().get(hash).copied().unwrap_or_default()
    }
}

/// A [`Throttle`] that never holds anything back.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct NoopThrottle;

impl Throttle for NoopThrottle {
    fn inc(&self, _hash: &TxHash) {}

    fn dec(&self, _hash: &TxHash) {}

    fn pending(&self, _hash: &TxHash) -> usize {
        0
    }
}
