//! Confirmation filter metrics.

use metrics::{counter, describe_counter, Counter};

/// Confirmation filter metrics
#[derive(Clone)]
pub(crate) struct SyncFilterMetrics {
    /// Number of confirmations classified into the queue
    pub(crate) handled: Counter,
    /// Number of confirmations for transactions not tracked locally
    pub(crate) not_tracked: Counter,
    /// Number of confirmations for transactions classified earlier
    pub(crate) already_final: Counter,
    /// Number of retried queue operations
    pub(crate) retries: Counter,
    /// Number of confirmations that exhausted the retry budget
    pub(crate) failures: Counter,
}

impl SyncFilterMetrics {
    /// Describe confirmation filter metrics
    pub(crate) fn describe() {
        describe_counter!(
            "sync_filter.handled",
            "Number of confirmations classified into the queue"
        );
        describe_counter!(
            "sync_filter.not_tracked",
            "Number of confirmations for transactions not tracked locally"
        );
        describe_counter!(
            "sync_filter.already_final",
            "Number of confirmations for transactions classified earlier"
        );
        describe_counter!("sync_filter.retries", "Number of retried queue operations");
        describe_counter!(
            "sync_filter.failures",
            "Number of confirmations that exhausted the retry budget"
        );
    }
}

impl Default for SyncFilterMetrics {
    fn default() -> Self {
        Self {
            handled: counter!("sync_filter.handled"),
            not_tracked: counter!("sync_filter.not_tracked"),
            already_final: counter!("sync_filter.already_final"),
            retries: counter!("sync_filter.retries"),
            failures: counter!("sync_filter.failures"),
        }
    }
}
