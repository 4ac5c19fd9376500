//! Session server metrics.

use metrics::{counter, describe_counter, Counter};

/// Session server metrics
#[derive(Clone)]
pub(crate) struct SessionServerMetrics {
    /// Number of accepted connections
    pub(crate) accepted: Counter,
    /// Number of requests the processor completed
    pub(crate) served: Counter,
    /// Number of requests that failed
    pub(crate) failed: Counter,
    /// Number of processor retries after a backend failure
    pub(crate) retries: Counter,
}

impl SessionServerMetrics {
    /// Describe session server metrics
    pub(crate) fn describe() {
        describe_counter!("session_server.accepted", "Number of accepted connections");
        describe_counter!("session_server.served", "Number of requests the processor completed");
        describe_counter!("session_server.failed", "Number of requests that failed");
        describe_counter!(
            "session_server.retries",
            "Number of processor retries after a backend failure"
        );
    }
}

impl Default for SessionServerMetrics {
    fn default() -> Self {
        Self {
            accepted: counter!("session_server.accepted"),
            served: counter!("session_server.served"),
            failed: counter!("session_server.failed"),
            retries: counter!("session_server.retries"),
        }
    }
}
