//! Keeps the local transaction queue in line with confirmed blocks.
//!
//! The sync pipeline hands every confirmed transaction to a [`FilterChain`]. The
//! [`SyncFilter`] in that chain marks tracked transactions as succeeded or failed and passes the
//! event on unchanged.
//!
//! ## Usage
//!
//! ```ignore
//! let mut chain = FilterChain::new().with_filter(SyncFilter::new(factory, &config.sync));
//! chain.run(&conn, confirmations, Some(session))?;
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod chain;
mod filter;
mod metrics;

pub use chain::{ConfirmationFilter, FilterChain};
pub use filter::{Reconciled, SyncFilter};

/// Registers descriptions for the metrics emitted by [`SyncFilter`].
pub fn describe_metrics() {
    crate::metrics::SyncFilterMetrics::describe();
}
