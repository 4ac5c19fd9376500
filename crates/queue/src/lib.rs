//! Interfaces and primitives of the local transaction queue.
//!
//! The persisted queue is an external collaborator. This crate defines how the rest of the
//! workspace talks to it:
//!
//! - [`QueueAdapter`]: lookup and classification of tracked transactions.
//! - [`QueueAdapterFactory`]: opens an adapter for a block height.
//! - [`CachedResource`]: keeps the current adapter until it is invalidated.
//! - [`Throttle`]: per transaction backpressure released on confirmation.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export an in-memory queue with scripted failures.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod adapter;
mod cached;
mod primitives;
mod throttle;

pub use adapter::{
    CachedTransaction, QueueAdapter, QueueAdapterFactory, QueueError, QueueStatus,
};
pub use cached::CachedResource;
pub use primitives::{
    Block, BlockHash, BlockNumber, ExecutionStatus, ParseHashError, Transaction, TxHash, B256,
};
pub use throttle::{NoopThrottle, PendingThrottle, Throttle};

#[cfg(any(test, feature = "test-utils"))]
/// Common test helpers for mocking out the queue.
pub mod test_utils;
