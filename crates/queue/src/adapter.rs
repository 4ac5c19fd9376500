//! Interfaces of the persisted queue.
//!
//! The storage engine itself lives outside this workspace. It is reached through
//! [`QueueAdapter`], built per block height by a [`QueueAdapterFactory`].

use crate::primitives::{Block, BlockNumber, Transaction, TxHash};
use std::path::PathBuf;
use txq_errors::{BoxError, TxqError};

/// Errors raised by a [`QueueAdapter`].
///
/// All of them except [`QueueError::Backend`] are expected under concurrent writers and are
/// retried by callers.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The transaction is not tracked by the local queue.
    #[error("transaction {0} is not tracked")]
    NotTracked(TxHash),
    /// A backing file was removed underneath the adapter, usually by a concurrent writer.
    #[error("queue file {} is missing", path.display())]
    MissingFile {
        /// The file that vanished.
        path: PathBuf,
    },
    /// Another writer holds the queue lock.
    #[error("queue is locked by another writer")]
    LockContention,
    /// Any other storage failure.
    #[error(transparent)]
    Backend(BoxError),
}

impl QueueError {
    /// Wraps any error as a [`QueueError::Backend`].
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    /// Returns true if the error is [`QueueError::NotTracked`].
    pub const fn is_not_tracked(&self) -> bool {
        matches!(self, Self::NotTracked(_))
    }
}

impl From<QueueError> for TxqError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::LockContention => Self::QueueLock,
            QueueError::Backend(err) => Self::Backend(err),
            err => Self::backend(err),
        }
    }
}

/// State of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// Submitted locally, no confirmation seen yet.
    Pending,
    /// Confirmed and executed successfully.
    Succeeded,
    /// Confirmed but execution failed.
    Failed,
}

impl QueueStatus {
    /// Returns true once the transaction has been classified.
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The queue's record of a locally tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedTransaction {
    /// Identity of the transaction.
    pub hash: TxHash,
    /// Tracked state.
    pub status: QueueStatus,
    /// Height of the confirming block, once classified.
    pub block: Option<BlockNumber>,
}

impl CachedTransaction {
    /// A freshly submitted transaction.
    pub const fn pending(hash: TxHash) -> Self {
        Self { hash, status: QueueStatus::Pending, block: None }
    }
}

/// Access to the persisted queue, bound to one block height.
pub trait QueueAdapter {
    /// Returns the cached entry, or [`QueueError::NotTracked`] when absent.
    fn get(&self, hash: &TxHash) -> Result<CachedTransaction, QueueError>;

    /// Marks a tracked transaction as successfully confirmed in `block`.
    fn succeed(&mut self, block: &Block, tx: &Transaction) -> Result<(), QueueError>;

    /// Marks a tracked transaction as confirmed but failed in `block`.
    fn fail(&mut self, block: &Block, tx: &Transaction) -> Result<(), QueueError>;
}

/// Builds [`QueueAdapter`]s.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait QueueAdapterFactory {
    /// The adapter type produced.
    type Adapter: QueueAdapter;

    /// Opens an adapter bound to the given block height.
    fn build(&self, height: BlockNumber) -> Result<Self::Adapter, QueueError>;
}
