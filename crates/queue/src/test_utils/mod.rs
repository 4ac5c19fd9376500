//! In-memory queue with scripted failures.

use crate::{
    adapter::{CachedTransaction, QueueAdapter, QueueAdapterFactory, QueueError, QueueStatus},
    primitives::{Block, BlockNumber, Transaction, TxHash},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};

/// Failure to inject into the next matching queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// A concurrent writer deleted the backing file.
    MissingFile,
    /// Another writer holds the lock.
    LockContention,
    /// The transaction vanished from the queue.
    NotTracked,
    /// Unspecified storage failure.
    Backend,
    /// Another writer marks the transaction succeeded and holds the lock while doing so.
    ConcurrentWriter,
}

impl Failure {
    fn into_error(self, hash: &TxHash) -> QueueError {
        match self {
            Self::MissingFile => QueueError::MissingFile { path: PathBuf::from(hash.to_string()) },
            Self::LockContention | Self::ConcurrentWriter => QueueError::LockContention,
            Self::NotTracked => QueueError::NotTracked(*hash),
            Self::Backend => QueueError::backend("injected backend failure"),
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<TxHash, CachedTransaction>,
    get_failures: VecDeque<Failure>,
    write_failures: VecDeque<Failure>,
    build_failures: VecDeque<Failure>,
    builds: Vec<BlockNumber>,
    gets: usize,
    writes: usize,
}

/// A shared in-memory queue.
///
/// Clones share the same store, so a test can keep a handle while the code under test owns the
/// factory.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    store: Arc<Mutex<Store>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `hash` as pending.
    pub fn track(&self, hash: TxHash) -> &Self {
        self.store.lock().entries.insert(hash, CachedTransaction::pending(hash));
        self
    }

    /// Drops `hash` from the queue.
    pub fn untrack(&self, hash: &TxHash) {
        self.store.lock().entries.remove(hash);
    }

    /// Returns the current entry for `hash`.
    pub fn entry(&self, hash: &TxHash) -> Option<CachedTransaction> {
        self.store.lock().entries.get(hash).copied()
    }

    /// Makes the next lookup fail with `failure`.
    pub fn fail_next_get(&self, failure: Failure) -> &Self {
        self.store.lock().get_failures.push_back(failure);
        self
    }

    /// Makes the next succeed/fail call fail with `failure`.
    pub fn fail_next_write(&self, failure: Failure) -> &Self {
        self.store.lock().write_failures.push_back(failure);
        self
    }

    /// Makes the next adapter build fail with `failure`.
    pub fn fail_next_build(&self, failure: Failure) -> &Self {
        self.store.lock().build_failures.push_back(failure);
        self
    }

    /// Heights adapters were built for, in order.
    pub fn builds(&self) -> Vec<BlockNumber> {
        self.store.lock().builds.clone()
    }

    /// Number of lookups served, failed ones included.
    pub fn gets(&self) -> usize {
        self.store.lock().gets
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.store.lock().writes
    }

    /// Returns a factory producing adapters over this queue.
    pub fn factory(&self) -> MemoryQueueFactory {
        MemoryQueueFactory { queue: self.clone() }
    }

    fn write(
        &self,
        block: &Block,
        tx: &Transaction,
        status: QueueStatus,
    ) -> Result<(), QueueError> {
        let mut store = self.store.lock();
        if let Some(failure) = store.write_failures.pop_front() {
            if failure == Failure::ConcurrentWriter {
                if let Some(entry) = store.entries.get_mut(&tx.hash) {
                    entry.status = QueueStatus::Succeeded;
                    entry.block = Some(block.number);
                }
            }
            return Err(failure.into_error(&tx.hash))
        }
        let entry = store.entries.get_mut(&tx.hash).ok_or(QueueError::NotTracked(tx.hash))?;
        entry.status = status;
        entry.block = Some(block.number);
        store.writes += 1;
        Ok(())
    }
}

/// Builds [`MemoryQueueAdapter`]s over a [`MemoryQueue`].
#[derive(Debug, Clone)]
pub struct MemoryQueueFactory {
    queue: MemoryQueue,
}

impl QueueAdapterFactory for MemoryQueueFactory {
    type Adapter = MemoryQueueAdapter;

    fn build(&self, height: BlockNumber) -> Result<Self::Adapter, QueueError> {
        let mut store = self.queue.store.lock();
        if let Some(failure) = store.build_failures.pop_front() {
            return Err(failure.into_error(&Default::default()))
        }
        store.builds.push(height);
        Ok(MemoryQueueAdapter { queue: self.queue.clone(), height })
    }
}

/// Adapter over a [`MemoryQueue`] bound to one height.
#[derive(Debug)]
pub struct MemoryQueueAdapter {
    queue: MemoryQueue,
    height: BlockNumber,
}

impl MemoryQueueAdapter {
    /// Height the adapter was built for.
    pub const fn height(&self) -> BlockNumber {
        self.height
    }
}

impl QueueAdapter for MemoryQueueAdapter {
    fn get(&self, hash: &TxHash) -> Result<CachedTransaction, QueueError> {
        let mut store = self.queue.store.lock();
        store.gets += 1;
        if let Some(failure) = store.get_failures.pop_front() {
            return Err(failure.into_error(hash))
        }
        store.entries.get(hash).copied().ok_or(QueueError::NotTracked(*hash))
    }

    fn succeed(&mut self, block: &Block, tx: &Transaction) -> Result<(), QueueError> {
        self.queue.write(block, tx, QueueStatus::Succeeded)
    }

    fn fail(&mut self, block: &Block, tx: &Transaction) -> Result<(), QueueError> {
        self.queue.write(block, tx, QueueStatus::Failed)
    }
}
