//! Pipeline facing filter interface.

use crate::filter::SyncFilter;
use std::fmt;
use tracing::{error, trace};
use txq_errors::{TxqError, TxqResult};
use txq_queue::{Block, QueueAdapterFactory, Transaction};

/// A step invoked by the sync pipeline for every confirmed transaction.
///
/// `C` is the pipeline's connection to its own store, handed through untouched.
pub trait ConfirmationFilter<C: ?Sized> {
    /// Processes one confirmation.
    ///
    /// Returns true if the event was fully consumed and later filters must not see it.
    fn filter(
        &mut self,
        conn: &C,
        block: &Block,
        tx: &Transaction,
        session: Option<&str>,
    ) -> TxqResult<bool>;
}

impl<C: ?Sized, F: QueueAdapterFactory> ConfirmationFilter<C> for SyncFilter<F> {
    /// Reconciles the transaction and never consumes the event, so downstream filters still run.
    fn filter(
        &mut self,
        _conn: &C,
        block: &Block,
        tx: &Transaction,
        session: Option<&str>,
    ) -> TxqResult<bool> {
        let outcome = self.reconcile(block, tx)?;
        trace!(target: "sync::filter", hash = %tx.hash, ?session, ?outcome, "filter done");
        Ok(false)
    }
}

/// Runs confirmations through an ordered list of filters.
pub struct FilterChain<C: ?Sized> {
    filters: Vec<Box<dyn ConfirmationFilter<C>>>,
}

impl<C: ?Sized> FilterChain<C> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Appends a filter.
    pub fn with_filter(mut self, filter: impl ConfirmationFilter<C> + 'static) -> Self {
        self.push(filter);
        self
    }

    /// Appends a filter.
    pub fn push(&mut self, filter: impl ConfirmationFilter<C> + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Passes one confirmation through the filters, in order, until one consumes it.
    ///
    /// Returns the number of filters that ran.
    pub fn apply(
        &mut self,
        conn: &C,
        block: &Block,
        tx: &Transaction,
        session: Option<&str>,
    ) -> TxqResult<usize> {
        for (idx, filter) in self.filters.iter_mut().enumerate() {
            if filter.filter(conn, block, tx, session)? {
                trace!(target: "sync::chain", hash = %tx.hash, filter = idx, "consumed");
                return Ok(idx + 1)
            }
        }
        Ok(self.filters.len())
    }

    /// Drains confirmations from a source strictly in order.
    ///
    /// A failing source aborts with [`TxqError::TxSource`]. Returns the number of confirmations
    /// processed.
    pub fn run<I, E>(&mut self, conn: &C, events: I, session: Option<&str>) -> TxqResult<usize>
    where
        I: IntoIterator<Item = Result<(Block, Transaction), E>>,
        E: fmt::Display,
    {
        let mut processed = 0;
        for event in events {
            let (block, tx) = event.map_err(|err| {
                error!(target: "sync::chain", %err, processed, "confirmation source failed");
                TxqError::TxSource(err.to_string())
            })?;
            self.apply(conn, &block, &tx, session)?;
            processed += 1;
        }
        Ok(processed)
    }
}

impl<C: ?Sized> Default for FilterChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for FilterChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain").field("filters", &self.filters.len()).finish()
    }
}
