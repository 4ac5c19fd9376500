//! Error vocabulary shared by the confirmation filter and the session server.
//!
//! Every failure the reconciliation layer can surface is a variant of [`TxqError`]. Callers do
//! not match on variants to decide control flow in the common cases, they use the classifiers:
//!
//! - [`TxqError::is_benign`]: nothing went wrong, there was simply nothing ready.
//! - [`TxqError::is_connection_local`]: only the current client request is affected.
//! - [`TxqError::is_retryable`]: a transient storage failure worth another guarded attempt.
//! - [`TxqError::is_fatal`]: the component that raised it cannot continue.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{io, path::PathBuf};

/// Result alias for [`TxqError`].
pub type TxqResult<T> = Result<T, TxqError>;

/// Boxed error used for opaque storage failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures raised by the reconciliation and session layers.
#[derive(Debug, thiserror::Error)]
pub enum TxqError {
    /// The upstream confirmation source malfunctioned.
    #[error("transaction source failed: {0}")]
    TxSource(String),
    /// Nothing was ready yet. This is a signal, not a failure.
    #[error("nothing to do")]
    NothingToDo,
    /// The socket file backing a listener vanished or was replaced.
    #[error("listener socket {} is gone", path.display())]
    ClientGone {
        /// Path the listener was bound to.
        path: PathBuf,
    },
    /// Reading from the client would block; retry at the outer loop.
    #[error("client read would block")]
    ClientBlock,
    /// The client sent a malformed payload.
    #[error("invalid client input: {0}")]
    ClientInput(String),
    /// Talking to one client failed at the socket level.
    #[error("client connection failed: {0}")]
    ClientIo(#[source] io::Error),
    /// A queue lock could not be obtained before the retry ceiling was reached.
    #[error("queue lock could not be obtained")]
    QueueLock,
    /// The persisted store failed and retries were exhausted.
    #[error("queue backend error: {0}")]
    Backend(#[source] BoxError),
    /// Listener level I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TxqError {
    /// Wraps any error as a [`TxqError::Backend`].
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    /// Creates a [`TxqError::ClientInput`] from a displayable reason.
    pub fn client_input(reason: impl ToString) -> Self {
        Self::ClientInput(reason.to_string())
    }

    /// Returns true if the error only signals that nothing was pending.
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::NothingToDo)
    }

    /// Returns true if the error only concerns the current client connection.
    ///
    /// The listener keeps accepting after such an error.
    pub const fn is_connection_local(&self) -> bool {
        matches!(self, Self::ClientBlock | Self::ClientInput(_) | Self::ClientIo(_))
    }

    /// Returns true if a guarded retry of the same operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Returns true if the raising component must stop.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ClientGone { .. } | Self::TxSource(_) | Self::Io(_))
    }
}
