//! Unix socket listener serving one session at a time.

use crate::{codec::ResultCode, metrics::SessionServerMetrics, session::ClientSession};
use socket2::{Domain, SockAddr, Socket, Type};
use std::{
    fmt, fs, io,
    os::unix::{fs::FileTypeExt, net::UnixStream},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, trace, warn};
use txq_config::SessionConfig;
use txq_errors::{TxqError, TxqResult};
use txq_retry::RetryGuard;

/// Pending connections the kernel queues for us.
const BACKLOG: i32 = 128;

/// A zero socket timeout would block forever.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Handles the request of an accepted session.
///
/// Returns the amount of useful work done; anything above zero makes the server poll again
/// quickly. [`TxqError::Backend`] makes the server call the processor again for the same
/// session, within its retry budget.
pub trait Processor {
    /// Processes one session.
    fn process(&mut self, session: &mut ClientSession) -> TxqResult<i64>;
}

impl<F> Processor for F
where
    F: FnMut(&mut ClientSession) -> TxqResult<i64>,
{
    fn process(&mut self, session: &mut ClientSession) -> TxqResult<i64> {
        self(session)
    }
}

/// Cloneable flag telling [`SessionServer::run`] to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Accepts local connections and hands them to a [`Processor`], strictly one after another.
///
/// The accept timeout adapts to the load: after a request that did useful work the server polls
/// with `fast_poll`, otherwise with `slow_poll`.
pub struct SessionServer<P> {
    config: SessionConfig,
    processor: P,
    listener: Option<Socket>,
    timeout: Duration,
    metrics: SessionServerMetrics,
}

impl<P> SessionServer<P> {
    /// Path of the listening socket.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Current accept timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true until [`SessionServer::shutdown`] is called.
    pub const fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Closes the listener and removes the socket file. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        let Some(listener) = self.listener.take() else { return };
        drop(listener);

        let path = &self.config.socket_path;
        if is_socket(path) {
            if let Err(err) = fs::remove_file(path) {
                warn!(
                    target: "session::server",
                    path = %path.display(),
                    %err,
                    "failed to remove socket"
                );
            }
        }
        info!(target: "session::server", path = %path.display(), "session server stopped");
    }

    fn client_gone(&self) -> TxqError {
        TxqError::ClientGone { path: self.config.socket_path.clone() }
    }

    fn set_timeout(&mut self, timeout: Duration) -> TxqResult<()> {
        if let Some(listener) = &self.listener {
            listener.set_read_timeout(Some(timeout.max(MIN_TIMEOUT)))?;
        }
        if timeout != self.timeout {
            trace!(target: "session::server", ?timeout, "accept timeout changed");
        }
        self.timeout = timeout;
        Ok(())
    }
}

impl<P: Processor> SessionServer<P> {
    /// Binds the socket at the configured path, replacing a stale socket left there.
    ///
    /// Refuses to remove anything at that path that is not a socket. An invalid configuration
    /// fails with an [`io::ErrorKind::InvalidInput`] error before the path is touched.
    pub fn bind(config: SessionConfig, processor: P) -> TxqResult<Self> {
        config.validate().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        let path = &config.socket_path;
        prepare_socket_path(path)?;

        let listener = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        listener.bind(&SockAddr::unix(path)?)?;
        listener.listen(BACKLOG)?;
        info!(target: "session::server", path = %path.display(), "session server listening");

        let mut server = Self {
            timeout: config.slow_poll,
            config,
            processor,
            listener: Some(listener),
            metrics: SessionServerMetrics::default(),
        };
        server.set_timeout(server.config.slow_poll)?;
        Ok(server)
    }

    /// Waits up to the current timeout for the next connection.
    ///
    /// An accepted session shortens the accept timeout to the receive timeout until
    /// [`SessionServer::process`] picks the next poll interval.
    ///
    /// Fails with [`TxqError::NothingToDo`] if nobody connected in time and with
    /// [`TxqError::ClientGone`] once the socket path no longer points at a socket.
    pub fn accept(&mut self) -> TxqResult<ClientSession> {
        let Some(listener) = &self.listener else { return Err(self.client_gone()) };

        match listener.accept() {
            Ok((socket, _)) => {
                let session = ClientSession::new(UnixStream::from(socket), &self.config);
                self.metrics.accepted.increment(1);
                trace!(target: "session::server", id = session.id(), "accepted session");
                self.set_timeout(self.config.receive_timeout)?;
                Ok(session)
            }
            Err(err) if is_idle(&err) => {
                if is_socket(&self.config.socket_path) {
                    Err(TxqError::NothingToDo)
                } else {
                    Err(self.client_gone())
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Runs the processor for `session` and adapts the accept timeout to its result.
    ///
    /// Backend failures are retried with the configured backoff.
    pub fn process(&mut self, session: &mut ClientSession) -> TxqResult<i64> {
        let mut guard = RetryGuard::from_config(&self.config.retry);
        let res = loop {
            match self.processor.process(session) {
                Err(err) if err.is_retryable() => {
                    warn!(
                        target: "session::server",
                        id = session.id(),
                        %err,
                        attempt = guard.attempts() + 1,
                        "processor failed, retrying"
                    );
                    self.metrics.retries.increment(1);
                    if let Err(err) = guard.attempt(err) {
                        break Err(err)
                    }
                }
                res => break res,
            }
        };

        let timeout = match res {
            Ok(work) if work > 0 => self.config.fast_poll,
            _ => self.config.slow_poll,
        };
        self.set_timeout(timeout)?;
        res
    }

    /// Accepts and processes a single session.
    ///
    /// A session the processor left open is answered with [`ResultCode::OK`], or with the code
    /// matching the error if processing failed.
    pub fn serve_one(&mut self) -> TxqResult<i64> {
        let mut session = self.accept()?;
        match self.process(&mut session) {
            Ok(work) => {
                self.metrics.served.increment(1);
                if let Err(err) = session.respond(ResultCode::OK, None) {
                    warn!(target: "session::server", id = session.id(), %err, "failed to reply");
                }
                Ok(work)
            }
            Err(err) => {
                self.metrics.failed.increment(1);
                if !err.is_fatal() {
                    let code = ResultCode::for_error(&err);
                    if let Err(reply) = session.respond(code, None) {
                        debug!(
                            target: "session::server",
                            id = session.id(),
                            %reply,
                            "failed to reply"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Serves sessions until `signal` is triggered or the listener fails, then shuts down.
    pub fn run(&mut self, signal: &ShutdownSignal) -> TxqResult<()> {
        info!(target: "session::server", path = %self.config.socket_path.display(), "serving");
        let res = loop {
            if signal.is_triggered() {
                debug!(target: "session::server", "shutdown requested");
                break Ok(())
            }
            match self.serve_one() {
                Ok(work) => trace!(target: "session::server", work, "session done"),
                Err(err) if err.is_benign() => {}
                Err(err) if err.is_fatal() => {
                    error!(target: "session::server", %err, "listener failed");
                    break Err(err)
                }
                Err(err) => debug!(target: "session::server", %err, "session failed"),
            }
        };
        self.shutdown();
        res
    }
}

impl<P> Drop for SessionServer<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<P> fmt::Debug for SessionServer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionServer")
            .field("config", &self.config)
            .field("listening", &self.is_listening())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Creates the parent directory and clears a stale socket at `path`.
fn prepare_socket_path(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(target: "session::server", path = %path.display(), "removing stale socket");
            fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists but is not a socket", path.display()),
        )),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn is_socket(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_socket())
}

fn is_idle(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
