//! Local socket front door of the transaction queue.
//!
//! Clients connect to a unix domain socket, send one line of hex and receive a four byte result
//! code, optionally followed by raw bytes. The [`SessionServer`] handles one connection at a
//! time and hands it to a [`Processor`], which reads the request through
//! [`ClientSession::receive`] and may answer through [`ClientSession::respond`].
//!
//! ```no_run
//! use txq_config::SessionConfig;
//! use txq_errors::TxqResult;
//! use txq_session::{ClientSession, SessionServer, ShutdownSignal};
//!
//! let processor =
//!     |session: &mut ClientSession| -> TxqResult<i64> { Ok(session.receive()?.len() as i64) };
//! let mut server = SessionServer::bind(SessionConfig::default(), processor)?;
//! server.run(&ShutdownSignal::new())?;
//! # Ok::<(), txq_errors::TxqError>(())
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod codec;
mod metrics;
mod server;
mod session;

pub use codec::{
    decode_hex, decode_request, encode_response, RawTxPayload, ResultCode, RESULT_CODE_LEN,
};
pub use server::{Processor, SessionServer, ShutdownSignal};
pub use session::ClientSession;

/// Registers descriptions for the metrics emitted by [`SessionServer`].
pub fn describe_metrics() {
    crate::metrics::SessionServerMetrics::describe();
}
