//! A single accepted connection.

use crate::codec::{decode_hex, decode_request, encode_response, RawTxPayload};
use std::{
    io::{self, Read, Write},
    net::Shutdown,
    os::unix::net::UnixStream,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, trace};
use txq_config::SessionConfig;
use txq_errors::{TxqError, TxqResult};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Read chunk size used while receiving a request.
const READ_CHUNK: usize = 4096;

/// One client connection.
///
/// The session owns the peer socket until it replies: [`ClientSession::respond`] sends exactly one
/// frame and closes the connection, later calls do nothing.
#[derive(Debug)]
pub struct ClientSession {
    id: u64,
    stream: Option<UnixStream>,
    request: Option<RawTxPayload>,
    receive_timeout: Duration,
    max_request_size: usize,
}

impl ClientSession {
    /// Wraps an accepted stream.
    pub fn new(stream: UnixStream, config: &SessionConfig) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            stream: Some(stream),
            request: None,
            receive_timeout: config.receive_timeout,
            max_request_size: config.max_request_size,
        }
    }

    /// Identifier used to correlate log lines of this connection.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once the session replied or was closed.
    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Reads and decodes the request line.
    ///
    /// Reading stops at the first newline, at end of stream, at `max_request_size` bytes or when
    /// the peer stays silent for the receive timeout after sending something. Once a request was
    /// decoded, later calls return it again without touching the socket.
    ///
    /// Fails with [`TxqError::ClientBlock`] if the peer sent nothing at all, with
    /// [`TxqError::ClientInput`] if the line is not valid hex and with [`TxqError::ClientIo`] if
    /// the socket itself fails.
    pub fn receive(&mut self) -> TxqResult<RawTxPayload> {
        if let Some(request) = &self.request {
            return Ok(request.clone())
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TxqError::ClientIo(io::ErrorKind::NotConnected.into()))?;
        stream.set_read_timeout(Some(self.receive_timeout)).map_err(TxqError::ClientIo)?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        while buf.len() < self.max_request_size {
            let want = (self.max_request_size - buf.len()).min(READ_CHUNK);
            match stream.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    let read = &chunk[..n];
                    if let Some(pos) = read.iter().position(|b| *b == b'\n') {
                        buf.extend_from_slice(&read[..pos]);
                        break
                    }
                    buf.extend_from_slice(read);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => break,
                Err(err) => return Err(TxqError::ClientIo(err)),
            }
        }

        if buf.is_empty() {
            trace!(target: "session::client", id = self.id, "nothing to read");
            return Err(TxqError::ClientBlock)
        }
        let request = decode_request(&buf)?;
        trace!(target: "session::client", id = self.id, len = request.len(), "received request");
        Ok(self.request.insert(request).clone())
    }

    /// Sends the reply frame and closes the connection.
    ///
    /// `extra_hex` is decoded before anything is written; if it is not valid hex the connection is
    /// closed without a reply and [`TxqError::ClientInput`] is returned. A peer that already hung
    /// up is not an error.
    pub fn respond(&mut self, code: impl Into<u32>, extra_hex: Option<&str>) -> TxqResult<()> {
        let Some(mut stream) = self.stream.take() else {
            trace!(target: "session::client", id = self.id, "already responded");
            return Ok(())
        };

        let extra = match extra_hex.map(decode_hex).transpose() {
            Ok(extra) => extra.unwrap_or_default(),
            Err(err) => {
                close(&stream);
                return Err(err)
            }
        };

        let code = code.into();
        let res = stream.write_all(&encode_response(code, &extra)).and_then(|()| stream.flush());
        close(&stream);

        match res {
            Ok(()) => {
                trace!(
                    target: "session::client",
                    id = self.id,
                    code,
                    extra = extra.len(),
                    "responded"
                );
                Ok(())
            }
            Err(err) if is_disconnect(&err) => {
                debug!(target: "session::client", id = self.id, %err, "peer hung up before reply");
                Ok(())
            }
            Err(err) => Err(TxqError::ClientIo(err)),
        }
    }

    /// Closes the connection without replying.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            close(&stream);
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn close(stream: &UnixStream) {
    // the peer may be gone already
    let _ = stream.shutdown(Shutdown::Both);
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ResultCode;
    use assert_matches::assert_matches;

    fn session() -> (ClientSession, UnixStream) {
        let (server, client) = UnixStream::pair().unwrap();
        let config = SessionConfig {
            receive_timeout: Duration::from_millis(20),
            max_request_size: 64,
            ..Default::default()
        };
        (ClientSession::new(server, &config), client)
    }

    #[test]
    fn receives_one_line() {
        let (mut session, mut client) = session();
        client.write_all(b"0xDEADBEEF\nignored").unwrap();
        assert_eq!(session.receive().unwrap().as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        // cached
        assert_eq!(session.receive().unwrap().as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn receives_until_silence() {
        let (mut session, mut client) = session();
        client.write_all(b" deadbeef ").unwrap();
        assert_eq!(session.receive().unwrap().as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn silent_or_closed_peer_would_block() {
        let (mut session, client) = session();
        assert_matches!(session.receive(), Err(TxqError::ClientBlock));
        drop(client);
        assert_matches!(session.receive(), Err(TxqError::ClientBlock));
    }

    #[test]
    fn oversized_request_is_cut() {
        let (mut session, mut client) = session();
        client.write_all(&[b'a'; 65]).unwrap();
        // 64 hex digits
        assert_eq!(session.receive().unwrap().len(), 32);
    }

    #[test]
    fn rejects_malformed_request() {
        let (mut session, mut client) = session();
        client.write_all(b"not hex\n").unwrap();
        assert_matches!(session.receive(), Err(TxqError::ClientInput(_)));
        assert!(!session.is_closed());
    }

    #[test]
    fn respond_writes_one_frame_and_closes() {
        let (mut session, mut client) = session();
        session.respond(ResultCode::OK, Some("0xbeef")).unwrap();
        assert!(session.is_closed());
        session.respond(ResultCode::ERR_UNKNOWN, None).unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, vec![0, 0, 0, 0, 0xbe, 0xef]);
    }

    #[test]
    fn respond_code_only() {
        let (mut session, mut client) = session();
        session.respond(7u32, None).unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, vec![0, 0, 0, 7]);
    }

    #[test]
    fn respond_to_gone_peer_still_closes() {
        let (mut session, client) = session();
        drop(client);
        session.respond(ResultCode::OK, None).unwrap();
        assert!(session.is_closed());
    }

    #[test]
    fn invalid_extra_closes_without_reply() {
        let (mut session, mut client) = session();
        assert_matches!(
            session.respond(ResultCode::OK, Some("xyz")),
            Err(TxqError::ClientInput(_))
        );
        assert!(session.is_closed());
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn socket_failures_stay_with_the_client() {
        let (server, _client) = UnixStream::pair().unwrap();
        // a zero read timeout is rejected by the socket
        let config = SessionConfig { receive_timeout: Duration::ZERO, ..Default::default() };
        let mut session = ClientSession::new(server, &config);
        let err = session.receive().unwrap_err();
        assert_matches!(&err, TxqError::ClientIo(e) if e.kind() == io::ErrorKind::InvalidInput);
        assert!(err.is_connection_local());

        session.close();
        assert_matches!(session.receive(), Err(TxqError::ClientIo(_)));
    }

    #[test]
    fn ids_are_unique() {
        let (a, _ca) = session();
        let (b, _cb) = session();
        assert_ne!(a.id(), b.id());
    }
}
