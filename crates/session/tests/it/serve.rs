//! Clients talking to a running session server.

use assert_matches::assert_matches;
use std::{
    fs,
    io::{Read, Write},
    os::unix::net::UnixStream,
    path::Path,
    thread,
    time::Duration,
};
use txq_config::SessionConfig;
use txq_errors::{TxqError, TxqResult};
use txq_session::{ClientSession, ResultCode, SessionServer, ShutdownSignal, RESULT_CODE_LEN};

fn config(dir: &Path) -> SessionConfig {
    SessionConfig::with_socket_path(dir.join("session.sock"))
        .with_poll(Duration::from_millis(5), Duration::from_millis(20))
}

fn call(path: &Path, line: &str) -> Vec<u8> {
    let mut client = UnixStream::connect(path).unwrap();
    client.write_all(line.as_bytes()).unwrap();
    let mut reply = Vec::new();
    client.read_to_end(&mut reply).unwrap();
    reply
}

#[test]
fn serves_until_signalled() {
    txq_tracing::init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let signal = ShutdownSignal::new();

    let stop = signal.clone();
    let processor = move |session: &mut ClientSession| -> TxqResult<i64> {
        let payload = session.receive()?;
        if payload.as_bytes() == [0xff] {
            stop.trigger();
            return Ok(0)
        }
        // echo the payload reversed
        let mut reversed = payload.into_inner();
        reversed.reverse();
        session.respond(ResultCode::OK, Some(&hex::encode(&reversed)))?;
        Ok(1)
    };
    let mut server = SessionServer::bind(config.clone(), processor).unwrap();

    let path = config.socket_path.clone();
    let clients = thread::spawn(move || {
        let echo = call(&path, "0x010203\n");
        let bad = call(&path, "0xnope\n");
        let stop = call(&path, "ff\n");
        (echo, bad, stop)
    });

    server.run(&signal).unwrap();
    let (echo, bad, stop) = clients.join().unwrap();

    assert_eq!(echo, vec![0, 0, 0, 0, 3, 2, 1]);
    assert_eq!(bad.len(), RESULT_CODE_LEN);
    assert_eq!(bad, ResultCode::ERR_INPUT.0.to_be_bytes());
    assert_eq!(stop, vec![0, 0, 0, 0]);

    assert!(!server.is_listening());
    assert!(!config.socket_path.exists());
}

#[test]
fn stops_when_socket_disappears() {
    txq_tracing::init_test_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let processor = |_: &mut ClientSession| -> TxqResult<i64> { Ok(0) };
    let mut server = SessionServer::bind(config.clone(), processor).unwrap();

    fs::remove_file(&config.socket_path).unwrap();
    assert_matches!(server.run(&ShutdownSignal::new()), Err(TxqError::ClientGone { .. }));
    assert!(!server.is_listening());
}
