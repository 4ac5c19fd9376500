//! Wire format of the session socket.
//!
//! A request is a single line of hex, optionally prefixed with `0x`. A reply is a big-endian
//! `u32` result code followed by optional raw bytes.

use std::{fmt, ops::Deref};
use txq_errors::{TxqError, TxqResult};

/// Size of the result code at the start of every reply.
pub const RESULT_CODE_LEN: usize = 4;

/// Raw bytes of a decoded client request.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct RawTxPayload(Vec<u8>);

impl RawTxPayload {
    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for RawTxPayload {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for RawTxPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RawTxPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawTxPayload(0x{})", hex::encode(&self.0))
    }
}

/// Result code sent as the first four bytes of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    /// The request was processed.
    pub const OK: Self = Self(0);
    /// The request could not be decoded.
    pub const ERR_INPUT: Self = Self(1);
    /// The queue backend kept failing.
    pub const ERR_BACKEND: Self = Self(2);
    /// Nothing arrived in time; the client may send the request again.
    pub const ERR_RETRY: Self = Self(3);
    /// Any other failure.
    pub const ERR_UNKNOWN: Self = Self(u32::MAX);

    /// Picks the code reported to a client whose request failed with `err`.
    pub const fn for_error(err: &TxqError) -> Self {
        match err {
            TxqError::ClientInput(_) => Self::ERR_INPUT,
            TxqError::ClientBlock => Self::ERR_RETRY,
            TxqError::Backend(_) | TxqError::QueueLock => Self::ERR_BACKEND,
            _ => Self::ERR_UNKNOWN,
        }
    }
}

impl From<ResultCode> for u32 {
    fn from(code: ResultCode) -> Self {
        code.0
    }
}

/// Decodes a request line.
///
/// Surrounding whitespace (including the line terminator) and an optional `0x`/`0X` prefix are
/// ignored. Everything else must be an even number of hex digits.
pub fn decode_request(line: &[u8]) -> TxqResult<RawTxPayload> {
    let line = std::str::from_utf8(line).map_err(TxqError::client_input)?;
    let digits = decode_hex(line)?;
    if digits.is_empty() {
        return Err(TxqError::client_input("empty request"))
    }
    Ok(RawTxPayload(digits))
}

/// Decodes a hex string with an optional `0x`/`0X` prefix. An empty string decodes to no bytes.
pub fn decode_hex(s: &str) -> TxqResult<Vec<u8>> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    hex::decode(digits).map_err(TxqError::client_input)
}

/// Encodes a reply frame.
pub fn encode_response(code: u32, extra: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RESULT_CODE_LEN + extra.len());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(extra);
    out
}
