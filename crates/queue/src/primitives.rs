//! Confirmation event primitives.
//!
//! Blocks and transactions arrive already validated from the sync pipeline; only the fields the
//! reconciliation needs are modelled.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Block height.
pub type BlockNumber = u64;

/// 32 byte opaque identity, used for transaction and block hashes.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct B256(pub [u8; 32]);

/// Transaction identity.
pub type TxHash = B256;

/// Block identity.
pub type BlockHash = B256;

impl B256 {
    /// The all zero hash.
    pub const ZERO: Self = Self([0; 32]);

    /// Returns a hash with every byte set to `byte`.
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; 32])
    }

    /// Returns the raw bytes.
    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for B256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for B256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for B256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Error returned when parsing a [`B256`] from a string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseHashError {
    /// Input was not valid hex.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Input decoded to the wrong number of bytes.
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for B256 {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s)?;
        let bytes: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| ParseHashError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for B256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for B256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The block a confirmed transaction was included in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Height of the block.
    pub number: BlockNumber,
    /// Hash of the block.
    pub hash: BlockHash,
}

impl Block {
    /// Creates a new block reference.
    pub const fn new(number: BlockNumber, hash: BlockHash) -> Self {
        Self { number, hash }
    }
}

/// Outcome of executing a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The transaction executed successfully.
    Success,
    /// The transaction was included but reverted or otherwise failed.
    Failure,
}

impl ExecutionStatus {
    /// Returns true for [`ExecutionStatus::Success`].
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A transaction observed in a confirmed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Identity of the transaction.
    pub hash: TxHash,
    /// Execution outcome.
    pub status: ExecutionStatus,
}

impl Transaction {
    /// Creates a successfully executed transaction.
    pub const fn success(hash: TxHash) -> Self {
        Self { hash, status: ExecutionStatus::Success }
    }

    /// Creates a failed transaction.
    pub const fn failure(hash: TxHash) -> Self {
        Self { hash, status: ExecutionStatus::Failure }
    }
}
