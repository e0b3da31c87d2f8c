//! 256-bit content identifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of a [`ContentHash`] in bytes.
pub const HASH_LENGTH: usize = 32;

/// Opaque identifier of a block, header or transaction.
///
/// Used as the subject of every request and as the result-cache key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; HASH_LENGTH]);

impl ContentHash {
    /// The all-zero hash. Used as the parent of a chain's first block.
    pub const ZERO: ContentHash = ContentHash([0u8; HASH_LENGTH]);

    /// Wraps raw digest bytes.
    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// BLAKE3 digest of `data`.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Copies a hash out of a slice. Returns `None` unless the slice is
    /// exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; HASH_LENGTH] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; HASH_LENGTH]> for ContentHash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

// Short form keeps log lines readable.
impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash(0x{}..)", hex::encode(&self.0[..4]))
    }
}

/// Error returned when parsing a hex-encoded [`ContentHash`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHashError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    /// Accepts 64 hex characters with an optional `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| ParseHashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes).ok_or(ParseHashError::InvalidLength(bytes.len()))
    }
}
