//! Errors raised while framing or decoding stream traffic.

use thiserror::Error;

/// Failures of the length-prefix frame layer.
///
/// Every variant except [`FrameError::PeerClosed`] leaves the stream in an
/// unknown position and is fatal to it.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended cleanly before the first byte of a frame.
    #[error("peer closed the stream")]
    PeerClosed,

    /// The stream ended inside a length prefix or payload.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    /// The length prefix announced more than the configured maximum.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    Oversized { len: u32, max: u32 },

    /// The underlying stream rejected a read.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// The underlying stream rejected a write or flush.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The read or write deadline elapsed.
    #[error("stream deadline elapsed")]
    Timeout,
}

/// Failures of the envelope codec. Decoding never yields partial results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The action tag is not a known request or response action.
    #[error("unsupported action tag {0}")]
    UnsupportedAction(u32),

    /// The payload variant disagrees with the declared action.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The envelope predates the oldest version still understood.
    #[error("unsupported codec version {0}")]
    UnsupportedVersion(u16),

    /// The bytes are not a valid envelope at all.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        CodecError::Serialization(err.to_string())
    }
}
