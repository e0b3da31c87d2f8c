//! # Wire Layer
//!
//! Everything that touches bytes on a stream.
//!
//! ```text
//! frame.rs   4-byte big-endian length prefix framing over AsyncRead/AsyncWrite
//! codec.rs   versioned request/response envelopes and gossip payload encoding
//! error.rs   FrameError and CodecError
//! ```
//!
//! The frame layer carries no version byte. Protocol evolution happens in
//! the codec envelope, which starts with a `version` field and tolerates
//! trailing bytes written by newer peers.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{
    decode_request, decode_response, encode_request, encode_response, Payload, Request,
    RequestAction, Response, ResponseAction,
};
pub use error::{CodecError, FrameError};
pub use frame::{read_frame, write_frame};
