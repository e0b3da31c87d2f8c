//! # Protocol Handler
//!
//! Request/response traffic on [`PROTOCOL_ID`] streams, both sides.
//!
//! ## Serving
//!
//! ```text
//! Opened ──protocol mismatch──▶ Closed        (nothing read or written)
//!   │
//!   ▼
//! Serving ◀─┐  read frame → decode request → query → encode → write frame
//!   │       └──────────────────────────────────────────────────────────┘
//!   ├── peer closed ──────────▶ Closed        (graceful)
//!   └── frame/codec error ────▶ Closed        (logged, never resynchronized)
//! ```
//!
//! "Not found" is an ordinary response with the matching action and no
//! payload. A request that fails to decode gets a best-effort `Unknown`
//! response before the stream is closed.
//!
//! ## Requesting
//!
//! [`request_from_peer`] opens one stream, sends one request and reads one
//! response. Every failure is returned to the caller, which moves on to the
//! next candidate.

use std::sync::Arc;

use async_trait::async_trait;
use libp2p::PeerId;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::config::{FrameConfig, PROTOCOL_ID};
use crate::network::stats::NetworkStats;
use crate::network::transport::{Stream, StreamHandler, Transport, TransportError};
use crate::types::{Block, ContentHash, Header, Location, Transaction};
use crate::wire::{
    decode_request, decode_response, encode_request, encode_response, read_frame, write_frame,
    CodecError, FrameError, Payload, Request, RequestAction, Response, ResponseAction,
};

/// Lookups the handler answers inbound requests with.
#[async_trait]
pub trait NodeQuery: Send + Sync {
    async fn get_block(&self, hash: &ContentHash, location: &Location) -> Option<Block>;

    async fn get_header(&self, hash: &ContentHash, location: &Location) -> Option<Header>;

    async fn get_transaction(&self, hash: &ContentHash, location: &Location) -> Option<Transaction>;
}

/// Why a served stream was closed abnormally.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Why a single outbound request produced no value.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("peer does not have the requested object")]
    NotFound,

    #[error("expected a {expected:?} response, got {got:?}")]
    UnexpectedResponse {
        expected: ResponseAction,
        got: ResponseAction,
    },

    #[error("peer answered with {got} for {expected}")]
    HashMismatch {
        expected: ContentHash,
        got: ContentHash,
    },
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

/// Runs the request loop on one inbound stream until it closes.
///
/// Returns the number of requests answered when the peer closed the stream
/// cleanly.
pub async fn serve_stream(
    mut stream: Stream,
    query: &dyn NodeQuery,
    config: &FrameConfig,
) -> Result<u64, HandlerError> {
    let peer = stream.remote;
    if stream.protocol != PROTOCOL_ID {
        warn!(%peer, protocol = %stream.protocol, "unexpected protocol, closing stream");
        let _ = stream.io.shutdown().await;
        return Err(HandlerError::ProtocolMismatch {
            expected: PROTOCOL_ID.to_string(),
            got: stream.protocol,
        });
    }

    let mut served = 0u64;
    let result = loop {
        let frame = match read_frame(&mut stream.io, config).await {
            Ok(frame) => frame,
            Err(FrameError::PeerClosed) => break Ok(served),
            Err(err) => break Err(HandlerError::Frame(err)),
        };

        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(err) => {
                if let Ok(bytes) = encode_response(&Response::unknown()) {
                    let _ = write_frame(&mut stream.io, &bytes, config).await;
                }
                break Err(HandlerError::Codec(err));
            }
        };
        trace!(%peer, action = ?request.action, hash = %request.hash, shard = %request.shard, "request");

        let response = dispatch(query, &request).await;
        let bytes = match encode_response(&response) {
            Ok(bytes) => bytes,
            Err(err) => break Err(HandlerError::Codec(err)),
        };
        if let Err(err) = write_frame(&mut stream.io, &bytes, config).await {
            break Err(HandlerError::Frame(err));
        }
        served += 1;
    };

    match &result {
        Ok(served) => debug!(%peer, served, "stream closed by peer"),
        Err(err) => warn!(%peer, error = %err, "closing stream"),
    }
    let _ = stream.io.shutdown().await;
    result
}

async fn dispatch(query: &dyn NodeQuery, request: &Request) -> Response {
    let (hash, shard) = (&request.hash, &request.shard);
    let payload = match request.action {
        RequestAction::Block => query.get_block(hash, shard).await.map(Payload::Block),
        RequestAction::Header => query.get_header(hash, shard).await.map(Payload::Header),
        RequestAction::Transaction => query
            .get_transaction(hash, shard)
            .await
            .map(Payload::Transaction),
    };
    match payload {
        Some(payload) => Response::found(payload),
        None => Response::not_found(request.action),
    }
}

/// Stream handler that serves each inbound stream on its own task.
pub fn stream_handler(
    query: Arc<dyn NodeQuery>,
    config: FrameConfig,
    stats: Arc<NetworkStats>,
) -> StreamHandler {
    Arc::new(move |stream: Stream| {
        let query = query.clone();
        let config = config.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            if serve_stream(stream, query.as_ref(), &config).await.is_ok() {
                stats.record_stream_served();
            }
        });
    })
}

// ---------------------------------------------------------------------------
// Requesting
// ---------------------------------------------------------------------------

/// Asks `peer` for one object and returns it if the peer has it.
pub async fn request_from_peer(
    transport: &dyn Transport,
    peer: PeerId,
    request: Request,
    config: &FrameConfig,
) -> Result<Payload, RequestError> {
    let mut stream = transport.open_stream(peer, PROTOCOL_ID).await?;

    let bytes = encode_request(&request)?;
    write_frame(&mut stream.io, &bytes, config).await?;
    let frame = read_frame(&mut stream.io, config).await?;
    let _ = stream.io.shutdown().await;

    let response = decode_response(&frame)?;
    let expected = request.action.response();
    if response.action != expected {
        return Err(RequestError::UnexpectedResponse {
            expected,
            got: response.action,
        });
    }

    let payload = response.payload.ok_or(RequestError::NotFound)?;
    let got = payload.hash();
    if got != request.hash {
        return Err(RequestError::HashMismatch {
            expected: request.hash,
            got,
        });
    }
    Ok(payload)
}
