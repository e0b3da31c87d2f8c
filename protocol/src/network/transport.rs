//! # Network Capabilities
//!
//! The narrow interfaces this crate consumes from the peer-to-peer stack.
//! Connection management, gossip mesh maintenance and Kademlia routing all
//! live behind these traits; the resolution layer only ever sees streams,
//! topics and provider lists.
//!
//! [`crate::network::memory`] implements all three traits in-process for
//! tests and the devnet runner.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use libp2p::PeerId;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::network::dht::DhtError;
use crate::network::gossip::GossipError;
use crate::network::topic::RoutingKey;

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Byte stream half of a negotiated substream.
pub trait StreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> StreamIo for T {}

/// A bidirectional substream to one remote peer.
pub struct Stream {
    /// Protocol identifier negotiated for this stream.
    pub protocol: String,
    /// The peer on the other end.
    pub remote: PeerId,
    pub io: Box<dyn StreamIo>,
}

impl Stream {
    pub fn new(protocol: impl Into<String>, remote: PeerId, io: impl StreamIo + 'static) -> Self {
        Self {
            protocol: protocol.into(),
            remote,
            io: Box::new(io),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("protocol", &self.protocol)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Callback invoked for every inbound stream on a registered protocol.
/// Implementations are expected to hand the stream to a task and return.
pub type StreamHandler = Arc<dyn Fn(Stream) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    PeerUnreachable(PeerId),

    #[error("peer {peer} does not speak {protocol}")]
    ProtocolNotSupported { peer: PeerId, protocol: String },

    #[error("transport is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-to-point streams and connection management.
#[async_trait]
pub trait Transport: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// Opens a new substream to `peer` negotiated under `protocol`.
    async fn open_stream(&self, peer: PeerId, protocol: &str) -> Result<Stream, TransportError>;

    /// Routes inbound streams negotiated under `protocol` to `handler`.
    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler);

    fn remove_stream_handler(&self, protocol: &str);

    async fn connect(&self, peer: PeerId) -> Result<(), TransportError>;

    async fn disconnect(&self, peer: PeerId) -> Result<(), TransportError>;

    /// Closes every connection. Further calls fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// One message received on a gossip topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub topic: String,
    pub source: PeerId,
    pub data: Vec<u8>,
}

/// Receiving end of a topic subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    messages: mpsc::Receiver<GossipMessage>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, messages: mpsc::Receiver<GossipMessage>) -> Self {
        Self {
            topic: topic.into(),
            messages,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the engine drops the topic.
    pub async fn next(&mut self) -> Option<GossipMessage> {
        self.messages.recv().await
    }
}

/// Topic-based publish/subscribe.
#[async_trait]
pub trait GossipEngine: Send + Sync {
    async fn join(&self, topic: &str) -> Result<(), GossipError>;

    async fn leave(&self, topic: &str) -> Result<(), GossipError>;

    /// Opens a subscription on a joined topic.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, GossipError>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), GossipError>;

    /// Peers currently in the topic's mesh, excluding this node.
    async fn list_peers(&self, topic: &str) -> Result<Vec<PeerId>, GossipError>;
}

// ---------------------------------------------------------------------------
// Content Routing
// ---------------------------------------------------------------------------

/// Provider records in the DHT.
#[async_trait]
pub trait ContentRouting: Send + Sync {
    /// Registers this node as a provider for `key`. Kademlia-backed hosts
    /// store the record under [`RoutingKey::record_key`].
    async fn provide(&self, key: &RoutingKey) -> Result<(), DhtError>;

    /// Lazily enumerates at most `max` providers for `key`.
    fn find_providers(&self, key: &RoutingKey, max: usize) -> BoxStream<'static, PeerId>;

    async fn shutdown(&self) -> Result<(), DhtError>;
}

/// The three capabilities a node runs on.
#[derive(Clone)]
pub struct Capabilities {
    pub transport: Arc<dyn Transport>,
    pub gossip: Arc<dyn GossipEngine>,
    pub routing: Arc<dyn ContentRouting>,
}

impl Capabilities {
    /// Uses one object for all three capabilities.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: Transport + GossipEngine + ContentRouting + 'static,
    {
        Self {
            transport: host.clone(),
            gossip: host.clone(),
            routing: host,
        }
    }
}
