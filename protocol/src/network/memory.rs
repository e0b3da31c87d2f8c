//! # In-Memory Network
//!
//! A process-local stand-in for the peer-to-peer stack. Every
//! [`MemoryPeer`] attached to a [`MemoryNetwork`] can open streams to the
//! others (backed by `tokio::io::duplex`), join gossip topics and publish
//! provider records, so several nodes can be wired together in one test or
//! one devnet process without sockets.
//!
//! The hub also counts outbound streams and provider queries per peer,
//! which lets tests assert that a code path made no network calls at all.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use libp2p::kad::RecordKey;
use libp2p::PeerId;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

use crate::config::GOSSIP_CHANNEL_CAPACITY;
use crate::network::dht::DhtError;
use crate::network::gossip::GossipError;
use crate::network::topic::RoutingKey;
use crate::network::transport::{
    ContentRouting, GossipEngine, GossipMessage, Stream, StreamHandler, Subscription, Transport,
    TransportError,
};

/// Buffer size of each in-memory stream direction.
const STREAM_BUFFER: usize = 64 * 1024;

#[derive(Default)]
struct PeerState {
    handlers: DashMap<String, StreamHandler>,
    closed: AtomicBool,
}

#[derive(Default)]
struct Hub {
    peers: DashMap<PeerId, Arc<PeerState>>,
    /// Topic members in join order.
    members: DashMap<String, Vec<PeerId>>,
    subscribers: DashMap<String, Vec<(PeerId, mpsc::Sender<GossipMessage>)>>,
    /// Provider records, keyed the way a Kademlia store keys them.
    providers: DashMap<RecordKey, Vec<PeerId>>,
}

/// Shared hub that peers attach to.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new peer with a random identity.
    pub fn add_peer(&self) -> Arc<MemoryPeer> {
        let id = PeerId::random();
        let state = Arc::new(PeerState::default());
        self.hub.peers.insert(id, state.clone());
        Arc::new(MemoryPeer {
            id,
            hub: self.hub.clone(),
            state,
            connections: RwLock::new(HashSet::new()),
            streams_opened: AtomicUsize::new(0),
            provider_queries: AtomicUsize::new(0),
        })
    }

    /// Peers holding a provider record for `key`.
    pub fn providers(&self, key: &RoutingKey) -> Vec<PeerId> {
        self.hub
            .providers
            .get(&key.record_key())
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn peer_count(&self) -> usize {
        self.hub.peers.len()
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryPeer {
    id: PeerId,
    hub: Arc<Hub>,
    state: Arc<PeerState>,
    connections: RwLock<HashSet<PeerId>>,
    streams_opened: AtomicUsize,
    provider_queries: AtomicUsize,
}

impl MemoryPeer {
    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Outbound streams opened so far.
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::Relaxed)
    }

    /// Provider lookups issued so far.
    pub fn provider_queries(&self) -> usize {
        self.provider_queries.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connections.read().contains(peer)
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn remote_state(&self, peer: &PeerId) -> Option<Arc<PeerState>> {
        self.hub
            .peers
            .get(peer)
            .map(|entry| entry.value().clone())
            .filter(|state| !state.closed.load(Ordering::Acquire))
    }

    fn is_member(&self, topic: &str) -> bool {
        self.hub
            .members
            .get(topic)
            .map(|members| members.contains(&self.id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for MemoryPeer {
    fn local_peer_id(&self) -> PeerId {
        self.id
    }

    async fn open_stream(&self, peer: PeerId, protocol: &str) -> Result<Stream, TransportError> {
        self.check_open()?;
        self.streams_opened.fetch_add(1, Ordering::Relaxed);

        let remote = self
            .remote_state(&peer)
            .ok_or(TransportError::PeerUnreachable(peer))?;
        let handler = remote
            .handlers
            .get(protocol)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::ProtocolNotSupported {
                peer,
                protocol: protocol.to_string(),
            })?;

        self.connections.write().insert(peer);
        let (local, inbound) = tokio::io::duplex(STREAM_BUFFER);
        handler(Stream::new(protocol, self.id, inbound));
        trace!(%peer, protocol, "stream opened");
        Ok(Stream::new(protocol, peer, local))
    }

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler) {
        self.state.handlers.insert(protocol.to_string(), handler);
    }

    fn remove_stream_handler(&self, protocol: &str) {
        self.state.handlers.remove(protocol);
    }

    async fn connect(&self, peer: PeerId) -> Result<(), TransportError> {
        self.check_open()?;
        if self.remote_state(&peer).is_none() {
            return Err(TransportError::PeerUnreachable(peer));
        }
        self.connections.write().insert(peer);
        Ok(())
    }

    async fn disconnect(&self, peer: PeerId) -> Result<(), TransportError> {
        self.connections.write().remove(&peer);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.closed.store(true, Ordering::Release);
        self.state.handlers.clear();
        self.connections.write().clear();
        for mut members in self.hub.members.iter_mut() {
            members.retain(|id| *id != self.id);
        }
        for mut subscribers in self.hub.subscribers.iter_mut() {
            subscribers.retain(|(id, _)| *id != self.id);
        }
        Ok(())
    }
}

#[async_trait]
impl GossipEngine for MemoryPeer {
    async fn join(&self, topic: &str) -> Result<(), GossipError> {
        if self.is_closed() {
            return Err(GossipError::Join(topic.to_string(), "peer is closed".into()));
        }
        let mut members = self.hub.members.entry(topic.to_string()).or_default();
        if !members.contains(&self.id) {
            members.push(self.id);
        }
        Ok(())
    }

    async fn leave(&self, topic: &str) -> Result<(), GossipError> {
        if let Some(mut members) = self.hub.members.get_mut(topic) {
            members.retain(|id| *id != self.id);
        }
        if let Some(mut subscribers) = self.hub.subscribers.get_mut(topic) {
            subscribers.retain(|(id, _)| *id != self.id);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, GossipError> {
        if !self.is_member(topic) {
            return Err(GossipError::Subscribe(
                topic.to_string(),
                "topic not joined".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(GOSSIP_CHANNEL_CAPACITY);
        self.hub
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push((self.id, tx));
        Ok(Subscription::new(topic, rx))
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), GossipError> {
        if !self.is_member(topic) {
            return Err(GossipError::Publish(
                topic.to_string(),
                "topic not joined".into(),
            ));
        }
        let message = GossipMessage {
            topic: topic.to_string(),
            source: self.id,
            data,
        };
        if let Some(mut subscribers) = self.hub.subscribers.get_mut(topic) {
            subscribers.retain(|(_, tx)| !tx.is_closed());
            for (id, tx) in subscribers.iter() {
                if *id == self.id {
                    continue;
                }
                // A full subscriber loses the message, as on a real mesh.
                if tx.try_send(message.clone()).is_err() {
                    trace!(peer = %id, topic, "gossip subscriber lagging, message dropped");
                }
            }
        }
        Ok(())
    }

    async fn list_peers(&self, topic: &str) -> Result<Vec<PeerId>, GossipError> {
        Ok(self
            .hub
            .members
            .get(topic)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| **id != self.id)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContentRouting for MemoryPeer {
    async fn provide(&self, key: &RoutingKey) -> Result<(), DhtError> {
        if self.is_closed() {
            return Err(DhtError::Closed);
        }
        let mut providers = self.hub.providers.entry(key.record_key()).or_default();
        if !providers.contains(&self.id) {
            providers.push(self.id);
        }
        Ok(())
    }

    fn find_providers(&self, key: &RoutingKey, max: usize) -> BoxStream<'static, PeerId> {
        self.provider_queries.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<PeerId> = self
            .hub
            .providers
            .get(&key.record_key())
            .map(|entry| entry.iter().take(max).copied().collect())
            .unwrap_or_default();
        stream::iter(snapshot).boxed()
    }

    async fn shutdown(&self) -> Result<(), DhtError> {
        for mut providers in self.hub.providers.iter_mut() {
            providers.retain(|id| *id != self.id);
        }
        Ok(())
    }
}
