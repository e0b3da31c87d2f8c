//! # P2P Node
//!
//! `P2pNode` wires the resolution layer onto a set of network
//! capabilities and a consensus backend. It is the only type the node
//! binary talks to.
//!
//! ```text
//! new() -> start() -> Running -> stop() -> Stopped
//! ```
//!
//! `start()` registers the stream handler, starts the gossip receive loop
//! and spawns the intake task that moves gossip deliveries into the result
//! caches and on to consensus, announcing newly learned blocks. Bootnodes stop after registering the
//! handler: they serve streams and DHT queries but never join gossip.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use libp2p::PeerId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{NodeConfig, PROTOCOL_ID, SHUTDOWN_TIMEOUT};
use crate::network::cache::ResultCaches;
use crate::network::consensus::ConsensusBackend;
use crate::network::dht::{DhtError, DhtRouter};
use crate::network::gossip::{Delivery, GossipError, GossipRelay};
use crate::network::handler::{stream_handler, NodeQuery};
use crate::network::resolver::Resolver;
use crate::network::stats::{NetworkStats, StatsSnapshot};
use crate::network::topic::DataKind;
use crate::network::transport::{Capabilities, Transport, TransportError};
use crate::types::{Block, ContentHash, Header, Location, Transaction};
use crate::wire::Payload;

// ---------------------------------------------------------------------------
// Errors & State
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no boot peers configured; set some or run as bootnode or solo")]
    NoBootPeers,

    #[error("invalid boot peer id: {0}")]
    InvalidBootPeer(String),

    #[error("node already started")]
    AlreadyStarted,

    #[error("node is not running")]
    NotStarted,

    #[error(transparent)]
    Gossip(#[from] GossipError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Dht(#[from] DhtError),

    #[error("shutdown failed: {}", .0.join("; "))]
    Shutdown(Vec<String>),
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Created,
    Running,
    Stopped,
}

// ---------------------------------------------------------------------------
// Query Surface
// ---------------------------------------------------------------------------

/// Answers inbound requests: result cache first, then consensus.
struct LocalQuery {
    caches: Arc<ResultCaches>,
    consensus: Arc<dyn ConsensusBackend>,
}

#[async_trait]
impl NodeQuery for LocalQuery {
    async fn get_block(&self, hash: &ContentHash, location: &Location) -> Option<Block> {
        if let Some(block) = self.caches.blocks.get(hash) {
            return Some(block);
        }
        self.consensus.lookup_block(hash, location).await
    }

    async fn get_header(&self, hash: &ContentHash, location: &Location) -> Option<Header> {
        if let Some(header) = self.caches.headers.get(hash) {
            return Some(header);
        }
        if let Some(block) = self.caches.blocks.get(hash) {
            return Some(block.header);
        }
        self.consensus.lookup_header(hash, location).await
    }

    async fn get_transaction(&self, hash: &ContentHash, location: &Location) -> Option<Transaction> {
        if let Some(tx) = self.caches.transactions.get(hash) {
            return Some(tx);
        }
        self.consensus.lookup_transaction(hash, location).await
    }
}

// ---------------------------------------------------------------------------
// P2P Node
// ---------------------------------------------------------------------------

pub struct P2pNode {
    config: NodeConfig,
    capabilities: Capabilities,
    gossip: Arc<GossipRelay>,
    dht: Arc<DhtRouter>,
    resolver: Resolver,
    query: Arc<LocalQuery>,
    stats: Arc<NetworkStats>,
    state: Mutex<NodeState>,
    intake: Mutex<Option<JoinHandle<()>>>,
}

impl P2pNode {
    pub fn new(
        config: NodeConfig,
        capabilities: Capabilities,
        consensus: Arc<dyn ConsensusBackend>,
    ) -> Self {
        let stats = Arc::new(NetworkStats::new());
        let caches = Arc::new(ResultCaches::new(config.cache_capacity));
        let gossip = Arc::new(GossipRelay::new(
            capabilities.gossip.clone(),
            stats.clone(),
        ));
        let dht = Arc::new(DhtRouter::new(capabilities.routing.clone()));
        let resolver = Resolver::new(
            capabilities.transport.clone(),
            gossip.clone(),
            dht.clone(),
            caches.clone(),
            config.frame.clone(),
            config.resolution.clone(),
            stats.clone(),
        );

        Self {
            query: Arc::new(LocalQuery { caches, consensus }),
            config,
            capabilities,
            gossip,
            dht,
            resolver,
            stats,
            state: Mutex::new(NodeState::Created),
            intake: Mutex::new(None),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.capabilities.transport.local_peer_id()
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn caches(&self) -> &ResultCaches {
        &self.query.caches
    }

    /// Gossip topics this node is subscribed to.
    pub fn topics(&self) -> Vec<String> {
        self.gossip.topics()
    }

    // -- Lifecycle ----------------------------------------------------------

    pub async fn start(&self) -> Result<(), NodeError> {
        if !self.config.bootnode && !self.config.solo && self.config.bootpeers.is_empty() {
            return Err(NodeError::NoBootPeers);
        }
        let bootpeers = self
            .config
            .bootpeers
            .iter()
            .map(|raw| PeerId::from_str(raw).map_err(|_| NodeError::InvalidBootPeer(raw.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        {
            let mut state = self.state.lock();
            if *state != NodeState::Created {
                return Err(NodeError::AlreadyStarted);
            }
            *state = NodeState::Running;
        }

        let transport = &self.capabilities.transport;
        for peer in bootpeers {
            if let Err(err) = transport.connect(peer).await {
                warn!(%peer, error = %err, "could not reach boot peer");
            }
        }

        transport.set_stream_handler(
            PROTOCOL_ID,
            stream_handler(
                self.query.clone(),
                self.config.frame.clone(),
                self.stats.clone(),
            ),
        );

        if self.config.bootnode {
            info!(peer_id = %self.peer_id(), "bootnode started");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.config.gossip_channel_capacity.max(1));
        self.gossip.start(tx)?;
        let intake = Intake {
            caches: self.query.caches.clone(),
            consensus: self.query.consensus.clone(),
            dht: self.dht.clone(),
            resolver: self.resolver.clone(),
            transport: self.capabilities.transport.clone(),
        };
        let handle = tokio::spawn(intake.run(rx));
        *self.intake.lock() = Some(handle);

        info!(peer_id = %self.peer_id(), "node started");
        Ok(())
    }

    /// Stops gossip, then closes the transport and DHT concurrently, each
    /// bounded by [`SHUTDOWN_TIMEOUT`]. Every failure is reported.
    pub async fn stop(&self) -> Result<(), NodeError> {
        {
            let mut state = self.state.lock();
            if *state != NodeState::Running {
                return Err(NodeError::NotStarted);
            }
            *state = NodeState::Stopped;
        }

        let transport = &self.capabilities.transport;
        transport.remove_stream_handler(PROTOCOL_ID);
        self.gossip.shutdown();
        if let Some(handle) = self.intake.lock().take() {
            handle.abort();
        }

        let (transport_result, dht_result) = tokio::join!(
            tokio::time::timeout(SHUTDOWN_TIMEOUT, transport.close()),
            tokio::time::timeout(SHUTDOWN_TIMEOUT, self.dht.shutdown()),
        );

        let mut errors = Vec::new();
        match transport_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(format!("transport: {err}")),
            Err(_) => errors.push("transport: close timed out".to_string()),
        }
        match dht_result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(format!("dht: {err}")),
            Err(_) => errors.push("dht: shutdown timed out".to_string()),
        }

        if !errors.is_empty() {
            return Err(NodeError::Shutdown(errors));
        }
        info!(peer_id = %self.peer_id(), "node stopped");
        Ok(())
    }

    // -- Gossip -------------------------------------------------------------

    pub async fn subscribe(&self, location: &Location, kind: DataKind) -> Result<(), NodeError> {
        Ok(self.gossip.subscribe(location, kind).await?)
    }

    pub async fn unsubscribe(&self, location: &Location, kind: DataKind) -> Result<(), NodeError> {
        Ok(self.gossip.unsubscribe(location, kind).await?)
    }

    pub async fn broadcast(&self, location: &Location, payload: &Payload) -> Result<(), NodeError> {
        Ok(self.gossip.broadcast(location, payload).await?)
    }

    /// Announces this node as a provider of `kind` data for `location`.
    /// Resolutions do this on their own; call it for locally produced data.
    pub async fn announce(&self, location: &Location, kind: DataKind) -> Result<(), NodeError> {
        Ok(self.dht.announce(location, kind).await?)
    }

    // -- Resolution ---------------------------------------------------------

    /// Resolves a block. The channel yields it, or closes empty when no
    /// peer produced it.
    pub fn request_block(&self, hash: ContentHash, location: Location) -> oneshot::Receiver<Block> {
        self.resolver.request(hash, location)
    }

    pub fn request_header(
        &self,
        hash: ContentHash,
        location: Location,
    ) -> oneshot::Receiver<Header> {
        self.resolver.request(hash, location)
    }

    pub fn request_transaction(
        &self,
        hash: ContentHash,
        location: Location,
    ) -> oneshot::Receiver<Transaction> {
        self.resolver.request(hash, location)
    }

    /// Bans `peer` from future resolutions and drops its connections.
    pub async fn report_bad_peer(&self, peer: PeerId) {
        warn!(%peer, "peer reported as bad");
        self.resolver.ban(peer);
        if let Err(err) = self.capabilities.transport.disconnect(peer).await {
            debug!(%peer, error = %err, "disconnect failed");
        }
    }

    pub fn is_banned(&self, peer: &PeerId) -> bool {
        self.resolver.is_banned(peer)
    }
}

#[async_trait]
impl NodeQuery for P2pNode {
    async fn get_block(&self, hash: &ContentHash, location: &Location) -> Option<Block> {
        self.query.get_block(hash, location).await
    }

    async fn get_header(&self, hash: &ContentHash, location: &Location) -> Option<Header> {
        self.query.get_header(hash, location).await
    }

    async fn get_transaction(&self, hash: &ContentHash, location: &Location) -> Option<Transaction> {
        self.query.get_transaction(hash, location).await
    }
}

/// What the intake task needs besides its delivery channel.
struct Intake {
    caches: Arc<ResultCaches>,
    consensus: Arc<dyn ConsensusBackend>,
    dht: Arc<DhtRouter>,
    resolver: Resolver,
    transport: Arc<dyn Transport>,
}

impl Intake {
    /// Moves gossip deliveries into the caches and on to consensus.
    ///
    /// A block that is new to this node is announced for its shard once
    /// consensus accepts it. Data consensus rejects is evicted again and
    /// its source is banned.
    async fn run(self, mut deliveries: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = deliveries.recv().await {
            let source = delivery.source;
            match delivery.payload {
                Payload::Block(block) => {
                    let hash = block.hash();
                    debug!(%hash, %source, "block received over gossip");
                    let fresh = self.caches.blocks.insert(hash, block.clone());
                    if !self.consensus.on_new_block(source, &block).await {
                        self.caches.blocks.remove(&hash);
                        self.reject(source, hash).await;
                        continue;
                    }
                    if fresh {
                        let location = block.location();
                        if let Err(err) = self.dht.announce(&location, DataKind::Block).await {
                            warn!(%location, error = %err, "failed to announce gossiped block");
                        }
                    }
                }
                Payload::Header(header) => {
                    self.caches.headers.insert(header.hash(), header);
                }
                Payload::Transaction(tx) => {
                    let hash = tx.hash();
                    self.caches.transactions.insert(hash, tx.clone());
                    if !self.consensus.on_new_transaction(source, &tx).await {
                        self.caches.transactions.remove(&hash);
                        self.reject(source, hash).await;
                    }
                }
            }
        }
    }

    async fn reject(&self, source: PeerId, hash: ContentHash) {
        warn!(%source, %hash, "consensus rejected gossiped data, banning source");
        self.resolver.ban(source);
        if let Err(err) = self.transport.disconnect(source).await {
            debug!(peer = %source, error = %err, "disconnect failed");
        }
    }
}
