//! # Resolution Orchestrator
//!
//! Finds a block, header or transaction that is not available locally.
//!
//! ## Algorithm
//!
//! ```text
//! 1. cache           hit → done, no network traffic
//! 2. gossip peers    every mesh peer of the (location, kind) topic, in order
//! 3. DHT rounds      up to `max_dht_query_retries` rounds of
//!                    `peers_per_dht_query` providers, sleeping
//!                    `dht_query_retry_interval` after each empty round
//! 4. exhaustion      channel closes without a value
//! ```
//!
//! The first peer that answers with an object carrying the requested hash
//! wins: the object is cached, this node announces itself as a provider for
//! the shard, and the value is pushed. Peers that fail or answer "not
//! found" are skipped and never retried within the same stage. Peers are
//! queried one at a time.
//!
//! A caller sees either exactly one value or a closed, empty channel. Those
//! two outcomes do not distinguish "nobody has it" from "nobody answered in
//! time"; callers that care wrap the request in their own deadline and retry.

use std::sync::Arc;

use dashmap::DashSet;
use futures::StreamExt;
use libp2p::PeerId;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{FrameConfig, ResolutionConfig};
use crate::network::cache::{ResultCache, ResultCaches};
use crate::network::dht::DhtRouter;
use crate::network::gossip::GossipRelay;
use crate::network::handler::request_from_peer;
use crate::network::stats::NetworkStats;
use crate::network::topic::DataKind;
use crate::network::transport::Transport;
use crate::types::{Block, ContentHash, Header, Location, Transaction};
use crate::wire::{Payload, Request};

/// Something the resolver can look up by hash.
pub trait Resolvable: Clone + Send + Sync + 'static {
    const KIND: DataKind;

    /// Extracts `Self` from a response payload of the matching variant.
    fn from_payload(payload: Payload) -> Option<Self>;

    fn cache(caches: &ResultCaches) -> &ResultCache<Self>;
}

impl Resolvable for Block {
    const KIND: DataKind = DataKind::Block;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Block(block) => Some(block),
            _ => None,
        }
    }

    fn cache(caches: &ResultCaches) -> &ResultCache<Self> {
        &caches.blocks
    }
}

impl Resolvable for Header {
    const KIND: DataKind = DataKind::Header;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Header(header) => Some(header),
            _ => None,
        }
    }

    fn cache(caches: &ResultCaches) -> &ResultCache<Self> {
        &caches.headers
    }
}

impl Resolvable for Transaction {
    const KIND: DataKind = DataKind::Transaction;

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    fn cache(caches: &ResultCaches) -> &ResultCache<Self> {
        &caches.transactions
    }
}

/// Stage that produced a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    GossipPeer,
    Provider,
}

#[derive(Clone)]
pub struct Resolver {
    transport: Arc<dyn Transport>,
    gossip: Arc<GossipRelay>,
    dht: Arc<DhtRouter>,
    caches: Arc<ResultCaches>,
    banned: Arc<DashSet<PeerId>>,
    frame: FrameConfig,
    resolution: ResolutionConfig,
    stats: Arc<NetworkStats>,
}

impl Resolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        gossip: Arc<GossipRelay>,
        dht: Arc<DhtRouter>,
        caches: Arc<ResultCaches>,
        frame: FrameConfig,
        resolution: ResolutionConfig,
        stats: Arc<NetworkStats>,
    ) -> Self {
        Self {
            transport,
            gossip,
            dht,
            caches,
            banned: Arc::new(DashSet::new()),
            frame,
            resolution,
            stats,
        }
    }

    /// Excludes `peer` from every future resolution.
    pub fn ban(&self, peer: PeerId) {
        self.banned.insert(peer);
    }

    pub fn is_banned(&self, peer: &PeerId) -> bool {
        self.banned.contains(peer)
    }

    /// Starts a resolution on its own task and returns its result channel.
    ///
    /// The receiver yields the value, or `Err(RecvError)` once every stage
    /// came up empty.
    pub fn request<T: Resolvable>(
        &self,
        hash: ContentHash,
        location: Location,
    ) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let resolver = self.clone();
        tokio::spawn(async move {
            if let Some(value) = resolver.resolve::<T>(hash, location).await {
                let _ = tx.send(value);
            }
        });
        rx
    }

    /// Runs a resolution to completion on the current task.
    pub async fn resolve<T: Resolvable>(&self, hash: ContentHash, location: Location) -> Option<T> {
        let kind = T::KIND;

        if let Some(value) = T::cache(&self.caches).get(&hash) {
            debug!(%hash, %location, %kind, "resolved from cache");
            self.stats.record_cache_hit();
            return Some(value);
        }

        let peers = match self.gossip.peers_for_topic(&location, kind).await {
            Ok(peers) => peers,
            Err(err) => {
                debug!(%location, %kind, error = %err, "could not list gossip peers");
                Vec::new()
            }
        };
        for peer in peers {
            if let Some(value) = self.try_peer::<T>(peer, hash, location).await {
                return Some(self.commit(hash, location, value, Source::GossipPeer).await);
            }
        }

        let rounds = self.resolution.max_dht_query_retries;
        for round in 1..=rounds {
            let providers: Vec<PeerId> = self
                .dht
                .find_providers(&location, kind, self.resolution.peers_per_dht_query)
                .collect()
                .await;
            debug!(%hash, %location, %kind, round, providers = providers.len(), "DHT round");

            for peer in providers {
                if let Some(value) = self.try_peer::<T>(peer, hash, location).await {
                    return Some(self.commit(hash, location, value, Source::Provider).await);
                }
            }
            tokio::time::sleep(self.resolution.dht_query_retry_interval).await;
        }

        info!(%hash, %location, %kind, rounds, "resolution exhausted");
        self.stats.record_exhausted();
        None
    }

    async fn try_peer<T: Resolvable>(
        &self,
        peer: PeerId,
        hash: ContentHash,
        location: Location,
    ) -> Option<T> {
        if peer == self.transport.local_peer_id() || self.is_banned(&peer) {
            return None;
        }
        let request = Request::new(T::KIND.request_action(), location, hash);
        match request_from_peer(self.transport.as_ref(), peer, request, &self.frame).await {
            Ok(payload) => T::from_payload(payload),
            Err(err) => {
                debug!(%peer, %hash, error = %err, "peer request failed");
                None
            }
        }
    }

    async fn commit<T: Resolvable>(
        &self,
        hash: ContentHash,
        location: Location,
        value: T,
        source: Source,
    ) -> T {
        T::cache(&self.caches).insert(hash, value.clone());
        match source {
            Source::GossipPeer => self.stats.record_gossip_peer_hit(),
            Source::Provider => self.stats.record_dht_hit(),
        }
        let kind = T::KIND;
        if let Err(err) = self.dht.announce(&location, kind).await {
            warn!(%location, %kind, error = %err, "failed to announce provider record");
        }
        debug!(%hash, %location, ?source, "resolved");
        value
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::PROTOCOL_ID;
    use crate::network::handler::{stream_handler, NodeQuery};
    use crate::network::memory::{MemoryNetwork, MemoryPeer};
    use crate::network::transport::GossipEngine;

    struct OneBlock(Block);

    #[async_trait]
    impl NodeQuery for OneBlock {
        async fn get_block(&self, hash: &ContentHash, _: &Location) -> Option<Block> {
            (self.0.hash() == *hash).then(|| self.0.clone())
        }

        async fn get_header(&self, _: &ContentHash, _: &Location) -> Option<Header> {
            None
        }

        async fn get_transaction(&self, _: &ContentHash, _: &Location) -> Option<Transaction> {
            None
        }
    }

    fn make_block() -> Block {
        Block::new(
            Header {
                parent_hash: ContentHash::ZERO,
                number: 3,
                location: Location::Zone(0, 0),
                state_root: ContentHash::ZERO,
                tx_root: ContentHash::ZERO,
                gas_limit: 1,
                gas_used: 0,
                timestamp: 0,
            },
            Vec::new(),
        )
    }

    fn make_resolver(peer: &Arc<MemoryPeer>) -> (Resolver, Arc<GossipRelay>, Arc<NetworkStats>) {
        let stats = Arc::new(NetworkStats::new());
        let gossip = Arc::new(GossipRelay::new(peer.clone(), stats.clone()));
        let resolver = Resolver::new(
            peer.clone(),
            gossip.clone(),
            Arc::new(DhtRouter::new(peer.clone())),
            Arc::new(ResultCaches::new(16)),
            FrameConfig::default(),
            ResolutionConfig {
                max_dht_query_retries: 2,
                peers_per_dht_query: 4,
                dht_query_retry_interval: Duration::from_secs(1),
            },
            stats.clone(),
        );
        (resolver, gossip, stats)
    }

    #[tokio::test]
    async fn cached_value_needs_no_network() {
        let network = MemoryNetwork::new();
        let peer = network.add_peer();
        let (resolver, _, stats) = make_resolver(&peer);
        let block = make_block();
        resolver.caches.blocks.insert(block.hash(), block.clone());

        let got = resolver
            .request::<Block>(block.hash(), Location::Zone(0, 0))
            .await
            .unwrap();
        assert_eq!(got, block);
        assert_eq!(peer.streams_opened(), 0);
        assert_eq!(peer.provider_queries(), 0);
        assert_eq!(stats.snapshot().cache_hits, 1);
    }

    #[tokio::test]
    async fn gossip_peer_answers_first() {
        let network = MemoryNetwork::new();
        let (local, remote) = (network.add_peer(), network.add_peer());
        let block = make_block();
        let zone = Location::Zone(0, 0);
        remote.set_stream_handler(
            PROTOCOL_ID,
            stream_handler(
                Arc::new(OneBlock(block.clone())),
                FrameConfig::default(),
                Arc::new(NetworkStats::new()),
            ),
        );
        remote.join("zone-0-0/blocks").await.unwrap();

        let (resolver, gossip, stats) = make_resolver(&local);
        gossip.subscribe(&zone, DataKind::Block).await.unwrap();

        let got: Block = resolver.resolve(block.hash(), zone).await.unwrap();
        assert_eq!(got, block);
        assert_eq!(local.provider_queries(), 0);
        assert_eq!(stats.snapshot().gossip_peer_hits, 1);
        assert!(resolver.caches.blocks.contains(&block.hash()));
    }

    #[tokio::test(start_paused = true)]
    async fn banned_peers_are_skipped() {
        let network = MemoryNetwork::new();
        let (local, remote) = (network.add_peer(), network.add_peer());
        let block = make_block();
        remote.set_stream_handler(
            PROTOCOL_ID,
            stream_handler(
                Arc::new(OneBlock(block.clone())),
                FrameConfig::default(),
                Arc::new(NetworkStats::new()),
            ),
        );
        remote.join("zone-0-0/blocks").await.unwrap();

        let (resolver, _, stats) = make_resolver(&local);
        resolver.ban(remote.peer_id());

        let got = resolver
            .resolve::<Block>(block.hash(), Location::Zone(0, 0))
            .await;
        assert!(got.is_none());
        assert_eq!(local.streams_opened(), 0);
        assert_eq!(stats.snapshot().exhausted, 1);
    }
}
