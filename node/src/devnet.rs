//! # In-Process Devnet
//!
//! Runs several `P2pNode`s over one `MemoryNetwork` and keeps them busy:
//! every interval one node seals a block into its consensus store,
//! announces itself as a provider for the shard and gossips the header.
//! Another node then resolves the full block through the normal
//! cache → gossip peers → DHT path.
//!
//! ```text
//!   producer ──header──▶ gossip mesh ──▶ every node's header cache
//!      ▲                                        │
//!      └────── RequestBlock over a stream ◀─────┘ (one random node)
//! ```

use anyhow::{ensure, Context, Result};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use shardnet_protocol::config::NodeConfig;
use shardnet_protocol::network::{
    Capabilities, DataKind, MemoryBackend, MemoryNetwork, NodeError,
};
use shardnet_protocol::wire::Payload;
use shardnet_protocol::{Block, ContentHash, Header, Location, P2pNode, Transaction};

/// Gas limit stamped on produced headers.
const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Gas charged per produced transaction.
const TX_GAS: u64 = 21_000;

/// Upper bound on transactions per produced block.
const MAX_TXS_PER_BLOCK: usize = 4;

/// How long a follower waits for a block before giving up.
const RESOLVE_DEADLINE: Duration = Duration::from_secs(30);

pub struct Devnet {
    _network: MemoryNetwork,
    location: Location,
    nodes: Vec<Arc<P2pNode>>,
    backends: Vec<Arc<MemoryBackend>>,
}

impl Devnet {
    /// Creates `count` nodes, starts them and subscribes each to every data
    /// kind of `location`. Node 0 runs solo and is every other node's boot
    /// peer.
    pub async fn start(count: usize, location: Location, config: NodeConfig) -> Result<Self> {
        ensure!(count >= 1, "a devnet needs at least one node");

        let network = MemoryNetwork::new();
        let mut nodes = Vec::with_capacity(count);
        let mut backends = Vec::with_capacity(count);
        let mut boot_peer: Option<String> = None;

        for index in 0..count {
            let peer = network.add_peer();
            let node_config = match &boot_peer {
                None => NodeConfig {
                    solo: true,
                    bootnode: false,
                    bootpeers: Vec::new(),
                    ..config.clone()
                },
                Some(boot) => NodeConfig {
                    solo: false,
                    bootnode: false,
                    bootpeers: vec![boot.clone()],
                    ..config.clone()
                },
            };
            boot_peer.get_or_insert_with(|| peer.peer_id().to_string());

            let backend = Arc::new(MemoryBackend::new());
            let node = P2pNode::new(node_config, Capabilities::from_host(peer), backend.clone());
            node.start()
                .await
                .with_context(|| format!("node {index} failed to start"))?;
            for kind in DataKind::ALL {
                node.subscribe(&location, kind)
                    .await
                    .with_context(|| format!("node {index} failed to subscribe"))?;
            }
            tracing::info!(index, peer = %node.peer_id(), "devnet node up");

            nodes.push(Arc::new(node));
            backends.push(backend);
        }

        Ok(Self {
            _network: network,
            location,
            nodes,
            backends,
        })
    }

    pub fn nodes(&self) -> &[Arc<P2pNode>] {
        &self.nodes
    }

    /// Produces a block every `interval`, round-robin over the nodes.
    /// Runs until dropped.
    pub async fn produce(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        let mut parent = ContentHash::ZERO;

        for number in 1u64.. {
            ticker.tick().await;

            let producer = (number as usize) % self.nodes.len();
            let block = self.seal_block(number, parent);
            parent = block.hash();

            if let Err(e) = self.publish(producer, &block).await {
                tracing::warn!(number, error = %e, "failed to publish block");
                continue;
            }
            if let Some(follower) = self.pick_follower(producer) {
                self.follow(follower, &block);
            }
        }
    }

    /// Builds block `number` on top of `parent` with a few random transfers.
    pub fn seal_block(&self, number: u64, parent: ContentHash) -> Block {
        let mut rng = rand::thread_rng();
        let transactions: Vec<Transaction> = (0..rng.gen_range(0..=MAX_TXS_PER_BLOCK))
            .map(|i| Transaction {
                nonce: number * MAX_TXS_PER_BLOCK as u64 + i as u64,
                to: Some(rng.gen()),
                value: rng.gen_range(1..1_000_000),
                gas: TX_GAS,
                gas_price: 1,
                input: Vec::new(),
            })
            .collect();

        Block::new(
            Header {
                parent_hash: parent,
                number,
                location: self.location,
                state_root: ContentHash::digest(&number.to_be_bytes()),
                tx_root: ContentHash::ZERO,
                gas_limit: BLOCK_GAS_LIMIT,
                gas_used: TX_GAS * transactions.len() as u64,
                timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            },
            transactions,
        )
    }

    /// Stores `block` at `producer`, announces it, and gossips its header.
    pub async fn publish(&self, producer: usize, block: &Block) -> Result<(), NodeError> {
        let node = &self.nodes[producer];
        self.backends[producer].insert_block(block.clone());
        node.announce(&self.location, DataKind::Block).await?;
        node.broadcast(&self.location, &Payload::Header(block.header.clone()))
            .await?;
        tracing::info!(
            number = block.header.number,
            hash = %block.hash(),
            txs = block.transactions.len(),
            producer = %node.peer_id(),
            "block produced"
        );
        Ok(())
    }

    fn pick_follower(&self, producer: usize) -> Option<usize> {
        if self.nodes.len() < 2 {
            return None;
        }
        let offset = rand::thread_rng().gen_range(1..self.nodes.len());
        Some((producer + offset) % self.nodes.len())
    }

    /// Has `follower` resolve `block` in the background and logs the outcome.
    fn follow(&self, follower: usize, block: &Block) {
        let node = self.nodes[follower].clone();
        let hash = block.hash();
        let number = block.header.number;
        let result = node.request_block(hash, self.location);

        tokio::spawn(async move {
            match tokio::time::timeout(RESOLVE_DEADLINE, result).await {
                Ok(Ok(block)) if block.verify_tx_root() => {
                    tracing::info!(number, %hash, peer = %node.peer_id(), "block resolved");
                }
                Ok(Ok(_)) => {
                    tracing::warn!(number, %hash, "resolved block has a bad transaction root");
                }
                Ok(Err(_)) => {
                    tracing::warn!(number, %hash, peer = %node.peer_id(), "block not found");
                }
                Err(_) => {
                    tracing::warn!(number, %hash, "block resolution timed out");
                }
            }
        });
    }

    /// Stops every node, logging the ones that fail to shut down cleanly.
    pub async fn stop(&self) {
        for node in &self.nodes {
            if let Err(e) = node.stop().await {
                tracing::warn!(peer = %node.peer_id(), error = %e, "node did not stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardnet_protocol::network::NodeState;

    fn zone() -> Location {
        Location::Zone(0, 0)
    }

    #[tokio::test]
    async fn empty_devnet_is_rejected() {
        let err = Devnet::start(0, zone(), NodeConfig::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("at least one node"));
    }

    #[tokio::test]
    async fn nodes_start_and_join_every_topic() {
        let devnet = Devnet::start(3, zone(), NodeConfig::default()).await.unwrap();
        assert_eq!(devnet.nodes().len(), 3);

        let boot = devnet.nodes()[0].peer_id().to_string();
        for (index, node) in devnet.nodes().iter().enumerate() {
            assert_eq!(node.state(), NodeState::Running);
            assert_eq!(node.topics().len(), 3);
            if index > 0 {
                assert_eq!(node.config().bootpeers, vec![boot.clone()]);
            }
        }
        devnet.stop().await;
        assert!(devnet
            .nodes()
            .iter()
            .all(|n| n.state() == NodeState::Stopped));
    }

    #[tokio::test]
    async fn sealed_blocks_chain_and_commit_to_transactions() {
        let devnet = Devnet::start(1, zone(), NodeConfig::default()).await.unwrap();
        let first = devnet.seal_block(1, ContentHash::ZERO);
        let second = devnet.seal_block(2, first.hash());

        assert_eq!(second.header.parent_hash, first.hash());
        assert_eq!(second.location(), zone());
        assert!(second.verify_tx_root());
        assert!(second.transactions.len() <= MAX_TXS_PER_BLOCK);
    }

    #[tokio::test]
    async fn follower_resolves_published_block_from_producer() {
        let devnet = Devnet::start(3, zone(), NodeConfig::default()).await.unwrap();
        let block = devnet.seal_block(1, ContentHash::ZERO);
        devnet.publish(0, &block).await.unwrap();

        let follower = &devnet.nodes()[2];
        let got = follower.request_block(block.hash(), zone()).await.unwrap();
        assert_eq!(got, block);
        assert_eq!(follower.stats().gossip_peer_hits, 1);

        // The gossiped header reaches followers without a request.
        let mut seen = false;
        for _ in 0..100 {
            if follower.caches().headers.contains(&block.hash()) {
                seen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen);
    }
}
