//! # Consensus Backend
//!
//! The consensus engine owns validated chain data. This layer asks it for
//! objects it does not have cached and hands it everything that arrives
//! over gossip. Validation happens on the other side of this trait.
//!
//! [`MemoryBackend`] is a map-backed implementation used by tests and the
//! devnet runner.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use libp2p::PeerId;
use parking_lot::RwLock;

use crate::types::{Block, ContentHash, Header, Location, Transaction};

#[async_trait]
pub trait ConsensusBackend: Send + Sync {
    async fn lookup_block(&self, hash: &ContentHash, location: &Location) -> Option<Block>;

    /// Defaults to the header of the matching block.
    async fn lookup_header(&self, hash: &ContentHash, location: &Location) -> Option<Header> {
        self.lookup_block(hash, location)
            .await
            .map(|block| block.header)
    }

    async fn lookup_transaction(
        &self,
        _hash: &ContentHash,
        _location: &Location,
    ) -> Option<Transaction> {
        None
    }

    /// Called for every block received over gossip, after it was cached.
    ///
    /// Returning `false` rejects the block: it is evicted from the cache,
    /// never announced, and `source` is banned.
    async fn on_new_block(&self, _source: PeerId, _block: &Block) -> bool {
        true
    }

    /// Called for every transaction received over gossip, after it was
    /// cached. `false` rejects it the same way as a block.
    async fn on_new_transaction(&self, _source: PeerId, _tx: &Transaction) -> bool {
        true
    }
}

/// Map-backed [`ConsensusBackend`] that accepts everything it is given,
/// except gossip from sources marked with [`MemoryBackend::distrust`].
#[derive(Default)]
pub struct MemoryBackend {
    blocks: DashMap<ContentHash, Block>,
    headers: DashMap<ContentHash, Header>,
    transactions: DashMap<(Location, ContentHash), Transaction>,
    distrusted: DashSet<PeerId>,
    /// Hashes of gossiped objects in arrival order.
    received: RwLock<Vec<ContentHash>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_block(&self, block: Block) {
        let hash = block.hash();
        self.headers.insert(hash, block.header.clone());
        self.blocks.insert(hash, block);
    }

    pub fn insert_header(&self, header: Header) {
        self.headers.insert(header.hash(), header);
    }

    pub fn insert_transaction(&self, location: Location, tx: Transaction) {
        self.transactions.insert((location, tx.hash()), tx);
    }

    /// Rejects all future gossip from `peer`.
    pub fn distrust(&self, peer: PeerId) {
        self.distrusted.insert(peer);
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Hashes handed over by gossip, oldest first.
    pub fn received(&self) -> Vec<ContentHash> {
        self.received.read().clone()
    }
}

#[async_trait]
impl ConsensusBackend for MemoryBackend {
    async fn lookup_block(&self, hash: &ContentHash, location: &Location) -> Option<Block> {
        self.blocks
            .get(hash)
            .filter(|block| block.location() == *location)
            .map(|block| block.clone())
    }

    async fn lookup_header(&self, hash: &ContentHash, location: &Location) -> Option<Header> {
        self.headers
            .get(hash)
            .filter(|header| header.location == *location)
            .map(|header| header.clone())
    }

    async fn lookup_transaction(
        &self,
        hash: &ContentHash,
        location: &Location,
    ) -> Option<Transaction> {
        self.transactions
            .get(&(*location, *hash))
            .map(|tx| tx.clone())
    }

    async fn on_new_block(&self, source: PeerId, block: &Block) -> bool {
        if self.distrusted.contains(&source) {
            return false;
        }
        self.received.write().push(block.hash());
        self.insert_block(block.clone());
        true
    }

    async fn on_new_transaction(&self, source: PeerId, tx: &Transaction) -> bool {
        if self.distrusted.contains(&source) {
            return false;
        }
        self.received.write().push(tx.hash());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_block(location: Location) -> Block {
        Block::new(
            Header {
                parent_hash: ContentHash::ZERO,
                number: 1,
                location,
                state_root: ContentHash::ZERO,
                tx_root: ContentHash::ZERO,
                gas_limit: 1,
                gas_used: 0,
                timestamp: 0,
            },
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn lookups_are_scoped_to_location() {
        let backend = MemoryBackend::new();
        let block = make_block(Location::Zone(1, 1));
        let hash = block.hash();
        backend.insert_block(block.clone());

        assert_eq!(
            backend.lookup_block(&hash, &Location::Zone(1, 1)).await,
            Some(block.clone())
        );
        assert_eq!(backend.lookup_block(&hash, &Location::Zone(1, 0)).await, None);
        assert_eq!(
            backend.lookup_header(&hash, &Location::Zone(1, 1)).await,
            Some(block.header)
        );
    }

    #[tokio::test]
    async fn gossiped_blocks_are_recorded() {
        let backend = MemoryBackend::new();
        let block = make_block(Location::Prime);
        assert!(backend.on_new_block(PeerId::random(), &block).await);

        assert_eq!(backend.received(), vec![block.hash()]);
        assert_eq!(backend.block_count(), 1);
    }

    #[tokio::test]
    async fn distrusted_sources_are_rejected() {
        let backend = MemoryBackend::new();
        let liar = PeerId::random();
        backend.distrust(liar);
        let block = make_block(Location::Prime);

        assert!(!backend.on_new_block(liar, &block).await);
        assert!(backend.received().is_empty());
        assert_eq!(backend.block_count(), 0);
        assert!(backend.on_new_block(PeerId::random(), &block).await);
    }
}
