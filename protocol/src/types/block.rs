//! # Block, Header and Transaction
//!
//! Payload types carried by responses and gossip. Validation is the
//! consensus engine's job; this crate only needs each value to report its
//! own identity so it can be cached and matched against the requested hash.
//!
//! ## Hash Computation
//!
//! ```text
//! header hash = BLAKE3(parent_hash || number || location || state_root
//!                      || tx_root || gas_limit || gas_used || timestamp)
//! tx hash     = BLAKE3(nonce || to || value || gas || gas_price || input)
//! tx_root     = BLAKE3(tx_hash_0 || tx_hash_1 || ...)   (zero when empty)
//! block hash  = header hash
//! ```
//!
//! Integers are hashed big-endian; the location is hashed through its
//! canonical name so the digest is stable across implementations.

use serde::{Deserialize, Serialize};

use super::hash::ContentHash;
use super::location::Location;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A transaction, treated as an opaque payload with a stable identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender account nonce.
    pub nonce: u64,
    /// Recipient address; `None` for contract creation.
    pub to: Option<[u8; 20]>,
    /// Value transferred, in the chain's smallest denomination.
    pub value: u64,
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: u64,
    /// Call data.
    pub input: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.nonce.to_be_bytes());
        match &self.to {
            Some(to) => {
                hasher.update(&[1]);
                hasher.update(to);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&self.value.to_be_bytes());
        hasher.update(&self.gas.to_be_bytes());
        hasher.update(&self.gas_price.to_be_bytes());
        hasher.update(&(self.input.len() as u64).to_be_bytes());
        hasher.update(&self.input);
        ContentHash::new(*hasher.finalize().as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Block header: chain linkage plus the commitments a light client needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Hash of the parent block. [`ContentHash::ZERO`] for the first block.
    pub parent_hash: ContentHash,
    /// Block number within its location's chain.
    pub number: u64,
    /// Shard this header belongs to.
    pub location: Location,
    /// State root after applying the block.
    pub state_root: ContentHash,
    /// Commitment over the block's transaction hashes.
    pub tx_root: ContentHash,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl Header {
    pub fn hash(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.parent_hash.as_bytes());
        hasher.update(&self.number.to_be_bytes());
        hasher.update(self.location.name().as_bytes());
        hasher.update(self.state_root.as_bytes());
        hasher.update(self.tx_root.as_bytes());
        hasher.update(&self.gas_limit.to_be_bytes());
        hasher.update(&self.gas_used.to_be_bytes());
        hasher.update(&self.timestamp.to_be_bytes());
        ContentHash::new(*hasher.finalize().as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A full block: header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Builds a block, filling `header.tx_root` from `transactions`.
    pub fn new(mut header: Header, transactions: Vec<Transaction>) -> Self {
        header.tx_root = compute_tx_root(&transactions);
        Self {
            header,
            transactions,
        }
    }

    /// Block identity; equal to the header hash.
    pub fn hash(&self) -> ContentHash {
        self.header.hash()
    }

    pub fn location(&self) -> Location {
        self.header.location
    }

    /// Checks that `header.tx_root` commits to the carried transactions.
    pub fn verify_tx_root(&self) -> bool {
        self.header.tx_root == compute_tx_root(&self.transactions)
    }
}

/// Commitment over an ordered transaction list. Zero for an empty list.
pub fn compute_tx_root(transactions: &[Transaction]) -> ContentHash {
    if transactions.is_empty() {
        return ContentHash::ZERO;
    }
    let mut hasher = blake3::Hasher::new();
    for tx in transactions {
        hasher.update(tx.hash().as_bytes());
    }
    ContentHash::new(*hasher.finalize().as_bytes())
}
