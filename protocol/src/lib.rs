// Copyright (c) 2026 shardnet contributors. MIT License.
// See LICENSE for details.

//! # Shardnet Protocol: Core Library
//!
//! The content-resolution layer of a sharded chain node. The chain is split
//! into a Prime → Region → Zone hierarchy, and every block, header or
//! transaction this node does not have locally is fetched from peers that
//! share its shard.
//!
//! ## Architecture
//!
//! - **types**: `ContentHash`, `Location` and the block/header/transaction payloads.
//! - **wire**: length-prefixed framing and the versioned request/response codec.
//! - **network**: shard addressing, the stream handler, gossip relay, DHT
//!   router, result caches, the resolution orchestrator and `P2pNode`.
//! - **config**: wire constants, timing constants and runtime configuration.
//!
//! ## Resolution in one paragraph
//!
//! A lookup checks the local result cache, then asks every gossip-mesh peer
//! of the shard's topic over a direct stream, then runs a bounded number of
//! DHT provider rounds. The first peer that returns the object wins; the
//! object is cached and this node announces itself as a provider so others
//! can find it too.
//!
//! The peer-to-peer stack itself (connections, mesh maintenance, Kademlia)
//! is consumed through the traits in [`network::transport`].

pub mod config;
pub mod network;
pub mod types;
pub mod wire;

pub use network::{DataKind, P2pNode};
pub use types::{Block, ContentHash, Header, Location, Transaction};
