//! # Network Module
//!
//! Shard-scoped content resolution on top of three network capabilities:
//! point-to-point streams, gossip topics and DHT provider records.
//!
//! ## Architecture
//!
//! ```text
//! topic.rs       (location, kind) → gossip topic and DHT routing key
//! transport.rs   capability traits consumed from the p2p stack
//! handler.rs     per-stream request loop and the client-side request
//! gossip.rs      topic subscriptions, broadcast and the receive loop
//! dht.rs         provider announce / lookup for a shard
//! cache.rs       bounded LRU result caches
//! resolver.rs    cache → gossip peers → DHT rounds
//! consensus.rs   consensus backend interface and an in-memory backend
//! node.rs        P2pNode lifecycle and query surface
//! memory.rs      in-process implementation of the capability traits
//! stats.rs       counters exported by the node binary
//! ```
//!
//! ## Design Decisions
//!
//! - Gossip delivery is a bounded channel drained by the node's intake
//!   task. The receive loop never touches a cache lock itself.
//! - Result caches sit behind `parking_lot::Mutex`; an LRU `get` mutates
//!   recency, so a read lock would not be enough.
//! - Subscriptions and the ban list use `dashmap` so unrelated topics and
//!   peers never contend on one lock.
//! - Peers within a stage are queried sequentially; the first object that
//!   carries the requested hash wins.

pub mod cache;
pub mod consensus;
pub mod dht;
pub mod gossip;
pub mod handler;
pub mod memory;
pub mod node;
pub mod resolver;
pub mod stats;
pub mod topic;
pub mod transport;

pub use cache::{ResultCache, ResultCaches};
pub use consensus::{ConsensusBackend, MemoryBackend};
pub use dht::{DhtError, DhtRouter};
pub use gossip::{Delivery, GossipError, GossipRelay};
pub use handler::{
    request_from_peer, serve_stream, stream_handler, HandlerError, NodeQuery, RequestError,
};
pub use memory::{MemoryNetwork, MemoryPeer};
pub use node::{NodeError, NodeState, P2pNode};
pub use resolver::{Resolvable, Resolver};
pub use stats::{NetworkStats, StatsSnapshot};
pub use topic::{
    data_kind_from_topic, routing_key, routing_key_for, topic_name, AddressingError, DataKind,
    RoutingKey,
};
pub use transport::{
    Capabilities, ContentRouting, GossipEngine, GossipMessage, Stream, StreamHandler, StreamIo,
    Subscription, Transport, TransportError,
};
