//! # Shard Addressing
//!
//! Maps a (location, data kind) pair onto the two keys the network layer
//! needs:
//!
//! ```text
//! topic       = "<location-name>/<kind-suffix>"      e.g. "zone-0-0/blocks"
//! routing key = CIDv1(raw, sha2-256(topic bytes))
//! ```
//!
//! Both derivations are pure functions of their inputs. Every node on the
//! network must compute identical bytes, otherwise gossip meshes split and
//! DHT provider records are written under keys nobody queries.

use std::fmt;
use std::str::FromStr;

use libp2p::kad::RecordKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{BLOCK_TOPIC_SUFFIX, HEADER_TOPIC_SUFFIX, TRANSACTION_TOPIC_SUFFIX};
use crate::types::Location;
use crate::wire::{Payload, RequestAction};

/// CIDv1 version byte.
const CID_VERSION: u8 = 0x01;
/// Multicodec for raw binary content.
const CID_CODEC_RAW: u8 = 0x55;
/// Multihash code for sha2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;
/// Digest length of sha2-256.
const MULTIHASH_SHA2_256_LEN: u8 = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressingError {
    #[error("unsupported data kind: {0:?}")]
    UnsupportedDataKind(String),
}

// ---------------------------------------------------------------------------
// Data Kind
// ---------------------------------------------------------------------------

/// The three kinds of content that can be resolved or gossiped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Block,
    Header,
    Transaction,
}

impl DataKind {
    pub const ALL: [DataKind; 3] = [DataKind::Block, DataKind::Header, DataKind::Transaction];

    /// Topic suffix for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            DataKind::Block => BLOCK_TOPIC_SUFFIX,
            DataKind::Header => HEADER_TOPIC_SUFFIX,
            DataKind::Transaction => TRANSACTION_TOPIC_SUFFIX,
        }
    }

    pub fn request_action(self) -> RequestAction {
        match self {
            DataKind::Block => RequestAction::Block,
            DataKind::Header => RequestAction::Header,
            DataKind::Transaction => RequestAction::Transaction,
        }
    }

    pub fn of(payload: &Payload) -> Self {
        match payload {
            Payload::Block(_) => DataKind::Block,
            Payload::Header(_) => DataKind::Header,
            Payload::Transaction(_) => DataKind::Transaction,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for DataKind {
    type Err = AddressingError;

    /// Accepts the topic suffixes (`blocks`, `headers`, `transactions`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            BLOCK_TOPIC_SUFFIX => Ok(DataKind::Block),
            HEADER_TOPIC_SUFFIX => Ok(DataKind::Header),
            TRANSACTION_TOPIC_SUFFIX => Ok(DataKind::Transaction),
            other => Err(AddressingError::UnsupportedDataKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Gossip topic for `kind` data in `location`.
pub fn topic_name(location: &Location, kind: DataKind) -> String {
    format!("{}/{}", location.name(), kind.suffix())
}

/// Recovers the data kind from the text after the last `/` of a topic.
pub fn data_kind_from_topic(topic: &str) -> Result<DataKind, AddressingError> {
    let suffix = topic.rsplit('/').next().unwrap_or(topic);
    suffix.parse()
}

// ---------------------------------------------------------------------------
// Routing Keys
// ---------------------------------------------------------------------------

/// DHT provider-record key derived from a topic.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(Vec<u8>);

impl RoutingKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The key in the form the Kademlia behaviour expects.
    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(&self.0)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingKey({self})")
    }
}

/// CIDv1 bytes (raw codec, sha2-256 multihash) of the topic's UTF-8 bytes.
pub fn routing_key(topic: &str) -> RoutingKey {
    let digest = Sha256::digest(topic.as_bytes());
    let mut cid = Vec::with_capacity(4 + digest.len());
    cid.extend_from_slice(&[
        CID_VERSION,
        CID_CODEC_RAW,
        MULTIHASH_SHA2_256,
        MULTIHASH_SHA2_256_LEN,
    ]);
    cid.extend_from_slice(&digest);
    RoutingKey(cid)
}

/// Shorthand for `routing_key(&topic_name(location, kind))`.
pub fn routing_key_for(location: &Location, kind: DataKind) -> RoutingKey {
    routing_key(&topic_name(location, kind))
}
