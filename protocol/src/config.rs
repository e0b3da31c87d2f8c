//! # Protocol Configuration & Constants
//!
//! Every wire-level and timing constant used by the resolution layer lives
//! here, next to the runtime configuration structs that let a deployment
//! override them. Two nodes only interoperate if they agree on the values in
//! the "Wire Contract" block; everything else is a local tuning knob.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire Contract
// ---------------------------------------------------------------------------

/// Stream protocol identifier negotiated for request/response traffic.
/// Streams opened under any other identifier are closed without a reply.
pub const PROTOCOL_ID: &str = "/shardnet/1.0.0";

/// Size of the big-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload a single frame may carry (16 MiB). A prefix announcing
/// more than this is treated as a framing error before any allocation.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Version stamped into every request/response envelope.
pub const CODEC_VERSION: u16 = 1;

/// Oldest envelope version this implementation still decodes.
pub const MIN_CODEC_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Topic Suffixes
// ---------------------------------------------------------------------------

/// Gossip topic suffix for full blocks.
pub const BLOCK_TOPIC_SUFFIX: &str = "blocks";

/// Gossip topic suffix for headers.
pub const HEADER_TOPIC_SUFFIX: &str = "headers";

/// Gossip topic suffix for transactions.
pub const TRANSACTION_TOPIC_SUFFIX: &str = "transactions";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Default read/write deadline on a stream.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of DHT provider rounds a resolution makes before giving up.
pub const MAX_DHT_QUERY_RETRIES: u32 = 3;

/// Providers requested from the DHT per round.
pub const PEERS_PER_DHT_QUERY: usize = 10;

/// Pause between two DHT rounds.
pub const DHT_QUERY_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for each service shutdown in `P2pNode::stop`.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Capacities
// ---------------------------------------------------------------------------

/// Default number of entries kept per result cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Bounded channel depth between the gossip receive loop and the node.
pub const GOSSIP_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Deadlines and size limits applied to a single framed stream.
///
/// A `None` deadline disables the timeout entirely. That is allowed, but a
/// peer that stops sending mid-frame will then hold its handler task until
/// the connection itself goes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Deadline for reading one complete frame.
    #[serde(with = "opt_millis")]
    pub read_timeout: Option<Duration>,
    /// Deadline for writing one complete frame.
    #[serde(with = "opt_millis")]
    pub write_timeout: Option<Duration>,
    /// Largest accepted payload length.
    pub max_frame_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_timeout: Some(STREAM_TIMEOUT),
            write_timeout: Some(STREAM_TIMEOUT),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl FrameConfig {
    /// Configuration with both deadlines disabled.
    pub fn without_deadlines() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            ..Self::default()
        }
    }
}

/// Retry budget for the DHT stage of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Number of provider rounds.
    pub max_dht_query_retries: u32,
    /// Providers requested per round.
    pub peers_per_dht_query: usize,
    /// Sleep after a round that produced nothing.
    #[serde(with = "millis")]
    pub dht_query_retry_interval: Duration,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_dht_query_retries: MAX_DHT_QUERY_RETRIES,
            peers_per_dht_query: PEERS_PER_DHT_QUERY,
            dht_query_retry_interval: DHT_QUERY_RETRY_INTERVAL,
        }
    }
}

/// Everything a `P2pNode` needs besides its network capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Stream framing limits.
    pub frame: FrameConfig,
    /// DHT retry budget.
    pub resolution: ResolutionConfig,
    /// Entries per result cache (blocks, headers, transactions).
    pub cache_capacity: usize,
    /// Depth of the gossip delivery channel.
    pub gossip_channel_capacity: usize,
    /// Bootnodes only serve streams; they never join gossip.
    pub bootnode: bool,
    /// Solo nodes may start without any boot peers.
    pub solo: bool,
    /// Peers dialed on start, as base58 peer ids.
    pub bootpeers: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            resolution: ResolutionConfig::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            gossip_channel_capacity: GOSSIP_CHANNEL_CAPACITY,
            bootnode: false,
            solo: false,
            bootpeers: Vec::new(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
