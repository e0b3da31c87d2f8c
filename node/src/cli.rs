//! # CLI Interface
//!
//! Defines the command-line argument structure for `shardnet-node` using
//! `clap` derive. Supports three subcommands: `devnet`, `topic`, and
//! `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Shardnet resolution node.
///
/// Runs the shard-scoped block, header and transaction resolution layer,
/// serves a status API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "shardnet-node",
    about = "Shardnet resolution node",
    version,
    propagate_version = true
)]
pub struct ShardnetNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "SHARDNET_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Default log directive when `RUST_LOG` is unset.
    #[arg(
        long,
        global = true,
        env = "SHARDNET_LOG_LEVEL",
        default_value = "shardnet_node=info,shardnet_protocol=info"
    )]
    pub log_level: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run several nodes over an in-process network and serve their status.
    Devnet(DevnetArgs),
    /// Print the gossip topic and DHT routing key for a shard.
    Topic(TopicArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `devnet` subcommand.
#[derive(Args, Debug)]
pub struct DevnetArgs {
    /// Path to a JSON node configuration file.
    ///
    /// Fields left out of the file keep their defaults.
    #[arg(long, short = 'c', env = "SHARDNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of nodes to run. The first one is the boot peer.
    #[arg(long, short = 'n', env = "SHARDNET_DEVNET_NODES", default_value_t = 4)]
    pub nodes: usize,

    /// Shard the devnet produces into, e.g. `zone-0-0` or `region-1`.
    #[arg(long, env = "SHARDNET_LOCATION", default_value = "zone-0-0")]
    pub location: String,

    /// Milliseconds between produced blocks.
    #[arg(long, env = "SHARDNET_BLOCK_INTERVAL_MS", default_value_t = 2_000)]
    pub block_interval_ms: u64,

    /// Port for the status and metrics API.
    #[arg(long, env = "SHARDNET_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Overrides `cache_capacity` from the config file.
    #[arg(long, env = "SHARDNET_CACHE_CAPACITY")]
    pub cache_capacity: Option<usize>,

    /// Overrides the number of DHT rounds per resolution.
    #[arg(long, env = "SHARDNET_DHT_RETRIES")]
    pub dht_retries: Option<u32>,
}

/// Arguments for the `topic` subcommand.
#[derive(Args, Debug)]
pub struct TopicArgs {
    /// Shard name: `prime`, `region-<r>` or `zone-<r>-<z>`.
    pub location: String,

    /// Data kind: `blocks`, `headers` or `transactions`.
    #[arg(default_value = "blocks")]
    pub kind: String,
}
