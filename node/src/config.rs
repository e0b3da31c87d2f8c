//! Node configuration loading.
//!
//! The JSON file is optional; anything it leaves out keeps the
//! `NodeConfig` default, and CLI flags win over both.

use anyhow::{Context, Result};
use std::path::Path;

use shardnet_protocol::config::NodeConfig;

use crate::cli::DevnetArgs;

/// Reads a `NodeConfig` from `path`, or returns the defaults when no path
/// was given.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let Some(path) = path else {
        return Ok(NodeConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Applies CLI/env overrides on top of a loaded config.
pub fn apply_overrides(mut config: NodeConfig, args: &DevnetArgs) -> NodeConfig {
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = capacity;
    }
    if let Some(retries) = args.dht_retries {
        config.resolution.max_dht_query_retries = retries;
    }
    config
}
