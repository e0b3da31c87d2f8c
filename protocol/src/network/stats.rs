//! Lock-free counters for the resolution layer.
//!
//! The node binary samples these into Prometheus gauges and the `/status`
//! endpoint; nothing in this crate reads them back.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct NetworkStats {
    cache_hits: AtomicU64,
    gossip_peer_hits: AtomicU64,
    dht_hits: AtomicU64,
    exhausted: AtomicU64,
    streams_served: AtomicU64,
    gossip_received: AtomicU64,
    gossip_dropped: AtomicU64,
}

/// Point-in-time copy of [`NetworkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Resolutions answered from a result cache.
    pub cache_hits: u64,
    /// Resolutions answered by a gossip-mesh peer.
    pub gossip_peer_hits: u64,
    /// Resolutions answered by a DHT-discovered provider.
    pub dht_hits: u64,
    /// Resolutions that ran out of candidates.
    pub exhausted: u64,
    /// Inbound request streams handled to completion.
    pub streams_served: u64,
    /// Gossip messages decoded and delivered.
    pub gossip_received: u64,
    /// Gossip messages that failed to decode.
    pub gossip_dropped: u64,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gossip_peer_hit(&self) {
        self.gossip_peer_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dht_hit(&self) {
        self.dht_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_served(&self) {
        self.streams_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gossip_received(&self) {
        self.gossip_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gossip_dropped(&self) {
        self.gossip_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            gossip_peer_hits: self.gossip_peer_hits.load(Ordering::Relaxed),
            dht_hits: self.dht_hits.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            streams_served: self.streams_served.load(Ordering::Relaxed),
            gossip_received: self.gossip_received.load(Ordering::Relaxed),
            gossip_dropped: self.gossip_dropped.load(Ordering::Relaxed),
        }
    }
}
