//! # Prometheus Metrics
//!
//! Exposes the resolution counters of every node this process runs.
//! Scraped by Prometheus at `/metrics` on the API port.
//!
//! The protocol crate keeps its own lock-free counters; this module samples
//! them into gauges right before each scrape so the two never drift.
//! All metrics live in a dedicated [`prometheus::Registry`] prefixed
//! `shardnet_`.

use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use shardnet_protocol::network::StatsSnapshot;

/// Holds all Prometheus metric handles for the process.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Number of nodes running in this process.
    pub nodes: IntGauge,
    /// Blocks held across all block caches.
    pub cached_blocks: IntGauge,
    pub cache_hits: IntGauge,
    pub gossip_peer_hits: IntGauge,
    pub dht_hits: IntGauge,
    pub resolutions_exhausted: IntGauge,
    pub streams_served: IntGauge,
    pub gossip_received: IntGauge,
    pub gossip_dropped: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("shardnet".into()), None)?;

        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let nodes = gauge("nodes", "Number of nodes running in this process")?;
        let cached_blocks = gauge("cached_blocks", "Blocks held across all result caches")?;
        let cache_hits = gauge("cache_hits", "Resolutions answered from a result cache")?;
        let gossip_peer_hits = gauge(
            "gossip_peer_hits",
            "Resolutions answered by a gossip-mesh peer",
        )?;
        let dht_hits = gauge("dht_hits", "Resolutions answered by a DHT provider")?;
        let resolutions_exhausted = gauge(
            "resolutions_exhausted",
            "Resolutions that ran out of candidate peers",
        )?;
        let streams_served = gauge("streams_served", "Inbound request streams handled")?;
        let gossip_received = gauge("gossip_received", "Gossip messages decoded and delivered")?;
        let gossip_dropped = gauge("gossip_dropped", "Gossip messages that failed to decode")?;

        Ok(Self {
            registry,
            nodes,
            cached_blocks,
            cache_hits,
            gossip_peer_hits,
            dht_hits,
            resolutions_exhausted,
            streams_served,
            gossip_received,
            gossip_dropped,
        })
    }

    /// Copies a stats snapshot into the gauges.
    pub fn observe(&self, stats: &StatsSnapshot) {
        self.cache_hits.set(stats.cache_hits as i64);
        self.gossip_peer_hits.set(stats.gossip_peer_hits as i64);
        self.dht_hits.set(stats.dht_hits as i64);
        self.resolutions_exhausted.set(stats.exhausted as i64);
        self.streams_served.set(stats.streams_served as i64);
        self.gossip_received.set(stats.gossip_received as i64);
        self.gossip_dropped.set(stats.gossip_dropped as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Sums per-node snapshots into one process-wide view.
pub fn total<'a>(snapshots: impl IntoIterator<Item = &'a StatsSnapshot>) -> StatsSnapshot {
    snapshots
        .into_iter()
        .fold(StatsSnapshot::default(), |acc, s| StatsSnapshot {
            cache_hits: acc.cache_hits + s.cache_hits,
            gossip_peer_hits: acc.gossip_peer_hits + s.gossip_peer_hits,
            dht_hits: acc.dht_hits + s.dht_hits,
            exhausted: acc.exhausted + s.exhausted,
            streams_served: acc.streams_served + s.streams_served,
            gossip_received: acc.gossip_received + s.gossip_received,
            gossip_dropped: acc.gossip_dropped + s.gossip_dropped,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_snapshot_shows_up_in_exposition() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.observe(&StatsSnapshot {
            dht_hits: 7,
            exhausted: 2,
            ..StatsSnapshot::default()
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains("shardnet_dht_hits 7"));
        assert!(text.contains("shardnet_resolutions_exhausted 2"));
        assert!(text.contains("shardnet_cache_hits 0"));
    }

    #[test]
    fn total_sums_every_field() {
        let a = StatsSnapshot {
            cache_hits: 1,
            streams_served: 4,
            ..StatsSnapshot::default()
        };
        let b = StatsSnapshot {
            cache_hits: 2,
            gossip_dropped: 1,
            ..StatsSnapshot::default()
        };
        let sum = total([&a, &b]);
        assert_eq!(sum.cache_hits, 3);
        assert_eq!(sum.streams_served, 4);
        assert_eq!(sum.gossip_dropped, 1);
        let none: [&StatsSnapshot; 0] = [];
        assert_eq!(total(none), StatsSnapshot::default());
    }
}
