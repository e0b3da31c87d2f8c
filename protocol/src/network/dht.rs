//! # DHT Content Router
//!
//! Provider records keyed by the routing key of a (location, kind) topic.
//! A node announces itself every time it learns new content for a shard,
//! so peers outside its gossip mesh can still find it.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use libp2p::PeerId;
use thiserror::Error;
use tracing::debug;

use crate::network::topic::{routing_key_for, DataKind};
use crate::network::transport::ContentRouting;
use crate::types::Location;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DhtError {
    #[error("failed to provide record: {0}")]
    Provide(String),

    #[error("DHT is closed")]
    Closed,
}

pub struct DhtRouter {
    routing: Arc<dyn ContentRouting>,
}

impl DhtRouter {
    pub fn new(routing: Arc<dyn ContentRouting>) -> Self {
        Self { routing }
    }

    /// Registers this node as a provider of `kind` data for `location`.
    pub async fn announce(&self, location: &Location, kind: DataKind) -> Result<(), DhtError> {
        let key = routing_key_for(location, kind);
        debug!(%location, %kind, %key, "announcing provider record");
        self.routing.provide(&key).await
    }

    /// Up to `max` providers of `kind` data for `location`.
    ///
    /// An empty stream means nobody is known right now, not that the shard
    /// is gone.
    pub fn find_providers(
        &self,
        location: &Location,
        kind: DataKind,
        max: usize,
    ) -> BoxStream<'static, PeerId> {
        let key = routing_key_for(location, kind);
        self.routing.find_providers(&key, max).take(max).boxed()
    }

    pub async fn shutdown(&self) -> Result<(), DhtError> {
        self.routing.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryNetwork;
    use crate::network::topic::routing_key_for;

    #[tokio::test]
    async fn announced_peers_are_found() {
        let network = MemoryNetwork::new();
        let a = network.add_peer();
        let b = network.add_peer();
        let location = Location::Zone(0, 0);

        DhtRouter::new(a.clone())
            .announce(&location, DataKind::Block)
            .await
            .unwrap();

        let found: Vec<PeerId> = DhtRouter::new(b)
            .find_providers(&location, DataKind::Block, 10)
            .collect()
            .await;
        assert_eq!(found, vec![a.peer_id()]);
        assert!(network
            .providers(&routing_key_for(&location, DataKind::Block))
            .contains(&a.peer_id()));
    }

    #[tokio::test]
    async fn provider_list_is_bounded_and_kind_scoped() {
        let network = MemoryNetwork::new();
        let location = Location::Region(0);
        for _ in 0..5 {
            let peer = network.add_peer();
            DhtRouter::new(peer)
                .announce(&location, DataKind::Header)
                .await
                .unwrap();
        }

        let router = DhtRouter::new(network.add_peer());
        let headers: Vec<PeerId> = router
            .find_providers(&location, DataKind::Header, 3)
            .collect()
            .await;
        assert_eq!(headers.len(), 3);

        let blocks: Vec<PeerId> = router
            .find_providers(&location, DataKind::Block, 3)
            .collect()
            .await;
        assert!(blocks.is_empty());
    }
}
