//! # Gossip Relay
//!
//! Topic membership, publication and the receive loop for shard-scoped
//! gossip. Topics are derived from (location, kind) by
//! [`crate::network::topic::topic_name`], so every node lands in the same
//! mesh for the same shard.
//!
//! ## Delivery
//!
//! Each subscription gets a small forwarder task that copies engine
//! messages into one shared inbound queue. [`GossipRelay::start`] spawns
//! the receive loop that drains that queue, decodes each message by its
//! topic suffix and pushes the result into a bounded [`Delivery`] channel.
//! The consumer of that channel (the node's intake task) decides what to
//! do with it, so no cache lock is ever taken from inside the gossip path.
//!
//! A message that fails to decode is logged and dropped. It never stops the
//! loop.

use std::sync::Arc;

use dashmap::DashMap;
use libp2p::PeerId;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GOSSIP_CHANNEL_CAPACITY;
use crate::network::stats::NetworkStats;
use crate::network::topic::{data_kind_from_topic, topic_name, AddressingError, DataKind};
use crate::network::transport::{GossipEngine, GossipMessage};
use crate::types::{Block, Header, Location, Transaction};
use crate::wire::codec::{decode_data, encode_data};
use crate::wire::{CodecError, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GossipError {
    #[error("not subscribed to topic {0}")]
    NotSubscribed(String),

    #[error("failed to join topic {0}: {1}")]
    Join(String, String),

    #[error("failed to subscribe to topic {0}: {1}")]
    Subscribe(String, String),

    #[error("failed to publish on topic {0}: {1}")]
    Publish(String, String),

    #[error("failed to list peers on topic {0}: {1}")]
    ListPeers(String, String),

    #[error("gossip receive loop already started")]
    AlreadyStarted,

    #[error(transparent)]
    Addressing(#[from] AddressingError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A decoded gossip message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub source: PeerId,
    pub payload: Payload,
}

pub struct GossipRelay {
    engine: Arc<dyn GossipEngine>,
    /// Forwarder task per subscribed topic.
    subscriptions: DashMap<String, JoinHandle<()>>,
    inbound_tx: mpsc::Sender<GossipMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<GossipMessage>>>,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<NetworkStats>,
}

impl GossipRelay {
    pub fn new(engine: Arc<dyn GossipEngine>, stats: Arc<NetworkStats>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(GOSSIP_CHANNEL_CAPACITY);
        Self {
            engine,
            subscriptions: DashMap::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            receive_loop: Mutex::new(None),
            stats,
        }
    }

    /// Joins and subscribes to the topic for `kind` data in `location`.
    ///
    /// Subscribing to a topic that is already subscribed does nothing.
    pub async fn subscribe(&self, location: &Location, kind: DataKind) -> Result<(), GossipError> {
        let topic = topic_name(location, kind);
        if self.subscriptions.contains_key(&topic) {
            debug!(%topic, "already subscribed");
            return Ok(());
        }

        self.engine.join(&topic).await?;
        let mut subscription = self.engine.subscribe(&topic).await?;

        let inbound = self.inbound_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                if inbound.send(message).await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.subscriptions.insert(topic.clone(), forwarder) {
            previous.abort();
        }
        info!(%topic, "subscribed");
        Ok(())
    }

    /// Leaves the topic and stops its forwarder.
    pub async fn unsubscribe(&self, location: &Location, kind: DataKind) -> Result<(), GossipError> {
        let topic = topic_name(location, kind);
        let (_, forwarder) = self
            .subscriptions
            .remove(&topic)
            .ok_or_else(|| GossipError::NotSubscribed(topic.clone()))?;
        forwarder.abort();
        self.engine.leave(&topic).await?;
        info!(%topic, "unsubscribed");
        Ok(())
    }

    pub fn is_subscribed(&self, location: &Location, kind: DataKind) -> bool {
        self.subscriptions
            .contains_key(&topic_name(location, kind))
    }

    /// Topics currently subscribed, in no particular order.
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Publishes `payload` on the topic of its own kind in `location`.
    pub async fn broadcast(&self, location: &Location, payload: &Payload) -> Result<(), GossipError> {
        let topic = topic_name(location, DataKind::of(payload));
        if !self.subscriptions.contains_key(&topic) {
            return Err(GossipError::NotSubscribed(topic));
        }

        let data = match payload {
            Payload::Block(block) => encode_data(block)?,
            Payload::Header(header) => encode_data(header)?,
            Payload::Transaction(tx) => encode_data(tx)?,
        };
        debug!(%topic, bytes = data.len(), "broadcasting");
        self.engine.publish(&topic, data).await
    }

    /// Mesh peers on the topic for `kind` data in `location`.
    pub async fn peers_for_topic(
        &self,
        location: &Location,
        kind: DataKind,
    ) -> Result<Vec<PeerId>, GossipError> {
        self.engine.list_peers(&topic_name(location, kind)).await
    }

    /// Spawns the receive loop, which pushes every decoded message into
    /// `sink` until the sink closes. Can only be called once.
    pub fn start(&self, sink: mpsc::Sender<Delivery>) -> Result<(), GossipError> {
        let mut inbound = self
            .inbound_rx
            .lock()
            .take()
            .ok_or(GossipError::AlreadyStarted)?;
        let stats = self.stats.clone();

        let handle = tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let delivery = match decode_message(message) {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        warn!(error = %err, "dropping undecodable gossip message");
                        stats.record_gossip_dropped();
                        continue;
                    }
                };
                stats.record_gossip_received();
                if sink.send(delivery).await.is_err() {
                    debug!("gossip sink closed, stopping receive loop");
                    break;
                }
            }
        });
        *self.receive_loop.lock() = Some(handle);
        Ok(())
    }

    /// Stops every forwarder and the receive loop.
    pub fn shutdown(&self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
        self.subscriptions.clear();
        if let Some(handle) = self.receive_loop.lock().take() {
            handle.abort();
        }
    }
}

fn decode_message(message: GossipMessage) -> Result<Delivery, GossipError> {
    let payload = match data_kind_from_topic(&message.topic)? {
        DataKind::Block => Payload::Block(decode_data::<Block>(&message.data)?),
        DataKind::Header => Payload::Header(decode_data::<Header>(&message.data)?),
        DataKind::Transaction => Payload::Transaction(decode_data::<Transaction>(&message.data)?),
    };
    Ok(Delivery {
        topic: message.topic,
        source: message.source,
        payload,
    })
}
