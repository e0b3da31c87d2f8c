//! End-to-end resolution tests.
//!
//! Several `P2pNode`s share one in-memory network. Each test wires up only
//! the peers it needs, so gossip meshes and provider records never leak
//! between tests.

use std::sync::Arc;
use std::time::Duration;

use shardnet_protocol::config::{FrameConfig, NodeConfig, PROTOCOL_ID};
use shardnet_protocol::network::{
    routing_key_for, Capabilities, DataKind, GossipEngine, MemoryBackend, MemoryNetwork,
    MemoryPeer, P2pNode, Stream, Transport,
};
use shardnet_protocol::types::{Block, ContentHash, Header, Location, Transaction};
use shardnet_protocol::wire::{
    encode_response, read_frame, write_frame, Payload, Response, ResponseAction,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct TestNode {
    node: P2pNode,
    peer: Arc<MemoryPeer>,
    backend: Arc<MemoryBackend>,
}

async fn spawn_node(network: &MemoryNetwork) -> TestNode {
    let peer = network.add_peer();
    let backend = Arc::new(MemoryBackend::new());
    let config = NodeConfig {
        solo: true,
        ..NodeConfig::default()
    };
    let node = P2pNode::new(config, Capabilities::from_host(peer.clone()), backend.clone());
    node.start().await.expect("node start");
    TestNode {
        node,
        peer,
        backend,
    }
}

fn zone() -> Location {
    Location::Zone(0, 0)
}

fn make_block(number: u64) -> Block {
    Block::new(
        Header {
            parent_hash: ContentHash::digest(&number.to_be_bytes()),
            number,
            location: zone(),
            state_root: ContentHash::ZERO,
            tx_root: ContentHash::ZERO,
            gas_limit: 8_000_000,
            gas_used: 21_000,
            timestamp: 1_700_000_000_000 + number,
        },
        vec![make_tx(number)],
    )
}

fn make_tx(nonce: u64) -> Transaction {
    Transaction {
        nonce,
        to: Some([0x11; 20]),
        value: 10,
        gas: 21_000,
        gas_price: 1,
        input: Vec::new(),
    }
}

/// Polls `check` until it holds or a second has passed.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gossiped_block_lands_in_cache() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network).await;
    let b = spawn_node(&network).await;
    a.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    b.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    assert!(a.node.topics().contains(&"zone-0-0/blocks".to_string()));

    let block = make_block(1);
    b.node
        .broadcast(&zone(), &Payload::Block(block.clone()))
        .await
        .unwrap();

    let hash = block.hash();
    assert!(eventually(|| a.node.caches().blocks.contains(&hash)).await);
    assert_eq!(a.node.caches().blocks.get(&hash), Some(block));
    assert!(eventually(|| a.backend.received() == vec![hash]).await);
    assert!(!b.node.caches().blocks.contains(&hash));
}

#[tokio::test]
async fn gossiped_block_is_announced_by_receiver() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network).await;
    let b = spawn_node(&network).await;
    a.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    b.node.subscribe(&zone(), DataKind::Block).await.unwrap();

    let block = make_block(11);
    b.node
        .broadcast(&zone(), &Payload::Block(block.clone()))
        .await
        .unwrap();

    let key = routing_key_for(&zone(), DataKind::Block);
    let receiver = a.node.peer_id();
    assert!(eventually(|| network.providers(&key).contains(&receiver)).await);
    assert!(!network.providers(&key).contains(&b.node.peer_id()));

    // Once the receiver leaves the mesh, a fresh node still finds the
    // block through its provider record.
    a.node.unsubscribe(&zone(), DataKind::Block).await.unwrap();
    let outsider = spawn_node(&network).await;
    let got = outsider
        .node
        .request_block(block.hash(), zone())
        .await
        .unwrap();
    assert_eq!(got, block);
    assert_eq!(outsider.node.stats().dht_hits, 1);
}

#[tokio::test]
async fn rejected_gossip_bans_source_and_is_not_announced() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network).await;
    let b = spawn_node(&network).await;
    a.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    b.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    a.backend.distrust(b.node.peer_id());

    let block = make_block(12);
    b.node
        .broadcast(&zone(), &Payload::Block(block.clone()))
        .await
        .unwrap();

    let source = b.node.peer_id();
    assert!(eventually(|| a.node.is_banned(&source)).await);
    assert!(!a.node.caches().blocks.contains(&block.hash()));
    assert!(a.backend.received().is_empty());
    assert!(network
        .providers(&routing_key_for(&zone(), DataKind::Block))
        .is_empty());
}

#[tokio::test]
async fn gossiped_transaction_reaches_consensus() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network).await;
    let b = spawn_node(&network).await;
    let region = Location::Region(0);
    a.node.subscribe(&region, DataKind::Transaction).await.unwrap();
    b.node.subscribe(&region, DataKind::Transaction).await.unwrap();

    let tx = make_tx(5);
    b.node
        .broadcast(&region, &Payload::Transaction(tx.clone()))
        .await
        .unwrap();

    assert!(eventually(|| a.backend.received() == vec![tx.hash()]).await);
    assert_eq!(a.node.caches().transactions.get(&tx.hash()), Some(tx));
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cached_block_resolves_without_network() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network).await;
    let block = make_block(2);
    a.node.caches().blocks.insert(block.hash(), block.clone());

    let got = a.node.request_block(block.hash(), zone()).await.unwrap();
    assert_eq!(got, block);
    assert_eq!(a.peer.streams_opened(), 0);
    assert_eq!(a.peer.provider_queries(), 0);
    assert_eq!(a.node.stats().cache_hits, 1);
}

#[tokio::test]
async fn gossip_peer_serves_block_from_consensus() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let holder = spawn_node(&network).await;
    holder.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    let block = make_block(3);
    holder.backend.insert_block(block.clone());

    let got = requester
        .node
        .request_block(block.hash(), zone())
        .await
        .unwrap();
    assert_eq!(got, block);
    assert_eq!(requester.node.stats().gossip_peer_hits, 1);
    assert_eq!(requester.peer.provider_queries(), 0);
    assert!(requester.node.caches().blocks.contains(&block.hash()));
    assert!(eventually(|| holder.node.stats().streams_served == 1).await);
}

#[tokio::test]
async fn dht_provider_serves_block_on_first_round() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let provider = spawn_node(&network).await;
    let block = make_block(4);
    provider.backend.insert_block(block.clone());
    provider.node.announce(&zone(), DataKind::Block).await.unwrap();

    let key = routing_key_for(&zone(), DataKind::Block);
    assert!(!network.providers(&key).contains(&requester.node.peer_id()));

    let got = requester
        .node
        .request_block(block.hash(), zone())
        .await
        .unwrap();
    assert_eq!(got, block);
    assert_eq!(requester.peer.provider_queries(), 1);
    assert_eq!(requester.node.stats().dht_hits, 1);
    assert!(network.providers(&key).contains(&requester.node.peer_id()));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_closes_channel_after_all_rounds() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let empty = spawn_node(&network).await;
    empty.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    empty.node.announce(&zone(), DataKind::Block).await.unwrap();

    let started = tokio::time::Instant::now();
    let result = requester
        .node
        .request_block(ContentHash::digest(b"missing"), zone())
        .await;

    assert!(result.is_err(), "channel must close without a value");
    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(requester.peer.provider_queries(), 3);
    // One gossip attempt plus one per DHT round.
    assert_eq!(requester.peer.streams_opened(), 4);
    assert_eq!(requester.node.stats().exhausted, 1);
}

#[tokio::test]
async fn mismatched_response_is_skipped_for_next_peer() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let block = make_block(6);

    // Joins the mesh first and answers every request with a header under
    // a block action.
    let liar = network.add_peer();
    liar.join("zone-0-0/blocks").await.unwrap();
    let header = block.header.clone();
    liar.set_stream_handler(
        PROTOCOL_ID,
        Arc::new(move |mut stream: Stream| {
            let header = header.clone();
            tokio::spawn(async move {
                let config = FrameConfig::default();
                let _ = read_frame(&mut stream.io, &config).await;
                let bogus = Response {
                    action: ResponseAction::Block,
                    payload: Some(Payload::Header(header)),
                };
                let bytes = encode_response(&bogus).unwrap();
                let _ = write_frame(&mut stream.io, &bytes, &config).await;
            });
        }),
    );

    let honest = spawn_node(&network).await;
    honest.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    honest.backend.insert_block(block.clone());

    let got = requester
        .node
        .request_block(block.hash(), zone())
        .await
        .unwrap();
    assert_eq!(got, block);
    assert_eq!(liar.streams_opened(), 0);
    assert_eq!(requester.peer.streams_opened(), 2);
}

#[tokio::test]
async fn headers_and_transactions_resolve_like_blocks() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let holder = spawn_node(&network).await;
    holder.node.subscribe(&zone(), DataKind::Header).await.unwrap();
    holder.node.subscribe(&zone(), DataKind::Transaction).await.unwrap();

    let block = make_block(7);
    let tx = block.transactions[0].clone();
    holder.backend.insert_block(block.clone());
    holder.backend.insert_transaction(zone(), tx.clone());

    let header = requester
        .node
        .request_header(block.hash(), zone())
        .await
        .unwrap();
    assert_eq!(header, block.header);

    let got = requester
        .node
        .request_transaction(tx.hash(), zone())
        .await
        .unwrap();
    assert_eq!(got, tx);
    assert!(requester.node.caches().headers.contains(&block.hash()));
    assert!(requester.node.caches().transactions.contains(&tx.hash()));
}

#[tokio::test(start_paused = true)]
async fn banned_peer_is_never_asked() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let holder = spawn_node(&network).await;
    holder.node.subscribe(&zone(), DataKind::Block).await.unwrap();
    let block = make_block(8);
    holder.backend.insert_block(block.clone());

    requester.node.report_bad_peer(holder.node.peer_id()).await;
    let result = requester.node.request_block(block.hash(), zone()).await;
    assert!(result.is_err());
    assert_eq!(requester.peer.streams_opened(), 0);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopped_node_no_longer_serves() {
    let network = MemoryNetwork::new();
    let requester = spawn_node(&network).await;
    let holder = spawn_node(&network).await;
    holder.node.announce(&zone(), DataKind::Block).await.unwrap();
    holder.node.stop().await.unwrap();

    let err = requester
        .peer
        .open_stream(holder.node.peer_id(), PROTOCOL_ID)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unreachable"));
    assert!(network
        .providers(&routing_key_for(&zone(), DataKind::Block))
        .is_empty());
}
