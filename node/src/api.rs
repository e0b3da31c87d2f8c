//! # Status API
//!
//! Builds the axum router that exposes the node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                | Description                              |
//! |--------|---------------------|------------------------------------------|
//! | GET    | `/health`           | Liveness probe                           |
//! | GET    | `/status`           | Every node's state, topics and counters  |
//! | GET    | `/nodes/:peer_id`   | One node's status                        |
//! | GET    | `/blocks/:hash`     | Block summary from any node's query path |
//! | GET    | `/metrics`          | Prometheus text exposition               |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shardnet_protocol::network::{NodeQuery, NodeState, StatsSnapshot};
use shardnet_protocol::{ContentHash, Location, P2pNode};

use crate::metrics::{self, NodeMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The binary's reported version string.
    pub version: String,
    /// Shard the served nodes resolve in.
    pub location: Location,
    pub nodes: Arc<Vec<Arc<P2pNode>>>,
    pub metrics: Arc<NodeMetrics>,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Protocol id spoken on streams.
    pub protocol: String,
    pub location: String,
    /// Counters summed over every node.
    pub totals: StatsSnapshot,
    pub nodes: Vec<NodeStatus>,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// One node's entry in `/status` and `/nodes/:peer_id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    pub peer_id: String,
    pub state: NodeState,
    pub topics: Vec<String>,
    pub cached_blocks: usize,
    pub cached_headers: usize,
    pub cached_transactions: usize,
    pub stats: StatsSnapshot,
}

impl NodeStatus {
    fn of(node: &P2pNode) -> Self {
        let caches = node.caches();
        Self {
            peer_id: node.peer_id().to_string(),
            state: node.state(),
            topics: node.topics(),
            cached_blocks: caches.blocks.len(),
            cached_headers: caches.headers.len(),
            cached_transactions: caches.transactions.len(),
            stats: node.stats(),
        }
    }
}

/// Response payload for `GET /blocks/:hash`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub hash: String,
    pub parent_hash: String,
    pub number: u64,
    pub location: String,
    pub tx_count: usize,
    /// Peer id of the node that answered.
    pub served_by: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/nodes/:peer_id", get(node_handler))
        .route("/blocks/:hash", get(block_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let nodes: Vec<NodeStatus> = state.nodes.iter().map(|n| NodeStatus::of(n)).collect();
    let totals = metrics::total(nodes.iter().map(|n| &n.stats));

    Json(StatusResponse {
        version: state.version.clone(),
        protocol: shardnet_protocol::config::PROTOCOL_ID.to_string(),
        location: state.location.name(),
        totals,
        nodes,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn node_handler(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> axum::response::Response {
    match state
        .nodes
        .iter()
        .find(|n| n.peer_id().to_string() == peer_id)
    {
        Some(node) => Json(NodeStatus::of(node)).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("no node {peer_id}")),
    }
}

/// `GET /blocks/:hash`: asks each node's local query path (cache, then
/// consensus) in turn. Never goes to the network.
async fn block_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> axum::response::Response {
    let Some(hash) = hex::decode(hash.trim_start_matches("0x"))
        .ok()
        .and_then(|bytes| ContentHash::from_slice(&bytes))
    else {
        return error(StatusCode::BAD_REQUEST, "hash must be 32 hex-encoded bytes");
    };

    for node in state.nodes.iter() {
        if let Some(block) = node.get_block(&hash, &state.location).await {
            return Json(BlockResponse {
                hash: block.hash().to_hex(),
                parent_hash: block.header.parent_hash.to_hex(),
                number: block.header.number,
                location: block.location().name(),
                tx_count: block.transactions.len(),
                served_by: node.peer_id().to_string(),
            })
            .into_response();
        }
    }
    error(StatusCode::NOT_FOUND, format!("block {} not found", hash.to_hex()))
}

/// `GET /metrics`: samples every node's counters, then renders the registry.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    let snapshots: Vec<StatsSnapshot> = state.nodes.iter().map(|n| n.stats()).collect();
    let cached_blocks: usize = state.nodes.iter().map(|n| n.caches().blocks.len()).sum();

    state.metrics.nodes.set(state.nodes.len() as i64);
    state.metrics.cached_blocks.set(cached_blocks as i64);
    state.metrics.observe(&metrics::total(&snapshots));

    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            error(StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use shardnet_protocol::config::NodeConfig;
    use shardnet_protocol::network::{Capabilities, MemoryBackend, MemoryNetwork};
    use shardnet_protocol::{Block, Header};
    use tower::ServiceExt;

    struct Fixture {
        state: AppState,
        backends: Vec<Arc<MemoryBackend>>,
    }

    async fn make_fixture(count: usize) -> Fixture {
        let network = MemoryNetwork::new();
        let mut nodes = Vec::new();
        let mut backends = Vec::new();
        for _ in 0..count {
            let backend = Arc::new(MemoryBackend::new());
            let config = NodeConfig {
                solo: true,
                ..NodeConfig::default()
            };
            let node = P2pNode::new(
                config,
                Capabilities::from_host(network.add_peer()),
                backend.clone(),
            );
            node.start().await.unwrap();
            nodes.push(Arc::new(node));
            backends.push(backend);
        }
        Fixture {
            state: AppState {
                version: "0.1.0-test".into(),
                location: Location::Zone(0, 0),
                nodes: Arc::new(nodes),
                metrics: Arc::new(NodeMetrics::new().unwrap()),
            },
            backends,
        }
    }

    fn make_block(number: u64) -> Block {
        Block::new(
            Header {
                parent_hash: ContentHash::ZERO,
                number,
                location: Location::Zone(0, 0),
                state_root: ContentHash::ZERO,
                tx_root: ContentHash::ZERO,
                gas_limit: 8_000_000,
                gas_used: 0,
                timestamp: 1_700_000_000_000,
            },
            Vec::new(),
        )
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let fixture = make_fixture(1).await;
        let router = create_router(fixture.state);
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_lists_every_node() {
        let fixture = make_fixture(3).await;
        let first = fixture.state.nodes[0].clone();
        first.caches().blocks.insert(make_block(1).hash(), make_block(1));

        let router = create_router(fixture.state);
        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.protocol, "/shardnet/1.0.0");
        assert_eq!(resp.location, "zone-0-0");
        assert_eq!(resp.nodes.len(), 3);
        assert_eq!(resp.nodes[0].peer_id, first.peer_id().to_string());
        assert_eq!(resp.nodes[0].state, NodeState::Running);
        assert_eq!(resp.nodes[0].cached_blocks, 1);
        assert_eq!(resp.totals, StatsSnapshot::default());
    }

    #[tokio::test]
    async fn node_endpoint_finds_by_peer_id() {
        let fixture = make_fixture(2).await;
        let second = fixture.state.nodes[1].peer_id().to_string();
        let router = create_router(fixture.state);

        let (status, body) = get(&router, &format!("/nodes/{second}")).await;
        assert_eq!(status, StatusCode::OK);
        let node: NodeStatus = serde_json::from_slice(&body).unwrap();
        assert_eq!(node.peer_id, second);

        let (status, _) = get(&router, "/nodes/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn block_endpoint_falls_back_to_consensus() {
        let fixture = make_fixture(2).await;
        let block = make_block(9);
        fixture.backends[1].insert_block(block.clone());
        let holder = fixture.state.nodes[1].peer_id().to_string();
        let router = create_router(fixture.state);

        let (status, body) = get(&router, &format!("/blocks/{}", block.hash().to_hex())).await;
        assert_eq!(status, StatusCode::OK);
        let resp: BlockResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.number, 9);
        assert_eq!(resp.location, "zone-0-0");
        assert_eq!(resp.tx_count, 0);
        assert_eq!(resp.served_by, holder);
    }

    #[tokio::test]
    async fn block_endpoint_rejects_bad_and_unknown_hashes() {
        let fixture = make_fixture(1).await;
        let router = create_router(fixture.state);

        let (status, _) = get(&router, "/blocks/not-hex").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(&router, "/blocks/abcd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = ContentHash::digest(b"missing").to_hex();
        let (status, _) = get(&router, &format!("/blocks/{missing}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint_samples_node_counters() {
        let fixture = make_fixture(2).await;
        let node = fixture.state.nodes[0].clone();
        let block = make_block(3);
        node.caches().blocks.insert(block.hash(), block.clone());
        node.request_block(block.hash(), Location::Zone(0, 0))
            .await
            .unwrap();

        let router = create_router(fixture.state);
        let (status, body) = get(&router, "/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("shardnet_nodes 2"));
        assert!(text.contains("shardnet_cached_blocks 1"));
        assert!(text.contains("shardnet_cache_hits 1"));
    }
}
