// Copyright (c) 2026 shardnet contributors. MIT License.
// See LICENSE for details.

//! # Shardnet Node
//!
//! Entry point for the `shardnet-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and runs the requested subcommand:
//!
//! - `devnet` : run several nodes over an in-process network, produce
//!   blocks into one shard, and serve the status API
//! - `topic`  : print the gossip topic and DHT routing key of a shard
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod devnet;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use shardnet_protocol::network::{routing_key_for, topic_name, DataKind};
use shardnet_protocol::Location;

use cli::{Commands, ShardnetNodeCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShardnetNodeCli::parse();

    match cli.command {
        Commands::Devnet(args) => {
            logging::init_logging(&cli.log_level, cli.log_format);
            run_devnet(args).await
        }
        Commands::Topic(args) => print_topic(&args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the devnet, the block producer and the API server, then waits
/// for a shutdown signal.
async fn run_devnet(args: cli::DevnetArgs) -> Result<()> {
    let location: Location = args
        .location
        .parse()
        .with_context(|| format!("invalid location {:?}", args.location))?;
    let node_config = config::apply_overrides(config::load_config(args.config.as_deref())?, &args);

    tracing::info!(
        nodes = args.nodes,
        %location,
        api_port = args.api_port,
        cache_capacity = node_config.cache_capacity,
        "starting shardnet devnet"
    );

    let devnet = devnet::Devnet::start(args.nodes, location, node_config)
        .await
        .context("failed to start devnet")?;

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            shardnet_protocol::config::PROTOCOL_ID,
        ),
        location,
        nodes: Arc::new(devnet.nodes().to_vec()),
        metrics: node_metrics,
    };

    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("status API listening on {}", api_addr);

    let interval = std::time::Duration::from_millis(args.block_interval_ms.max(1));

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = devnet.produce(interval) => {}
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, stopping nodes");
        }
    }

    devnet.stop().await;
    tracing::info!("shardnet-node stopped");
    Ok(())
}

/// Prints the gossip topic and DHT routing key for one shard and kind.
fn print_topic(args: &cli::TopicArgs) -> Result<()> {
    let location: Location = args
        .location
        .parse()
        .with_context(|| format!("invalid location {:?}", args.location))?;
    let kind: DataKind = args
        .kind
        .parse()
        .with_context(|| format!("invalid data kind {:?}", args.kind))?;

    println!("topic        {}", topic_name(&location, kind));
    println!("routing key  {}", routing_key_for(&location, kind));
    Ok(())
}

fn print_version() {
    println!("shardnet-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol      {}", shardnet_protocol::config::PROTOCOL_ID);
    println!(
        "codec         v{} (min v{})",
        shardnet_protocol::config::CODEC_VERSION,
        shardnet_protocol::config::MIN_CODEC_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. A handler that fails
/// to install never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
