//! Pagecast Relay
//!
//! Run with: cargo run --bin pagecast -- --config pagecast.toml
//!
//! Without `--config` the relay looks for `pagecast.toml` in the usual
//! locations and falls back to defaults. Any setting can be overridden with
//! `PAGECAST_*` environment variables; `REDIS_URL` turns on clustering.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pagecast::api::{serve, AppState};
use pagecast::cluster::{ClusterBridge, RedisBus};
use pagecast::config::Config;
use pagecast::logging;
use pagecast::websocket::Hub;

#[derive(Parser)]
#[command(name = "pagecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time WebSocket broadcast relay")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", pagecast::config::generate_default_config());
        return Ok(());
    }

    let (config, source) = match args.config {
        Some(path) => {
            let config = Config::load_with_env(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            (config, Some(path))
        }
        None => Config::load_default().context("Failed to load default config file")?,
    };

    logging::init(&config.logging);
    match &source {
        Some(path) => tracing::info!("Loaded config from {:?}", path),
        None => tracing::info!("No config file found, using defaults with environment overrides"),
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!("Starting Pagecast relay v{}", env!("CARGO_PKG_VERSION"));

    let (mut hub, handle) = Hub::new();

    if config.cluster.enabled {
        let pod = config.cluster.pod_name();
        let backend = RedisBus::new(&config.cluster.redis_url, config.cluster.reconnect_backoff())
            .context("Failed to create Redis client")?;

        let bridge = ClusterBridge::new(&config.cluster, pod, Arc::new(backend));
        tracing::info!(
            pod = bridge.pod(),
            topic = %config.cluster.topic,
            "Clustering enabled over Redis"
        );

        hub.attach_bridge(bridge.spawn(handle.clone()));
    } else {
        tracing::info!("Running in single-process mode (set REDIS_URL to enable clustering)");
    }

    let hub_task = hub.spawn();

    let state = AppState::new(handle, &config);
    serve(state, &config.server).await?;

    hub_task.abort();
    tracing::info!("Pagecast relay stopped");

    Ok(())
}
