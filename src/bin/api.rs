//! Pagecast News API
//!
//! Run with: cargo run --bin pagecast-api -- --config pagecast.toml
//!
//! Serves `GET /api/news` and turns `POST /api/news/webhook` calls into
//! `pageAction` commands sent over a persistent admin connection to the
//! relay.
//!
//! # Configuration
//!
//! Environment variables:
//! - `PAGECAST_NEWS_PORT`: Port to listen on (default: 3000)
//! - `PAGECAST_RELAY_URL`: Relay base URL (default: ws://localhost:8080)
//! - `PAGECAST_ADMIN_TOKEN`: Admin token for the relay
//! - `RUST_LOG`: Log filter (overrides `logging.level`)

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use pagecast::api::shutdown_signal;
use pagecast::client;
use pagecast::config::Config;
use pagecast::logging;
use pagecast::news::{build_router, AdminLink, NewsData, NewsState};

#[derive(Parser)]
#[command(name = "pagecast-api")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "News API that triggers viewer refreshes on the Pagecast relay")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

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

    tracing::info!("Starting Pagecast news API v{}", env!("CARGO_PKG_VERSION"));

    let relay = client::admin_url(&config.news.relay_url, &config.admin.token);
    let link = AdminLink::spawn(relay, config.news.reconnect_delay());

    let state = NewsState::new(NewsData::from(&config.news), Arc::new(link));

    let addr = config.news.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("News API listening on http://{}", addr);
    tracing::info!("GET  /api/news         - Get news data");
    tracing::info!("POST /api/news/webhook - Trigger news update");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("News API stopped");
    Ok(())
}
