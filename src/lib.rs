//! # Pagecast
//!
//! Real-time WebSocket broadcast relay. Viewers join a public channel,
//! operators join an authenticated admin channel, and every admin command is
//! fanned out to all viewers. Several relay processes can share one Redis
//! pub/sub topic so a command reaches viewers on every process.
//!
//! ## Modules
//!
//! - [`websocket`]: Hub, registry, routing, broadcast and control plane
//! - [`cluster`]: Cross-process replication over a pub/sub bus
//! - [`api`]: HTTP surface of the relay (upgrade handler, health)
//! - [`news`]: News API that triggers viewer refreshes through the admin channel
//! - [`client`]: WebSocket client helpers
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagecast::api::{serve, AppState};
//! use pagecast::config::Config;
//! use pagecast::websocket::Hub;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     let (hub, handle) = Hub::new();
//!     hub.spawn();
//!
//!     serve(AppState::new(handle, &config), &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod cluster;
pub mod config;
pub mod logging;
pub mod news;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState};

pub use cluster::{BusBackend, BusError, ClusterBridge, ClusterMessage, InMemoryBus, RedisBus};

pub use config::{
    AdminConfig, ClusterConfig, Config, ConfigError, LoggingConfig, NewsConfig, ServerConfig,
};

pub use news::{AdminLink, NewsData, NewsState};

pub use websocket::{
    AdminCommand, BroadcastEngine, Channel, ChannelRouter, CommandKind, ConnectionRegistry,
    ControlPlane, Hub, HubError, HubHandle, ServerMessage, websocket_handler,
};
