//! Application State
//!
//! Shared state accessible by the relay's HTTP and WebSocket handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::time::Instant;

use crate::config::{Config, ServerConfig};
use crate::websocket::{ChannelRouter, HubHandle};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to this process's connection hub
    pub hub: HubHandle,
    /// Decides which channel an upgrade request joins
    pub router: ChannelRouter,
    /// Listener and connection settings
    pub server: ServerConfig,
    /// Identity of this process
    pub pod: String,
    /// Whether public traffic is replicated over the bus
    pub clustered: bool,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Build state from the startup configuration
    pub fn new(hub: HubHandle, config: &Config) -> Self {
        Self {
            hub,
            router: ChannelRouter::new(config.admin.token.clone()),
            server: config.server.clone(),
            pod: config.cluster.pod_name(),
            clustered: config.cluster.enabled,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
