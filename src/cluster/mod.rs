//! Cluster Replication
//!
//! Connects relay processes through a shared publish/subscribe bus so that
//! public broadcasts converge across the cluster.
//!
//! ## Architecture
//!
//! - **ClusterBridge**: publisher and subscriber tasks between the hub and the bus
//! - **BusBackend**: the publish/subscribe transport (Redis in production)
//! - **ClusterMessage**: the envelope carried on the bus topic
//!
//! Delivery is best-effort and at-most-once. The bus hands every message
//! back to its publisher too; that echo is how the publishing process
//! reaches its own public viewers.

mod bridge;
mod memory;
mod redis_bus;

pub use bridge::{BridgeHandle, ClusterBridge};
pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bus topic
pub const DEFAULT_TOPIC: &str = "GLOBAL_BROADCAST";

/// Envelope published on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMessage {
    /// Identity of the process that observed the content
    #[serde(rename = "from_pod")]
    pub origin_pod: String,
    /// Raw text to broadcast to public viewers
    pub content: String,
}

impl ClusterMessage {
    pub fn new(origin_pod: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            origin_pod: origin_pod.into(),
            content: content.into(),
        }
    }

    pub fn encode(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> Result<Self, BusError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Stream of raw payloads received on a subscribed topic
///
/// The stream ends when the subscription is lost.
pub type BusStream = BoxStream<'static, String>;

/// A publish/subscribe transport
#[async_trait]
pub trait BusBackend: Send + Sync {
    /// Publish a payload on `topic`
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Open a fresh subscription to `topic`
    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Errors from the cluster bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid bus payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Cluster bridge stopped")]
    BridgeStopped,
}
