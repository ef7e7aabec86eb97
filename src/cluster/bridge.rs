//! Cluster Bridge
//!
//! Runs two tasks between the hub and the bus. The publisher drains a
//! queue of public-bound content and publishes it in order; the subscriber
//! holds a subscription open, retrying after a fixed backoff whenever it
//! fails or drops, and replays every delivery into the hub.
//!
//! Local viewers normally receive content when the bus echoes it back.
//! Whenever that echo cannot arrive, because the publish failed or this
//! process holds no live subscription, the publisher hands the content
//! straight back to the hub instead.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{BusBackend, BusError, ClusterMessage};
use crate::config::ClusterConfig;
use crate::websocket::{HubError, HubHandle};

/// Replicates public traffic across processes
pub struct ClusterBridge {
    pod: String,
    topic: String,
    backoff: Duration,
    backend: Arc<dyn BusBackend>,
    subscribed: Arc<AtomicBool>,
}

/// Queue into the bridge's publisher task
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<String>,
    subscribed: Arc<AtomicBool>,
}

impl BridgeHandle {
    /// Publish content observed on this process to the whole cluster
    pub fn on_local_public_message(&self, content: String) -> Result<(), BusError> {
        self.tx.send(content).map_err(|_| BusError::BridgeStopped)
    }

    /// Whether the subscriber currently holds a live subscription
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }
}

impl ClusterBridge {
    /// Create a bridge for the process identified by `pod`
    pub fn new(config: &ClusterConfig, pod: impl Into<String>, backend: Arc<dyn BusBackend>) -> Self {
        Self {
            pod: pod.into(),
            topic: config.topic.clone(),
            backoff: config.reconnect_backoff(),
            backend,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    /// Start the publisher and subscriber tasks
    pub fn spawn(self, hub: HubHandle) -> BridgeHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscribed = Arc::clone(&self.subscribed);
        let bridge = Arc::new(self);

        tracing::info!(
            pod = %bridge.pod,
            topic = %bridge.topic,
            backend = bridge.backend.name(),
            "Starting cluster bridge"
        );

        tokio::spawn(Arc::clone(&bridge).run_publisher(rx, hub.clone()));
        tokio::spawn(bridge.run_subscriber(hub));

        BridgeHandle { tx, subscribed }
    }

    /// Replay one bus payload into the local hub
    ///
    /// Undecodable payloads are logged and dropped. Fails only when the hub
    /// is gone.
    pub fn on_bus_message(&self, hub: &HubHandle, payload: &str) -> Result<(), HubError> {
        match ClusterMessage::decode(payload) {
            Ok(message) => {
                tracing::debug!(
                    pod = %self.pod,
                    from_pod = %message.origin_pod,
                    "Received bus message"
                );
                hub.deliver_from_bus(message.content)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable bus message");
                Ok(())
            }
        }
    }

    async fn run_publisher(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<String>, hub: HubHandle) {
        while let Some(content) = rx.recv().await {
            // No echo comes back to a process without a subscription.
            let echo_expected = self.subscribed.load(Ordering::SeqCst);

            let message = ClusterMessage::new(self.pod.as_str(), content);
            let result = match message.encode() {
                Ok(payload) => self.backend.publish(&self.topic, payload).await,
                Err(e) => Err(e),
            };

            let deliver_here = match result {
                Ok(()) if echo_expected => false,
                Ok(()) => {
                    tracing::debug!(pod = %self.pod, "Not subscribed, delivering locally");
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        pod = %self.pod,
                        error = %e,
                        "Bus publish failed, delivering locally only"
                    );
                    true
                }
            };

            if deliver_here && hub.deliver_locally(message.content).is_err() {
                break;
            }
        }
        tracing::debug!(pod = %self.pod, "Bus publisher stopped");
    }

    async fn run_subscriber(self: Arc<Self>, hub: HubHandle) {
        loop {
            match self.backend.subscribe(&self.topic).await {
                Ok(mut stream) => {
                    self.subscribed.store(true, Ordering::SeqCst);
                    tracing::info!(pod = %self.pod, topic = %self.topic, "Subscribed to bus");
                    while let Some(payload) = stream.next().await {
                        if self.on_bus_message(&hub, &payload).is_err() {
                            self.subscribed.store(false, Ordering::SeqCst);
                            tracing::debug!(pod = %self.pod, "Hub stopped, leaving bus");
                            return;
                        }
                    }
                    self.subscribed.store(false, Ordering::SeqCst);
                    tracing::warn!(pod = %self.pod, "Bus subscription lost");
                }
                Err(e) => {
                    self.subscribed.store(false, Ordering::SeqCst);
                    tracing::warn!(
                        pod = %self.pod,
                        error = %e,
                        retry_ms = self.backoff.as_millis() as u64,
                        "Bus subscribe failed"
                    );
                }
            }

            if hub.is_closed() {
                return;
            }
            tokio::time::sleep(self.backoff).await;
        }
    }
}
