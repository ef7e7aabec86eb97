//! WebSocket Connection Hub
//!
//! The hub is the single execution context that owns all membership state
//! of this process. Socket tasks and the cluster bridge talk to it through
//! a [`HubHandle`], which enqueues events; the hub consumes them one at a
//! time, so registry mutation and fan-out never interleave.

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::broadcast::BroadcastEngine;
use super::control::{ControlPlane, Dispatch};
use super::messages::ServerMessage;
use super::registry::{Channel, ConnectionId, ConnectionRegistry, Outbound};
use crate::cluster::BridgeHandle;

/// Events processed by the hub
#[derive(Debug)]
pub enum HubEvent {
    /// A handshake completed; register the connection
    Open {
        channel: Channel,
        sender: mpsc::UnboundedSender<Outbound>,
        reply: oneshot::Sender<ConnectionId>,
    },
    /// A frame arrived on a connection
    Inbound { id: ConnectionId, payload: Vec<u8> },
    /// The transport of a connection closed or failed
    Closed { id: ConnectionId },
    /// The cluster bus delivered content for the public channel
    BusDelivery { content: String },
    /// Content the bus will not echo back to this process
    LocalDelivery { content: String },
    /// Report counters
    Stats { reply: oneshot::Sender<HubStats> },
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub public_connections: usize,
    pub admin_connections: usize,
    pub frames_delivered: u64,
    pub frames_skipped: u64,
}

/// Cloneable handle used to talk to the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    /// Register a connection whose handshake just completed
    ///
    /// By the time this returns, the welcome frame is already queued on
    /// `sender` ahead of anything else.
    pub async fn open(
        &self,
        channel: Channel,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<ConnectionId, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Open {
            channel,
            sender,
            reply,
        })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Hand a received frame to the hub
    pub fn inbound(&self, id: &str, payload: Vec<u8>) -> Result<(), HubError> {
        self.send(HubEvent::Inbound {
            id: id.to_string(),
            payload,
        })
    }

    /// Report that a connection's transport is gone
    pub fn close(&self, id: &str) -> Result<(), HubError> {
        self.send(HubEvent::Closed { id: id.to_string() })
    }

    /// Replay content received from the cluster bus
    pub fn deliver_from_bus(&self, content: String) -> Result<(), HubError> {
        self.send(HubEvent::BusDelivery { content })
    }

    /// Broadcast bridged content here because no bus echo will arrive
    pub fn deliver_locally(&self, content: String) -> Result<(), HubError> {
        self.send(HubEvent::LocalDelivery { content })
    }

    /// Fetch current counters
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats { reply })?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Whether the hub task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx.send(event).map_err(|_| HubError::Stopped)
    }
}

/// Owns the registry and runs every handler to completion in turn
pub struct Hub {
    registry: ConnectionRegistry,
    engine: BroadcastEngine,
    control: ControlPlane,
    bridge: Option<BridgeHandle>,
    events: mpsc::UnboundedReceiver<HubEvent>,
}

impl Hub {
    /// Create a hub and the handle used to reach it
    pub fn new() -> (Self, HubHandle) {
        let (tx, events) = mpsc::unbounded_channel();
        let hub = Self {
            registry: ConnectionRegistry::new(),
            engine: BroadcastEngine::new(),
            control: ControlPlane::new(),
            bridge: None,
            events,
        };
        (hub, HubHandle { tx })
    }

    /// Route public-bound content through the cluster bus
    pub fn attach_bridge(&mut self, bridge: BridgeHandle) {
        self.bridge = Some(bridge);
    }

    pub fn is_clustered(&self) -> bool {
        self.bridge.is_some()
    }

    /// Run the hub on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process events until every handle has been dropped
    pub async fn run(mut self) {
        tracing::debug!(clustered = self.is_clustered(), "Hub started");

        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }

        tracing::debug!("Hub stopped");
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Open {
                channel,
                sender,
                reply,
            } => self.on_open(channel, sender, reply),
            HubEvent::Inbound { id, payload } => self.on_inbound(&id, &payload),
            HubEvent::Closed { id } => self.on_closed(&id),
            HubEvent::BusDelivery { content } => {
                let sent = self.engine.broadcast_raw_to_public(&self.registry, &content);
                tracing::debug!(recipients = sent, "Replayed bus message");
            }
            HubEvent::LocalDelivery { content } => {
                let sent = self.engine.broadcast_raw_to_public(&self.registry, &content);
                tracing::debug!(recipients = sent, "Broadcast bridged content locally");
            }
            HubEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn on_open(
        &mut self,
        channel: Channel,
        sender: mpsc::UnboundedSender<Outbound>,
        reply: oneshot::Sender<ConnectionId>,
    ) {
        let id = self.registry.register(channel, sender);
        tracing::info!(connection_id = %id, channel = %channel, "WebSocket connected");

        let welcome = ServerMessage::connected(channel, &id);
        if let Err(e) = self.engine.send_to(&self.registry, &id, &welcome) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to queue welcome frame");
        }

        match channel {
            Channel::Public => {
                self.engine.broadcast_client_count(&self.registry);
            }
            Channel::Admin => {
                let snapshot = ServerMessage::ClientCount {
                    count: self.registry.count(Channel::Public),
                };
                let _ = self.engine.send_to(&self.registry, &id, &snapshot);
            }
        }

        if reply.send(id.clone()).is_err() {
            // The socket task gave up before learning its id.
            self.on_closed(&id);
        }
    }

    fn on_inbound(&mut self, id: &str, payload: &[u8]) {
        match self.registry.channel_of(id) {
            Some(Channel::Admin) => {
                match self.control.handle_admin_message(id, payload, Utc::now()) {
                    Dispatch::Broadcast(message) => self.disseminate(&message),
                    Dispatch::Malformed(_) | Dispatch::Unknown(_) => {}
                }
            }
            Some(Channel::Public) => self.on_public_message(id, payload),
            None => {
                tracing::debug!(connection_id = %id, "Frame from unregistered connection ignored");
            }
        }
    }

    fn on_public_message(&mut self, id: &str, payload: &[u8]) {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Non UTF-8 public message dropped");
                return;
            }
        };

        match &self.bridge {
            Some(bridge) => {
                if bridge.on_local_public_message(text.to_string()).is_err() {
                    self.engine.broadcast_raw_to_public(&self.registry, text);
                }
            }
            None => match serde_json::from_str::<serde_json::Value>(text) {
                Ok(value) => {
                    tracing::debug!(connection_id = %id, message = %value, "Public client message");
                }
                Err(e) => {
                    tracing::debug!(connection_id = %id, error = %e, "Unparseable public message");
                }
            },
        }
    }

    fn on_closed(&mut self, id: &str) {
        match self.registry.unregister(id) {
            Some(channel) => {
                tracing::info!(connection_id = %id, channel = %channel, "WebSocket disconnected");
                if channel == Channel::Public {
                    self.engine.broadcast_client_count(&self.registry);
                }
            }
            None => {
                tracing::trace!(connection_id = %id, "Close for unknown connection ignored");
            }
        }
    }

    /// Deliver a frame bound for the public channel
    ///
    /// Clustered hubs publish it on the bus and broadcast when the bus
    /// delivers it back, or when the bridge hands it back as
    /// `LocalDelivery`. Standalone hubs broadcast directly.
    fn disseminate(&mut self, message: &ServerMessage) {
        let Some(bridge) = &self.bridge else {
            let sent = self.engine.broadcast_to_public(&self.registry, message);
            tracing::debug!(recipients = sent, "Broadcast admin command");
            return;
        };

        match message.to_text() {
            Ok(text) => {
                if let Err(e) = bridge.on_local_public_message(text.clone()) {
                    tracing::warn!(error = %e, "Cluster bridge stopped, broadcasting locally");
                    self.engine.broadcast_raw_to_public(&self.registry, &text);
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize message"),
        }
    }

    fn stats(&self) -> HubStats {
        let delivery = self.engine.stats();
        HubStats {
            public_connections: self.registry.count(Channel::Public),
            admin_connections: self.registry.count(Channel::Admin),
            frames_delivered: delivery.delivered,
            frames_skipped: delivery.skipped,
        }
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hub is not running")]
    Stopped,

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}
