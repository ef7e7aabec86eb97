//! Broadcast Engine
//!
//! Fans frames out to the members of a channel. Every frame is serialized
//! once and the same buffer is queued on each recipient.

use std::sync::Arc;

use super::hub::HubError;
use super::messages::ServerMessage;
use super::registry::{Channel, ConnectionRegistry, Outbound};

/// Delivery counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Frames queued on a connection
    pub delivered: u64,
    /// Recipients skipped because their transport was gone
    pub skipped: u64,
}

/// Disseminates frames over the connections in a registry
#[derive(Debug, Default)]
pub struct BroadcastEngine {
    stats: BroadcastStats,
}

impl BroadcastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }

    /// Send a frame to every open public connection
    ///
    /// Returns the number of connections the frame was queued on.
    pub fn broadcast_to_public(
        &mut self,
        registry: &ConnectionRegistry,
        message: &ServerMessage,
    ) -> usize {
        match encode(message) {
            Some(frame) => self.fan_out(registry, Channel::Public, frame),
            None => 0,
        }
    }

    /// Send already-serialized text to every open public connection
    pub fn broadcast_raw_to_public(&mut self, registry: &ConnectionRegistry, text: &str) -> usize {
        self.fan_out(registry, Channel::Public, Arc::from(text))
    }

    /// Tell every admin how many public viewers are connected
    pub fn broadcast_client_count(&mut self, registry: &ConnectionRegistry) -> usize {
        let message = ServerMessage::ClientCount {
            count: registry.count(Channel::Public),
        };
        match encode(&message) {
            Some(frame) => self.fan_out(registry, Channel::Admin, frame),
            None => 0,
        }
    }

    /// Send a frame to a single connection
    pub fn send_to(
        &mut self,
        registry: &ConnectionRegistry,
        id: &str,
        message: &ServerMessage,
    ) -> Result<(), HubError> {
        let handle = registry.get(id).ok_or(HubError::ConnectionNotFound)?;
        let frame = encode(message).ok_or(HubError::SendFailed)?;

        match handle.sender.send(frame) {
            Ok(()) => {
                self.stats.delivered += 1;
                Ok(())
            }
            Err(_) => {
                self.stats.skipped += 1;
                Err(HubError::SendFailed)
            }
        }
    }

    fn fan_out(&mut self, registry: &ConnectionRegistry, channel: Channel, frame: Outbound) -> usize {
        let mut sent = 0;

        for (id, handle) in registry.handles_in(channel) {
            if !handle.is_ready() {
                tracing::trace!(connection_id = %id, "Skipping connection that is not ready");
                self.stats.skipped += 1;
                continue;
            }
            if handle.sender.send(Arc::clone(&frame)).is_ok() {
                sent += 1;
            } else {
                tracing::debug!(connection_id = %id, "Send raced connection close");
                self.stats.skipped += 1;
            }
        }

        self.stats.delivered += sent as u64;

        if sent > 0 {
            tracing::trace!(channel = %channel, recipients = sent, "Broadcast frame");
        }
        sent
    }
}

fn encode(message: &ServerMessage) -> Option<Outbound> {
    match message.to_text() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::messages::CommandKind;
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn parse(frame: Outbound) -> Value {
        serde_json::from_str(&frame).unwrap()
    }

    #[test]
    fn test_broadcast_reaches_public_only() {
        let mut registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();

        let (ptx1, mut prx1) = mpsc::unbounded_channel();
        let (ptx2, mut prx2) = mpsc::unbounded_channel();
        let (atx, mut arx) = mpsc::unbounded_channel();
        registry.register(Channel::Public, ptx1);
        registry.register(Channel::Public, ptx2);
        registry.register(Channel::Admin, atx);

        let msg = ServerMessage::command(CommandKind::MessageToAll, None, "admin", Utc::now());
        assert_eq!(engine.broadcast_to_public(&registry, &msg), 2);

        assert_eq!(parse(prx1.try_recv().unwrap())["type"], "messageToAll");
        assert_eq!(parse(prx2.try_recv().unwrap())["type"], "messageToAll");
        assert!(arx.try_recv().is_err());
    }

    #[test]
    fn test_closed_connection_is_skipped() {
        let mut registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();

        let (tx_gone, rx_gone) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        registry.register(Channel::Public, tx_gone);
        registry.register(Channel::Public, tx_live);
        drop(rx_gone);

        assert_eq!(engine.broadcast_raw_to_public(&registry, "hello"), 1);
        assert_eq!(&*rx_live.try_recv().unwrap(), "hello");
        assert_eq!(engine.stats(), BroadcastStats { delivered: 1, skipped: 1 });
    }

    #[test]
    fn test_frame_is_shared_between_recipients() {
        let mut registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(Channel::Public, tx1);
        registry.register(Channel::Public, tx2);

        engine.broadcast_raw_to_public(&registry, "same");
        let a = rx1.try_recv().unwrap();
        let b = rx2.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_client_count_goes_to_admins() {
        let mut registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();

        let (atx, mut arx) = mpsc::unbounded_channel();
        let (ptx, mut prx) = mpsc::unbounded_channel();
        registry.register(Channel::Admin, atx);
        registry.register(Channel::Public, ptx);

        assert_eq!(engine.broadcast_client_count(&registry), 1);

        let frame = parse(arx.try_recv().unwrap());
        assert_eq!(frame["type"], "clientCount");
        assert_eq!(frame["count"], 1);
        assert!(prx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();

        let result = engine.send_to(&registry, "missing", &ServerMessage::ClientCount { count: 0 });
        assert!(matches!(result, Err(HubError::ConnectionNotFound)));
    }

    #[test]
    fn test_send_to_closed_connection() {
        let mut registry = ConnectionRegistry::new();
        let mut engine = BroadcastEngine::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(Channel::Public, tx);
        drop(rx);

        let result = engine.send_to(&registry, &id, &ServerMessage::connected(Channel::Public, &id));
        assert!(matches!(result, Err(HubError::SendFailed)));
    }
}
