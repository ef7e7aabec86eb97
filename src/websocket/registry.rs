//! Connection Registry
//!
//! Tracks live connections per channel and hands out their identities.
//! The registry is owned by the hub task; nothing else mutates it, so it
//! carries no locks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// A pre-serialized text frame queued for one connection
pub type Outbound = Arc<str>;

/// Logical partition of connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Unauthenticated viewers; receive broadcasts only
    Public,
    /// Token-authenticated operators; issue commands, receive counts
    Admin,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Public => write!(f, "public"),
            Channel::Admin => write!(f, "admin"),
        }
    }
}

/// Lifecycle of a single connection
///
/// `Connecting` until the router accepts the handshake, `Open` until the
/// transport goes away, then `Closed` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    /// Handshake accepted
    pub fn accept(self) -> Self {
        match self {
            ConnectionState::Connecting => ConnectionState::Open,
            other => other,
        }
    }

    /// Handshake rejected
    pub fn reject(self) -> Self {
        match self {
            ConnectionState::Connecting => ConnectionState::Closed,
            other => other,
        }
    }

    /// Transport closed or errored
    pub fn teardown(self) -> Self {
        ConnectionState::Closed
    }

    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

/// Handle for sending frames to a specific connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel the connection was admitted to
    pub channel: Channel,
    /// Outbound queue drained by the connection's socket task
    pub sender: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Whether the socket task is still draining this connection's queue
    pub fn is_ready(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Live connections of one process, grouped by channel
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    members: HashMap<Channel, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection in `channel` and return its fresh id
    pub fn register(
        &mut self,
        channel: Channel,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> ConnectionId {
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.connections.contains_key(&candidate) {
                break candidate;
            }
        };

        self.connections
            .insert(id.clone(), ConnectionHandle { channel, sender });
        self.members.entry(channel).or_default().insert(id.clone());

        id
    }

    /// Remove a connection
    ///
    /// Unknown ids are ignored. Returns the channel the connection belonged
    /// to when something was actually removed.
    pub fn unregister(&mut self, id: &str) -> Option<Channel> {
        let handle = self.connections.remove(id)?;
        if let Some(members) = self.members.get_mut(&handle.channel) {
            members.remove(id);
        }
        Some(handle.channel)
    }

    /// Snapshot of the ids currently registered in `channel`
    pub fn members_of(&self, channel: Channel) -> Vec<ConnectionId> {
        self.members
            .get(&channel)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of connections registered in `channel`
    pub fn count(&self, channel: Channel) -> usize {
        self.members.get(&channel).map(HashSet::len).unwrap_or(0)
    }

    /// Look up a connection by id
    pub fn get(&self, id: &str) -> Option<&ConnectionHandle> {
        self.connections.get(id)
    }

    /// Channel a connection belongs to
    pub fn channel_of(&self, id: &str) -> Option<Channel> {
        self.connections.get(id).map(|handle| handle.channel)
    }

    /// Iterate the handles of every connection in `channel`
    pub fn handles_in(&self, channel: Channel) -> impl Iterator<Item = (&str, &ConnectionHandle)> {
        self.members
            .get(&channel)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id).map(|h| (id.as_str(), h)))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
