//! WebSocket Message Types
//!
//! Defines the frames exchanged between the relay and its public viewers
//! and admins.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::Channel;

/// Admin command kinds that are fanned out to the public channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    /// Tell viewers' pages to perform an action (e.g. reload the news)
    PageAction,
    /// Free-form message shown to every viewer
    MessageToAll,
}

impl CommandKind {
    /// Parse the wire `type` value of an admin command
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "pageAction" => Some(Self::PageAction),
            "messageToAll" => Some(Self::MessageToAll),
            _ => None,
        }
    }

    /// Wire `type` value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageAction => "pageAction",
            Self::MessageToAll => "messageToAll",
        }
    }
}

/// Command sent by an admin client
///
/// The relay itself never deserializes into this type (it reads the raw
/// document so that unknown types can be reported); it is used by the
/// admin-side clients to build well-formed commands.
#[derive(Debug, Clone, Serialize)]
pub struct AdminCommand {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub payload: Value,
}

impl AdminCommand {
    pub fn new(kind: CommandKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// The command the news webhook issues on every call
    pub fn update_news(now: DateTime<Utc>) -> Self {
        Self::new(
            CommandKind::PageAction,
            serde_json::json!({
                "action": "updateNews",
                "timestamp": iso_timestamp(now),
            }),
        )
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Welcome frame, always the first frame on a connection
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Human-readable greeting
        message: String,
        /// Server-assigned connection identifier
        client_id: String,
    },
    /// Number of public viewers, sent to admins
    ClientCount {
        /// Current public connection count
        count: usize,
    },
    /// Admin page action, fanned out to public viewers
    #[serde(rename_all = "camelCase")]
    PageAction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        /// Id of the admin connection that issued the command
        admin_client_id: String,
        /// ISO-8601 UTC instant the relay accepted the command
        timestamp: String,
    },
    /// Admin broadcast message, fanned out to public viewers
    #[serde(rename_all = "camelCase")]
    MessageToAll {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        admin_client_id: String,
        timestamp: String,
    },
}

impl ServerMessage {
    /// Welcome frame for a freshly accepted connection
    pub fn connected(channel: Channel, client_id: &str) -> Self {
        Self::Connected {
            message: format!("Connected to {} channel", channel),
            client_id: client_id.to_string(),
        }
    }

    /// Attributed admin command frame
    pub fn command(
        kind: CommandKind,
        payload: Option<Value>,
        admin_client_id: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let admin_client_id = admin_client_id.to_string();
        let timestamp = iso_timestamp(at);
        match kind {
            CommandKind::PageAction => Self::PageAction {
                payload,
                admin_client_id,
                timestamp,
            },
            CommandKind::MessageToAll => Self::MessageToAll {
                payload,
                admin_client_id,
                timestamp,
            },
        }
    }

    /// Serialize to the text carried in a WebSocket frame
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format an instant the way browsers' `Date.toISOString()` does
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
