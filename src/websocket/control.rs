//! Admin Control Plane
//!
//! Validates commands received on the admin channel and turns them into
//! attributed frames for the public channel.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::messages::{CommandKind, ServerMessage};

/// What to do with one admin frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Fan this frame out to the public channel
    Broadcast(ServerMessage),
    /// Frame was not valid JSON
    Malformed(String),
    /// Valid JSON with a `type` we do not handle
    Unknown(Option<String>),
}

/// Turns raw admin frames into dispatch decisions
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlPlane;

impl ControlPlane {
    pub fn new() -> Self {
        Self
    }

    /// Handle one frame sent by the admin connection `admin_id`
    ///
    /// The sender is attributed by the id the registry bound at handshake
    /// time; an `adminClientId` inside the frame is never consulted.
    pub fn handle_admin_message(&self, admin_id: &str, raw: &[u8], now: DateTime<Utc>) -> Dispatch {
        let document: Value = match serde_json::from_slice(raw) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    connection_id = %admin_id,
                    error = %e,
                    "Discarding malformed admin message"
                );
                return Dispatch::Malformed(e.to_string());
            }
        };

        let kind = document.get("type").and_then(Value::as_str);
        let Some(command) = kind.and_then(CommandKind::from_wire) else {
            tracing::info!(
                connection_id = %admin_id,
                kind = ?kind,
                "Unknown admin message type"
            );
            return Dispatch::Unknown(kind.map(str::to_string));
        };

        let payload = document.get("payload").cloned();
        tracing::debug!(
            connection_id = %admin_id,
            kind = command.as_str(),
            "Admin command accepted"
        );

        Dispatch::Broadcast(ServerMessage::command(command, payload, admin_id, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatch(raw: &str) -> Dispatch {
        ControlPlane::new().handle_admin_message("admin-conn-1", raw.as_bytes(), Utc::now())
    }

    fn frame(dispatch: Dispatch) -> Value {
        match dispatch {
            Dispatch::Broadcast(msg) => serde_json::to_value(msg).unwrap(),
            other => panic!("Expected Broadcast, got {:?}", other),
        }
    }

    #[test]
    fn test_page_action_is_attributed() {
        let out = frame(dispatch(r#"{"type":"pageAction","payload":{"action":"updateNews"}}"#));

        assert_eq!(out["type"], "pageAction");
        assert_eq!(out["payload"], json!({"action": "updateNews"}));
        assert_eq!(out["adminClientId"], "admin-conn-1");
        assert!(chrono::DateTime::parse_from_rfc3339(out["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_message_to_all_passthrough() {
        let out = frame(dispatch(r#"{"type":"messageToAll","payload":"hello viewers"}"#));
        assert_eq!(out["type"], "messageToAll");
        assert_eq!(out["payload"], "hello viewers");
    }

    #[test]
    fn test_spoofed_admin_id_is_ignored() {
        let out = frame(dispatch(
            r#"{"type":"pageAction","adminClientId":"someone-else","payload":{"adminClientId":"someone-else"}}"#,
        ));

        assert_eq!(out["adminClientId"], "admin-conn-1");
        // The payload is passed through untouched; only the top-level field is authoritative.
        assert_eq!(out["payload"]["adminClientId"], "someone-else");
    }

    #[test]
    fn test_malformed_json_is_discarded() {
        assert!(matches!(dispatch("{not json"), Dispatch::Malformed(_)));
        assert!(matches!(dispatch(""), Dispatch::Malformed(_)));
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            dispatch(r#"{"type":"shutdown"}"#),
            Dispatch::Unknown(Some("shutdown".to_string()))
        );
    }

    #[test]
    fn test_missing_or_non_string_type() {
        assert_eq!(dispatch(r#"{"payload":1}"#), Dispatch::Unknown(None));
        assert_eq!(dispatch(r#"{"type":7}"#), Dispatch::Unknown(None));
        assert_eq!(dispatch("42"), Dispatch::Unknown(None));
        assert_eq!(dispatch("[1,2]"), Dispatch::Unknown(None));
    }
}
