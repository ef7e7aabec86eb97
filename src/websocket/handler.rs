//! WebSocket Handler
//!
//! Routes upgrade requests through the [`ChannelRouter`](super::ChannelRouter)
//! and drives each accepted connection's socket until it closes.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        OriginalUri, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::hub::HubHandle;
use super::registry::{Channel, ConnectionState, Outbound};
use super::router::RouteDecision;
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// Mounted as the router fallback so that every path goes through channel
/// routing. Rejected requests get a bare status and `Connection: close`;
/// no handshake framing is ever sent for them.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let channel = match state.router.resolve_upgrade(uri.path(), uri.query()) {
        RouteDecision::Accept(channel) => channel,
        RouteDecision::Reject(rejection) => {
            let status = rejection.status();
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!(path = %uri.path(), "Unauthorized admin connection attempt");
            } else {
                tracing::debug!(path = %uri.path(), "Upgrade request for unknown path");
            }
            return (status, [(header::CONNECTION, "close")]).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(channel = %channel, error = %rejection, "Not a WebSocket upgrade");
            return rejection.into_response();
        }
    };

    let hub = state.hub.clone();
    let idle_timeout = state.server.idle_timeout();

    ws.max_message_size(state.server.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, channel, hub, idle_timeout))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, channel: Channel, hub: HubHandle, idle_timeout: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let mut state = ConnectionState::Connecting;

    // Channel the hub uses to queue frames for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let connection_id = match hub.open(channel, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register WebSocket connection");
            let _ = sender.close().await;
            return;
        }
    };
    state = state.accept();

    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    while state.is_open() {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(frame) => {
                    if sender.send(Message::Text(frame.to_string())).await.is_err() {
                        tracing::debug!(
                            connection_id = %connection_id,
                            "WebSocket send failed, closing connection"
                        );
                        state = state.teardown();
                    } else {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                    }
                }
                None => state = state.teardown(),
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(message)) => {
                    idle.as_mut().reset(Instant::now() + idle_timeout);
                    if !handle_ws_message(&hub, &connection_id, message) {
                        state = state.teardown();
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    state = state.teardown();
                }
                None => state = state.teardown(),
            },
            () = &mut idle => {
                tracing::debug!(connection_id = %connection_id, "Closing idle connection");
                let _ = sender.send(Message::Close(None)).await;
                state = state.teardown();
            }
        }
    }

    // Cleanup: unregister from hub
    let _ = hub.close(&connection_id);
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(hub: &HubHandle, connection_id: &str, message: Message) -> bool {
    match message {
        Message::Text(text) => hub.inbound(connection_id, text.into_bytes()).is_ok(),
        Message::Binary(data) => hub.inbound(connection_id, data).is_ok(),
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}
