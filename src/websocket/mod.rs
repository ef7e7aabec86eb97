//! WebSocket Relay Core
//!
//! Relays admin commands to public viewers in real time.
//!
//! ## Architecture
//!
//! - **Hub**: single task owning all membership state; consumes events in order
//! - **ConnectionRegistry**: live connections per channel, identity assignment
//! - **ChannelRouter**: path + token check, decided before the handshake completes
//! - **BroadcastEngine**: fan-out of serialized frames, admin client counts
//! - **ControlPlane**: admin command validation and attribution
//! - **Handler**: WebSocket upgrade and per-connection socket loop
//! - **Messages**: wire frame formats
//!
//! ## Usage
//!
//! Viewers connect to `/public`; admins connect to `/admin?token=<secret>`
//! and send commands:
//!
//! ```javascript
//! const admin = new WebSocket('ws://localhost:8080/admin?token=admin-secret-token');
//!
//! admin.onopen = () => {
//!   admin.send(JSON.stringify({type: 'pageAction', payload: {action: 'updateNews'}}));
//! };
//!
//! const viewer = new WebSocket('ws://localhost:8080/public');
//! viewer.onmessage = (event) => console.log(JSON.parse(event.data));
//! ```

mod broadcast;
mod control;
mod handler;
mod hub;
mod messages;
mod registry;
mod router;

pub use broadcast::{BroadcastEngine, BroadcastStats};
pub use control::{ControlPlane, Dispatch};
pub use handler::websocket_handler;
pub use hub::{Hub, HubError, HubEvent, HubHandle, HubStats};
pub use messages::{iso_timestamp, AdminCommand, CommandKind, ServerMessage};
pub use registry::{Channel, ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionState, Outbound};
pub use router::{ChannelRouter, Rejection, RouteDecision, ADMIN_PATH, PUBLIC_PATH};
