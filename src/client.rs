//! WebSocket client helpers
//!
//! Thin wrapper around `tokio-tungstenite` used by the admin link and the
//! CLI to reach a relay.

use anyhow::{Context, Result};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::websocket::{ADMIN_PATH, PUBLIC_PATH};

/// Concrete WebSocket stream type
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// URL of the public channel under `base` (e.g. `ws://localhost:8080`)
pub fn public_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), PUBLIC_PATH)
}

/// URL of the admin channel under `base`, carrying `token`
pub fn admin_url(base: &str, token: &str) -> String {
    format!(
        "{}{}?token={}",
        base.trim_end_matches('/'),
        ADMIN_PATH,
        urlencoding::encode(token)
    )
}

/// Open a WebSocket connection
pub async fn connect(url: &str) -> Result<WsStream> {
    let (stream, response) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", redact(url)))?;

    tracing::debug!(url = %redact(url), status = %response.status(), "WebSocket connected");
    Ok(stream)
}

/// Hide the admin token when logging a URL
fn redact(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, _)) => format!("{}token=***", head),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("ws://localhost:8080"), "ws://localhost:8080/public");
        assert_eq!(public_url("ws://localhost:8080/"), "ws://localhost:8080/public");
    }

    #[test]
    fn test_admin_url_encodes_token() {
        assert_eq!(
            admin_url("ws://relay:8080", "a b&c"),
            "ws://relay:8080/admin?token=a%20b%26c"
        );
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("ws://relay/admin?token=secret"),
            "ws://relay/admin?token=***"
        );
        assert_eq!(redact("ws://relay/public"), "ws://relay/public");
    }
}
