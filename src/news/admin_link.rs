//! Admin Link
//!
//! Keeps one admin-channel connection to the relay open on behalf of the
//! news API, reconnecting after a fixed delay whenever it drops.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::client;
use crate::websocket::AdminCommand;

/// Something that can deliver admin commands to the relay
pub trait CommandSink: Send + Sync {
    fn send_command(&self, command: &AdminCommand) -> Result<(), LinkError>;
}

/// Errors from the admin link
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Admin link is not connected to the relay")]
    NotConnected,

    #[error("Admin link task stopped")]
    Stopped,

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistent admin connection to the relay
#[derive(Debug, Clone)]
pub struct AdminLink {
    tx: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl AdminLink {
    /// Start maintaining a connection to `url`
    pub fn spawn(url: String, reconnect_delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_link(url, reconnect_delay, rx, Arc::clone(&connected)));

        Self { tx, connected }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl CommandSink for AdminLink {
    fn send_command(&self, command: &AdminCommand) -> Result<(), LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }
        let text = serde_json::to_string(command)?;
        self.tx.send(text).map_err(|_| LinkError::Stopped)?;

        tracing::info!(kind = command.kind.as_str(), "Sent admin command to relay");
        Ok(())
    }
}

async fn run_link(
    url: String,
    reconnect_delay: Duration,
    mut rx: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match client::connect(&url).await {
            Ok(stream) => {
                tracing::info!("Connected to relay admin channel");
                connected.store(true, Ordering::SeqCst);

                let (mut write, mut read) = stream.split();
                loop {
                    tokio::select! {
                        command = rx.recv() => match command {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    tracing::warn!(error = %e, "Failed to send admin command");
                                    break;
                                }
                            }
                            None => {
                                // Every AdminLink handle is gone.
                                connected.store(false, Ordering::SeqCst);
                                let _ = write.close().await;
                                return;
                            }
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                tracing::debug!(frame = %text, "Received from relay");
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "Admin link error");
                                break;
                            }
                        },
                    }
                }

                connected.store(false, Ordering::SeqCst);
                tracing::warn!(
                    retry_secs = reconnect_delay.as_secs(),
                    "Disconnected from relay admin channel, reconnecting"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_secs = reconnect_delay.as_secs(),
                    "Could not reach relay admin channel"
                );
            }
        }

        tokio::time::sleep(reconnect_delay).await;
    }
}
