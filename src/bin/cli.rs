//! Pagecast CLI
//!
//! Operator tool for a running relay:
//! - Send admin commands
//! - Watch the public channel
//! - Trigger the news webhook
//! - Check relay status

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use pagecast::client::{self, WsStream};
use pagecast::websocket::{AdminCommand, CommandKind};

#[derive(Parser)]
#[command(name = "pagecast-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate a Pagecast broadcast relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Relay base URL
    #[arg(long, default_value = "ws://localhost:8080", env = "PAGECAST_RELAY_URL", global = true)]
    pub relay_url: String,

    /// Admin token for the relay
    #[arg(long, default_value = "admin-secret-token", env = "PAGECAST_ADMIN_TOKEN", global = true)]
    pub token: String,

    /// News API base URL
    #[arg(long, default_value = "http://localhost:3000", global = true)]
    pub api_url: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send one admin command to every viewer
    Send {
        /// Command type
        #[arg(value_enum)]
        kind: Kind,
        /// Payload as JSON (e.g. '{"action":"updateNews"}')
        payload: String,
        /// Seconds to wait for the relay welcome frame
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Print every frame delivered on the public channel
    Watch {
        /// Connect to the admin channel instead
        #[arg(long)]
        admin: bool,
    },

    /// Call the news API webhook
    Webhook {
        /// Request body sent to the webhook
        #[arg(short, long, default_value = "{}")]
        body: String,
    },

    /// Show relay health
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Kind {
    PageAction,
    MessageToAll,
}

impl From<Kind> for CommandKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::PageAction => CommandKind::PageAction,
            Kind::MessageToAll => CommandKind::MessageToAll,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Send {
            kind,
            payload,
            timeout,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let command = AdminCommand::new(kind.into(), payload);

            let url = client::admin_url(&cli.relay_url, &cli.token);
            let mut stream = match client::connect(&url).await {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("Cannot connect to relay at {}", cli.relay_url);
                    eprintln!("Error: {:#}", e);
                    eprintln!();
                    eprintln!("Check that the relay is running and the token is correct:");
                    eprintln!("  cargo run --bin pagecast");
                    std::process::exit(1);
                }
            };

            let welcome = tokio::time::timeout(Duration::from_secs(timeout), next_text(&mut stream))
                .await
                .context("Timed out waiting for the relay welcome frame")??;
            let welcome: serde_json::Value = serde_json::from_str(&welcome)?;
            let admin_id = welcome["clientId"].as_str().unwrap_or("unknown").to_string();

            stream
                .send(Message::Text(serde_json::to_string(&command)?))
                .await
                .context("Failed to send command")?;
            stream.close(None).await.ok();

            println!("Sent {} as admin {}", command.kind.as_str(), admin_id);
        }

        Commands::Watch { admin } => {
            let url = if admin {
                client::admin_url(&cli.relay_url, &cli.token)
            } else {
                client::public_url(&cli.relay_url)
            };
            let mut stream = client::connect(&url).await?;

            eprintln!(
                "Watching {} channel on {} (Ctrl+C to stop)",
                if admin { "admin" } else { "public" },
                cli.relay_url
            );

            loop {
                tokio::select! {
                    frame = next_text(&mut stream) => match frame {
                        Ok(text) => println!("{}", pretty(&text)),
                        Err(e) => {
                            eprintln!("Connection ended: {}", e);
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => {
                        stream.close(None).await.ok();
                        break;
                    }
                }
            }
        }

        Commands::Webhook { body } => {
            let response = reqwest::Client::new()
                .post(format!("{}/api/news/webhook", cli.api_url.trim_end_matches('/')))
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let reply: serde_json::Value = resp.json().await?;
                    println!("{}", reply["message"].as_str().unwrap_or("OK"));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    eprintln!("Webhook failed ({}): {}", status, text);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to news API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Status => {
            let url = format!("{}/health", http_base(&cli.relay_url));
            let response = reqwest::get(&url).await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    println!(
                        "Pagecast relay v{}",
                        health["version"].as_str().unwrap_or("unknown")
                    );
                    println!();
                    println!("Status:    {}", health["status"].as_str().unwrap_or("unknown"));
                    println!("Pod:       {}", health["pod"].as_str().unwrap_or("-"));
                    println!(
                        "Clustered: {}",
                        health["clustered"].as_bool().unwrap_or(false)
                    );
                    println!();
                    println!("Connections:");
                    println!("  Public: {}", health["public_connections"].as_u64().unwrap_or(0));
                    println!("  Admin:  {}", health["admin_connections"].as_u64().unwrap_or(0));
                    println!();
                    println!("Frames:");
                    println!("  Delivered: {}", health["frames_delivered"].as_u64().unwrap_or(0));
                    println!("  Skipped:   {}", health["frames_skipped"].as_u64().unwrap_or(0));

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("Relay returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to relay at {}", url);
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let content = pagecast::config::generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

/// Wait for the next text frame, skipping control frames
async fn next_text(stream: &mut WsStream) -> anyhow::Result<String> {
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => return Ok(text),
            Message::Close(_) => bail!("relay closed the connection"),
            _ => {}
        }
    }
    bail!("connection closed")
}

/// HTTP base URL of the relay behind a ws:// or wss:// URL
fn http_base(relay_url: &str) -> String {
    let base = relay_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = base.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        base.to_string()
    }
}

fn pretty(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| text.to_string())
}

fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base() {
        assert_eq!(http_base("ws://localhost:8080"), "http://localhost:8080");
        assert_eq!(http_base("wss://relay.example.com/"), "https://relay.example.com");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "0m 59s");
        assert_eq!(format_duration(3_660), "1h 1m");
        assert_eq!(format_duration(90_000), "1d 1h 0m");
    }

    #[test]
    fn test_kind_maps_to_wire_names() {
        assert_eq!(CommandKind::from(Kind::PageAction).as_str(), "pageAction");
        assert_eq!(CommandKind::from(Kind::MessageToAll).as_str(), "messageToAll");
    }
}
