//! End-to-end tests against a relay bound to a real socket

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pagecast::api::{serve_on, AppState};
use pagecast::cluster::{BridgeHandle, ClusterBridge, InMemoryBus};
use pagecast::config::Config;
use pagecast::websocket::Hub;

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const TOKEN: &str = "admin-secret-token";

async fn spawn_relay(config: Config, bus: Option<&InMemoryBus>) -> (String, Option<BridgeHandle>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (mut hub, handle) = Hub::new();
    let bridge = bus.map(|bus| {
        let bridge = ClusterBridge::new(
            &config.cluster,
            config.cluster.pod_name(),
            Arc::new(bus.clone()),
        )
        .spawn(handle.clone());
        hub.attach_bridge(bridge.clone());
        bridge
    });
    hub.spawn();

    let state = AppState::new(handle, &config);
    tokio::spawn(serve_on(listener, state, std::future::pending()));

    (format!("ws://{}", addr), bridge)
}

async fn start_relay(config: Config) -> String {
    spawn_relay(config, None).await.0
}

async fn start_clustered(config: Config, bus: &InMemoryBus) -> (String, BridgeHandle) {
    let (base, bridge) = spawn_relay(config, Some(bus)).await;
    (base, bridge.unwrap())
}

/// Poll the health endpoint until it reports `expected` public connections
async fn wait_for_public_count(base: &str, expected: u64) {
    let url = format!("{}/health", base.replacen("ws://", "http://", 1));
    timeout(Duration::from_secs(5), async {
        loop {
            let health: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
            if health["public_connections"].as_u64() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("public connection count never settled");
}

async fn connect(url: &str) -> Client {
    let (stream, _) = connect_async(url).await.unwrap();
    stream
}

async fn next_json(client: &mut Client) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

async fn assert_silent(client: &mut Client) {
    let result = timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

/// Connect a viewer and consume its welcome frame
async fn viewer(base: &str) -> (Client, String) {
    let mut client = connect(&format!("{}/public", base)).await;
    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "connected");
    (client, welcome["clientId"].as_str().unwrap().to_string())
}

/// Connect an admin and consume its welcome and count snapshot
async fn admin(base: &str) -> (Client, String, u64) {
    let mut client = connect(&format!("{}/admin?token={}", base, TOKEN)).await;
    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "connected");
    let count = next_json(&mut client).await;
    assert_eq!(count["type"], "clientCount");
    (
        client,
        welcome["clientId"].as_str().unwrap().to_string(),
        count["count"].as_u64().unwrap(),
    )
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn welcome_is_first_frame() {
    let base = start_relay(Config::default()).await;

    let mut client = connect(&format!("{}/public", base)).await;
    let welcome = next_json(&mut client).await;

    assert_eq!(welcome["type"], "connected");
    assert_eq!(welcome["message"], "Connected to public channel");
    assert!(!welcome["clientId"].as_str().unwrap().is_empty());

    let mut admin = connect(&format!("{}/admin?token={}", base, TOKEN)).await;
    let welcome = next_json(&mut admin).await;
    assert_eq!(welcome["message"], "Connected to admin channel");
}

#[tokio::test]
async fn rejected_upgrades_never_handshake() {
    let base = start_relay(Config::default()).await;

    for (path, expected) in [
        ("/admin?token=wrong", 401),
        ("/admin", 401),
        ("/chat", 404),
        ("/public/extra", 404),
    ] {
        match connect_async(format!("{}{}", base, path)).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), expected),
            other => panic!("{} should be rejected, got {:?}", path, other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn admin_command_reaches_every_viewer_and_no_admin() {
    let base = start_relay(Config::default()).await;

    let (mut admin_a, admin_id, count) = admin(&base).await;
    assert_eq!(count, 0);
    let (mut admin_b, _, _) = admin(&base).await;

    let (mut v1, _) = viewer(&base).await;
    let (mut v2, _) = viewer(&base).await;
    for admin in [&mut admin_a, &mut admin_b] {
        assert_eq!(next_json(admin).await["count"], 1);
        assert_eq!(next_json(admin).await["count"], 2);
    }

    send(
        &mut admin_a,
        json!({"type": "pageAction", "payload": {"action": "updateNews"}}),
    )
    .await;

    for viewer in [&mut v1, &mut v2] {
        let frame = next_json(viewer).await;
        assert_eq!(frame["type"], "pageAction");
        assert_eq!(frame["payload"]["action"], "updateNews");
        assert_eq!(frame["adminClientId"], admin_id.as_str());
        assert!(frame["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    assert_silent(&mut admin_a).await;
    assert_silent(&mut admin_b).await;
}

#[tokio::test]
async fn spoofed_attribution_is_overwritten() {
    let base = start_relay(Config::default()).await;
    let (mut admin, admin_id, _) = admin(&base).await;
    let (mut viewer, _) = viewer(&base).await;

    send(
        &mut admin,
        json!({"type": "messageToAll", "payload": "hi", "adminClientId": "someone-else"}),
    )
    .await;

    let frame = next_json(&mut viewer).await;
    assert_eq!(frame["type"], "messageToAll");
    assert_eq!(frame["payload"], "hi");
    assert_eq!(frame["adminClientId"], admin_id.as_str());
}

#[tokio::test]
async fn bad_admin_input_keeps_connection_open() {
    let base = start_relay(Config::default()).await;
    let (mut admin, _, _) = admin(&base).await;
    let (mut viewer, _) = viewer(&base).await;

    admin.send(Message::Text("not json".to_string())).await.unwrap();
    send(&mut admin, json!({"type": "selfDestruct"})).await;
    send(&mut admin, json!({"payload": {"action": "x"}})).await;
    send(&mut admin, json!({"type": "pageAction"})).await;

    let frame = next_json(&mut viewer).await;
    assert_eq!(frame["type"], "pageAction");
    assert!(frame.get("payload").is_none());
}

#[tokio::test]
async fn admins_follow_viewer_count() {
    let base = start_relay(Config::default()).await;
    let (mut admin, _, _) = admin(&base).await;

    let (mut v1, _) = viewer(&base).await;
    assert_eq!(next_json(&mut admin).await["count"], 1);
    let (_v2, _) = viewer(&base).await;
    assert_eq!(next_json(&mut admin).await["count"], 2);

    v1.close(None).await.unwrap();
    assert_eq!(next_json(&mut admin).await["count"], 1);

    // A second admin joining does not notify the first.
    let (_admin_b, _, snapshot) = self::admin(&base).await;
    assert_eq!(snapshot, 1);
    assert_silent(&mut admin).await;
}

#[tokio::test]
async fn standalone_public_text_is_not_relayed() {
    let base = start_relay(Config::default()).await;
    let (mut v1, _) = viewer(&base).await;
    let (mut v2, _) = viewer(&base).await;

    v1.send(Message::Text("hello everyone".to_string()))
        .await
        .unwrap();

    assert_silent(&mut v2).await;
    assert_silent(&mut v1).await;
}

#[tokio::test]
async fn command_crosses_relays_over_the_bus() {
    let bus = InMemoryBus::new();

    let mut config_a = Config::default();
    config_a.cluster.enabled = true;
    config_a.cluster.pod_name = Some("pod-a".to_string());
    config_a.cluster.reconnect_backoff_ms = 20;
    let mut config_b = config_a.clone();
    config_b.cluster.pod_name = Some("pod-b".to_string());

    let (base_a, bridge_a) = start_clustered(config_a, &bus).await;
    let (base_b, bridge_b) = start_clustered(config_b, &bus).await;

    timeout(Duration::from_secs(2), async {
        while !(bridge_a.is_subscribed() && bridge_b.is_subscribed()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bridges never subscribed");

    let (mut admin, admin_id, _) = admin(&base_a).await;
    let (mut local, _) = viewer(&base_a).await;
    let (mut remote, _) = viewer(&base_b).await;

    send(
        &mut admin,
        json!({"type": "pageAction", "payload": {"action": "updateNews"}}),
    )
    .await;

    for viewer in [&mut local, &mut remote] {
        let frame = next_json(viewer).await;
        assert_eq!(frame["type"], "pageAction");
        assert_eq!(frame["adminClientId"], admin_id.as_str());
        assert_silent(viewer).await;
    }
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let mut config = Config::default();
    config.server.idle_timeout_secs = 1;
    let base = start_relay(config).await;

    let (mut silent, _) = viewer(&base).await;
    wait_for_public_count(&base, 1).await;

    let frame = timeout(Duration::from_secs(5), silent.next())
        .await
        .expect("idle connection was never closed");
    assert!(
        matches!(frame, Some(Ok(Message::Close(_)))),
        "expected a close frame, got {:?}",
        frame
    );

    wait_for_public_count(&base, 0).await;
}

#[tokio::test]
async fn traffic_keeps_connection_open() {
    let mut config = Config::default();
    config.server.idle_timeout_secs = 1;
    let base = start_relay(config).await;

    let (mut chatty, _) = viewer(&base).await;
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        send(&mut chatty, json!({"ping": true})).await;
    }

    wait_for_public_count(&base, 1).await;
}

#[tokio::test]
async fn oversized_frame_terminates_connection() {
    let mut config = Config::default();
    config.server.max_message_bytes = 1024;
    let base = start_relay(config).await;

    let (mut admin, _, _) = admin(&base).await;
    let (mut viewer, _) = viewer(&base).await;
    assert_eq!(next_json(&mut admin).await["count"], 1);

    viewer
        .send(Message::Text("x".repeat(4096)))
        .await
        .unwrap();

    let ended = timeout(Duration::from_secs(5), async {
        loop {
            match viewer.next().await {
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Ping(_))) => continue,
                _ => return,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "oversized frame did not end the connection");

    let count = next_json(&mut admin).await;
    assert_eq!(count["type"], "clientCount");
    assert_eq!(count["count"], 0);
}
