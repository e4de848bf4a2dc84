//! End-to-end subscription flow over a real socket. Covers the handshake,
//! per-user filtering of a broadcast tick and keepalive frames, plus
//! rejection of bad credentials.

use futures_util::StreamExt;
use scada_hub::config::{Config, DeviceConfig};
use scada_hub::device::{SimulatedConnector, SimulatedServer};
use scada_hub::directory::{StaticDirectory, StaticUser};
use scada_hub::{build_router, AppState};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const NORTH: &str = "opc.tcp://north:4840";
const SOUTH: &str = "opc.tcp://south:4840";
const ROOT: &str = "ns=3;s=ServerInterfaces";

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn user(token: &str, id: &str, elevated: bool, devices: &[&str]) -> StaticUser {
    StaticUser {
        token: token.to_string(),
        id: id.to_string(),
        email: String::new(),
        elevated,
        active: true,
        devices: devices.iter().map(|d| d.to_string()).collect(),
    }
}

fn test_state() -> AppState {
    state_from(Config::default())
}

fn state_from(mut config: Config) -> AppState {
    config.devices = vec![
        DeviceConfig {
            id: Some("north".into()),
            name: "North".into(),
            url: NORTH.into(),
            root_node_id: None,
        },
        DeviceConfig {
            id: Some("south".into()),
            name: "South".into(),
            url: SOUTH.into(),
            root_node_id: None,
        },
    ];

    let north = SimulatedServer::demo("North PLC", ROOT);
    north.set_drift(false);
    let connector = SimulatedConnector::new()
        .with_server(NORTH, Arc::new(north))
        .with_server(SOUTH, Arc::new(SimulatedServer::demo("South PLC", ROOT)));
    let directory = StaticDirectory::new(vec![
        user("admin-token", "admin", true, &[]),
        user("ops-token", "ops", false, &["north"]),
    ]);

    AppState::new(&config, Arc::new(connector), Arc::new(directory))
}

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    for _ in 0..200 {
        if state.registry.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber count never reached {}", expected);
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("socket error")
}

async fn next_json(client: &mut Client) -> Value {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_subscriber_receives_only_granted_devices() {
    let state = test_state();
    let addr = spawn_server(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{}/ws?token=ops-token", addr))
        .await
        .unwrap();
    wait_for_subscribers(&state, 1).await;

    let report = state.scheduler.tick().await.unwrap();
    assert_eq!(report.delivery.delivered, 1);

    let frame = next_json(&mut client).await;
    assert_eq!(frame["type"], "telemetry_update");

    let clients = frame["data"]["plc_clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["url"], NORTH);
    assert_eq!(clients[0]["status"], "CONNECTED");
    assert_eq!(clients[0]["nodes"]["Setpoint"], "100");
    assert_eq!(clients[0]["nodes"]["Mode"], "auto");

    state.shutdown().await;
}

#[tokio::test]
async fn test_elevated_subscriber_sees_every_device() {
    let state = test_state();
    let addr = spawn_server(state.clone()).await;

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static("bearer, admin-token"),
    );

    let (mut client, response) = connect_async(request).await.unwrap();
    assert_eq!(
        response.headers().get("sec-websocket-protocol").unwrap(),
        "bearer"
    );
    wait_for_subscribers(&state, 1).await;

    state.scheduler.tick().await.unwrap();

    let frame = next_json(&mut client).await;
    let urls: Vec<&str> = frame["data"]["plc_clients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec![NORTH, SOUTH]);

    state.shutdown().await;
}

#[tokio::test]
async fn test_bad_token_closed_with_policy_violation() {
    let state = test_state();
    let addr = spawn_server(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{}/ws?token=forged", addr))
        .await
        .unwrap();

    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected a close frame, got {:?}", other),
    }
    assert_eq!(state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_shutdown_closes_subscribers() {
    let state = test_state();
    let addr = spawn_server(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{}/ws?token=admin-token", addr))
        .await
        .unwrap();
    wait_for_subscribers(&state, 1).await;

    state.shutdown().await;

    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1001),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keepalives_share_the_socket_with_updates() {
    let mut config = Config::default();
    config.websocket.keepalive_secs = 1;
    let state = state_from(config);
    let addr = spawn_server(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{}/ws?token=ops-token", addr))
        .await
        .unwrap();
    wait_for_subscribers(&state, 1).await;

    let frame = next_json(&mut client).await;
    assert_eq!(frame, serde_json::json!({"type": "keepalive"}));

    state.scheduler.tick().await.unwrap();
    let mut frame = next_json(&mut client).await;
    while frame["type"] == "keepalive" {
        frame = next_json(&mut client).await;
    }
    assert_eq!(frame["type"], "telemetry_update");
    assert_eq!(frame["data"]["plc_clients"][0]["url"], NORTH);

    let frame = next_json(&mut client).await;
    assert_eq!(frame, serde_json::json!({"type": "keepalive"}));

    state.shutdown().await;
}
