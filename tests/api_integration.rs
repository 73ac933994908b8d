//! API Integration Tests for fleetwatch
//!
//! Health probes through the router, plus live `/ws` sessions over a real
//! socket with a WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use fleetwatch::notifier::Channel;
use fleetwatch::server::{AppState, create_router};
use fleetwatch::storage::{AlertKind, DeviceCycle, NewAlert, NewDevice};
use fleetwatch::{ChangeNotifier, FleetStore, StateStore, StorageBuilder, SubscriberRegistry};
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Test Helpers
// =============================================================================

/// Create test app state with in-memory database.
async fn create_test_state() -> AppState {
    let store = StorageBuilder::new("sqlite::memory:")
        .build()
        .await
        .expect("Failed to build storage");

    AppState {
        store,
        subscribers: SubscriberRegistry::new(),
        channel_capacity: 8,
    }
}

/// Parse response body as JSON.
async fn parse_json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Start test server and return its address.
async fn start_test_server(state: AppState) -> std::net::SocketAddr {
    let router = create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

async fn open_ws(addr: std::net::SocketAddr, query: &str) -> Client {
    let (client, response) = connect_async(format!("ws://{addr}/ws{query}"))
        .await
        .expect("WebSocket handshake failed");
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    client
}

/// Next text message, as JSON.
async fn next_json(client: &mut Client) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("no message received")
        .expect("stream closed")
        .expect("WebSocket error");
    let Message::Text(text) = message else {
        panic!("expected a text message, got {message:?}");
    };
    serde_json::from_str(text.as_str()).unwrap()
}

async fn wait_for_subscribers(registry: &SubscriberRegistry, count: usize) {
    for _ in 0..100 {
        if registry.len().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} subscribers");
}

async fn seed_reachable(store: &FleetStore, hostname: &str, ip: &str) -> i64 {
    let id = store
        .insert_device_if_not_exists(&NewDevice {
            hostname: hostname.to_string(),
            ip_address: ip.to_string(),
            community: "public".to_string(),
        })
        .await
        .unwrap()
        .unwrap();
    store
        .commit_cycle(&DeviceCycle::reachable(id, Utc::now()))
        .await
        .unwrap();
    id
}

async fn wait_until_empty(registry: &SubscriberRegistry) {
    for _ in 0..100 {
        if registry.is_empty().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscriber was never removed");
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = create_router(create_test_state().await);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert!(body.get("db").is_none());

    let response = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "ready");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_router(create_test_state().await);
    let response = app
        .oneshot(Request::builder().uri("/api/devices").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Live Update Tests
// =============================================================================

#[tokio::test]
async fn test_ws_receives_device_update() {
    let state = create_test_state().await;
    let store: FleetStore = state.store.clone();
    let registry = state.subscribers.clone();
    seed_reachable(&store, "core-1", "10.0.0.1").await;

    let addr = start_test_server(state).await;
    let mut ws = open_ws(addr, "").await;

    // Registration happens right after the upgrade completes.
    wait_for_subscribers(&registry, 1).await;
    assert!(registry.has_subscribers(Channel::Devices).await);

    let notifier = ChangeNotifier::new(Arc::new(store), registry.clone(), Duration::from_secs(1));
    let report = notifier.broadcast_once().await.unwrap();
    assert_eq!(report.delivered, 1);

    let message = next_json(&mut ws).await;
    assert_eq!(message["type"], "device_update");
    assert_eq!(message["data"][0]["hostname"], "core-1");
    assert_eq!(message["data"][0]["ip"], "10.0.0.1");
    assert_eq!(message["data"][0]["status"], "up");
    assert_eq!(message["data"][0]["interfaces"], Value::Array(Vec::new()));

    // Closing the socket removes the subscriber.
    ws.close(None).await.unwrap();
    wait_until_empty(&registry).await;
}

#[tokio::test]
async fn test_ws_alerts_channel() {
    let state = create_test_state().await;
    let store: FleetStore = state.store.clone();
    let registry = state.subscribers.clone();
    let id = seed_reachable(&store, "core-1", "10.0.0.1").await;

    let mut cycle = DeviceCycle::unreachable(id, Utc::now());
    cycle.alerts.push(NewAlert::device(
        AlertKind::DeviceDown,
        "Device core-1 (10.0.0.1) is unreachable",
    ));
    store.commit_cycle(&cycle).await.unwrap();

    let addr = start_test_server(state).await;
    let mut alerts = open_ws(addr, "?channel=alerts").await;
    let mut devices = open_ws(addr, "").await;
    wait_for_subscribers(&registry, 2).await;
    assert!(registry.has_subscribers(Channel::Alerts).await);
    assert!(!registry.has_subscribers(Channel::Topology).await);

    let notifier = ChangeNotifier::new(Arc::new(store), registry.clone(), Duration::from_secs(1));
    assert_eq!(notifier.broadcast_once().await.unwrap().delivered, 2);

    let message = next_json(&mut alerts).await;
    assert_eq!(message["type"], "alerts");
    assert_eq!(message["data"][0]["kind"], "device_down");
    assert_eq!(
        message["data"][0]["message"],
        "Device core-1 (10.0.0.1) is unreachable"
    );

    let message = next_json(&mut devices).await;
    assert_eq!(message["type"], "device_update");
    assert_eq!(message["data"][0]["status"], "down");

    drop(alerts);
    drop(devices);
    wait_until_empty(&registry).await;
}

#[tokio::test]
async fn test_ws_unknown_channel_rejected() {
    let state = create_test_state().await;
    let registry = state.subscribers.clone();
    let addr = start_test_server(state).await;

    let result = connect_async(format!("ws://{addr}/ws?channel=metrics")).await;
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should be refused"),
    }
    assert!(registry.is_empty().await);
}
