//! Web server module for fleetwatch.
//!
//! Health probes and the `/ws` live update stream.
//!
//! `/ws` serves the device feed by default; `?channel=stats|alerts|topology`
//! selects another [`Channel`].

use axum::{
    Json, Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::notifier::{Channel, ChannelSubscriber, SubscriberRegistry};
use crate::storage::FleetStore;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: FleetStore,
    pub subscribers: SubscriberRegistry,
    /// Queue depth of each connection's subscriber.
    pub channel_capacity: usize,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Query parameters for the live update stream.
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub channel: Option<String>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/ws", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks the database answers.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQueryParams>,
) -> Response {
    let channel = match params.channel.as_deref().filter(|c| !c.is_empty()) {
        None => Channel::default(),
        Some(name) => match name.parse::<Channel>() {
            Ok(channel) => channel,
            Err(_) => {
                return (StatusCode::BAD_REQUEST, format!("unknown channel '{name}'"))
                    .into_response();
            }
        },
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, channel))
}

/// Bridge one connection to the registry until either side goes away.
///
/// The subscriber's queue closes when the registry drops it, which ends the
/// outbound half and with it the connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channel: Channel) {
    let (subscriber, mut rx) = ChannelSubscriber::channel(state.channel_capacity);
    let id = state
        .subscribers
        .register_on(channel, Arc::new(subscriber))
        .await;
    tracing::info!(subscriber = %id, channel = %channel, "Live update client connected");

    let (mut sink, mut stream) = socket.split();

    let mut outbound = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Client messages are ignored; reading keeps close frames flowing.
    let mut inbound = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut outbound => inbound.abort(),
        _ = &mut inbound => outbound.abort(),
    }

    state.subscribers.remove(id).await;
    tracing::info!(subscriber = %id, "Live update client disconnected");
}
