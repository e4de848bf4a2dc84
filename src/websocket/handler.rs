//! WebSocket Handler
//!
//! Handles the subscription handshake and the connection lifecycle.
//!
//! The credential may arrive as a `?token=` query parameter, as the second
//! entry of a `bearer, <token>` subprotocol offer, or in an `Authorization`
//! header. The socket is upgraded first and then closed with 1008 if the
//! credential is missing or rejected, so browsers see a proper close code.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::messages::ServerMessage;
use crate::api::auth::{bearer_from_header, bearer_from_subprotocol, BEARER_SUBPROTOCOL};
use crate::api::AppState;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let from_subprotocol = bearer_from_subprotocol(&headers);
    let ws = if from_subprotocol.is_some() {
        ws.protocols([BEARER_SUBPROTOCOL])
    } else {
        ws
    };

    let token = from_subprotocol
        .or(params.token.filter(|t| !t.is_empty()))
        .or_else(|| bearer_from_header(&headers));

    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Handle an established WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, token: Option<String>) {
    let Some(token) = token else {
        close(&mut socket, close_code::POLICY, "missing credentials").await;
        return;
    };

    let principal = match state.resolver.authenticate(&token).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket authentication failed");
            close(&mut socket, close_code::POLICY, "invalid credentials").await;
            return;
        }
    };

    let visibility = state.resolver.visibility(&principal).await;
    let (tx, rx) = mpsc::channel(state.registry.config().outbound_capacity);

    let connection_id = match state.registry.register(&principal.user_id, visibility, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register WebSocket connection");
            close(&mut socket, close_code::AGAIN, "too many connections").await;
            return;
        }
    };

    let (sink, stream) = socket.split();

    let mut send_task = tokio::spawn(write_loop(
        sink,
        rx,
        state.config.keepalive,
        state.cancel.clone(),
        connection_id.clone(),
    ));
    let mut recv_task = tokio::spawn(read_loop(stream, connection_id.clone()));

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state
        .registry
        .unregister(&principal.user_id, &connection_id)
        .await;
}

async fn close(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Sole writer of the socket: telemetry, keepalives and the final close
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ServerMessage>,
    keepalive: Duration,
    cancel: CancellationToken,
    connection_id: String,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(message) => message,
                None => break,
            },
            _ = ticker.tick() => ServerMessage::Keepalive,
        };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                continue;
            }
        };

        if sink.send(Message::Text(text)).await.is_err() {
            tracing::debug!(
                connection_id = %connection_id,
                "WebSocket send failed, closing connection"
            );
            return;
        }
    }

    let frame = CloseFrame {
        code: close_code::AWAY,
        reason: Cow::Borrowed("server shutting down"),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

/// Drain inbound frames until the client goes away
async fn read_loop(mut stream: SplitStream<WebSocket>, connection_id: String) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
        }
    }
}
