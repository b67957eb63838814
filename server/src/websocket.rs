//! Real-time relay
//!
//! Keeps the live WebSocket connections of each user and pushes events to
//! them. Delivery is best-effort: a user without a live connection simply
//! misses the push and reads the persisted notification later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::state::AppState;

/// Server-to-client event names
pub mod events {
    pub const NEW_SWAP_REQUEST: &str = "new_swap_request";
    pub const SWAP_STATUS_CHANGED: &str = "swap_status_changed";
    pub const NOTIFICATION_RECEIVED: &str = "notification_received";
    pub const USER_TYPING: &str = "user_typing";
}

type ConnectionId = u64;

/// Shared registry of live connections keyed by user
#[derive(Clone, Default)]
pub struct WsState {
    connections: Arc<RwLock<HashMap<Uuid, Vec<(ConnectionId, mpsc::UnboundedSender<String>)>>>>,
    next_id: Arc<AtomicU64>,
}

/// Frame pushed to clients
#[derive(Debug, Serialize)]
struct Frame<'a> {
    event: &'a str,
    data: serde_json::Value,
}

/// Frames clients may send
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Typing { recipient_id: Uuid, is_typing: bool },
}

impl WsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `user_id`; frames for the user arrive on the
    /// returned receiver.
    pub async fn register(&self, user_id: Uuid) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((id, tx));
        (id, rx)
    }

    pub async fn unregister(&self, user_id: Uuid, connection: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(senders) = connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != connection);
            if senders.is_empty() {
                connections.remove(&user_id);
            }
        }
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.connections.read().await.contains_key(&user_id)
    }

    /// Push `event` to every live connection of `user_id`
    pub async fn publish(&self, user_id: Uuid, event: &str, data: serde_json::Value) {
        let connections = self.connections.read().await;
        let Some(senders) = connections.get(&user_id) else {
            tracing::debug!(%user_id, event, "No live connection, dropping event");
            return;
        };
        let text = match serde_json::to_string(&Frame { event, data }) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode {} frame: {}", event, e);
                return;
            }
        };
        for (_, sender) in senders {
            // A closed receiver means the socket task is shutting down.
            let _ = sender.send(text.clone());
        }
    }

    async fn handle_client_message(&self, from: Uuid, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Typing {
                recipient_id,
                is_typing,
            }) => {
                self.publish(
                    recipient_id,
                    events::USER_TYPING,
                    json!({ "userId": from, "isTyping": is_typing }),
                )
                .await;
            }
            Err(e) => tracing::debug!(user_id = %from, "Ignoring client frame: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// `GET /ws?token=<jwt>`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    let claims = match state.auth_service.verify_token(&query.token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("Socket authentication error: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    let user_id = match state.auth_service.me(claims.sub).await {
        Ok(user) if user.is_banned => {
            tracing::warn!(user_id = %user.id, "Banned user refused a socket");
            return StatusCode::FORBIDDEN.into_response();
        }
        Ok(user) => user.id,
        Err(AuthError::UserNotFound) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            tracing::warn!("Socket user lookup failed: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let ws_state = state.ws_state.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, ws_state))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, ws_state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound) = ws_state.register(user_id).await;
    tracing::info!(%user_id, "User connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let inbound_state = ws_state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => inbound_state.handle_client_message(user_id, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ws_state.unregister(user_id, connection).await;
    tracing::info!(%user_id, "User disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_connection_of_the_user() {
        let ws = WsState::new();
        let user = Uuid::new_v4();
        let (_, mut first) = ws.register(user).await;
        let (_, mut second) = ws.register(user).await;

        ws.publish(user, events::SWAP_STATUS_CHANGED, json!({ "status": "accepted" }))
            .await;

        for rx in [&mut first, &mut second] {
            let frame: serde_json::Value =
                serde_json::from_str(&rx.recv().await.expect("frame")).expect("json");
            assert_eq!(frame["event"], "swap_status_changed");
            assert_eq!(frame["data"]["status"], "accepted");
        }
    }

    #[tokio::test]
    async fn publish_without_connection_is_dropped() {
        let ws = WsState::new();
        ws.publish(Uuid::new_v4(), events::NOTIFICATION_RECEIVED, json!({}))
            .await;
    }

    #[tokio::test]
    async fn unregister_removes_user_when_last_connection_closes() {
        let ws = WsState::new();
        let user = Uuid::new_v4();
        let (a, _rx_a) = ws.register(user).await;
        let (b, _rx_b) = ws.register(user).await;
        ws.unregister(user, a).await;
        assert!(ws.is_connected(user).await);
        ws.unregister(user, b).await;
        assert!(!ws.is_connected(user).await);
    }

    #[tokio::test]
    async fn typing_frames_are_relayed() {
        let ws = WsState::new();
        let (from, to) = (Uuid::new_v4(), Uuid::new_v4());
        let (_, mut rx) = ws.register(to).await;

        let frame = json!({ "event": "typing", "recipientId": to, "isTyping": true });
        ws.handle_client_message(from, &frame.to_string()).await;

        let relayed: serde_json::Value =
            serde_json::from_str(&rx.recv().await.expect("frame")).expect("json");
        assert_eq!(relayed["event"], "user_typing");
        assert_eq!(relayed["data"]["userId"], from.to_string());
    }
}
