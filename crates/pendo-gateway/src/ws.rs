// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket handler for realtime room subscriptions.
//!
//! Client -> Server (JSON):
//! ```json
//! {"action": "subscribe_conversation", "conversation_id": "..."}
//! {"action": "subscribe_queue"}
//! {"action": "subscribe_notifications"}
//! ```
//!
//! Server -> Client (JSON): a snapshot first, then live room events.
//! ```json
//! {"type": "conversation_snapshot", "conversation": {...}, "messages": [...]}
//! {"type": "queue_snapshot", "conversations": [...]}
//! {"type": "message_appended", ...}
//! {"type": "resync_required"}
//! ```
//!
//! The snapshot-before-events ordering is load-bearing: push delivery is
//! only a latency optimization, and a client that connects (or
//! reconnects) derives its state from the snapshot, not from whatever
//! events it happened to miss. A subscriber that lags past the room
//! buffer receives `resync_required` and re-requests the snapshot.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pendo_bus::{conversation_room, RoomEvent, GLOBAL_NOTIFICATIONS, GLOBAL_QUEUE};

use crate::server::GatewayState;

/// WebSocket command from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum WsCommand {
    SubscribeConversation { conversation_id: String },
    SubscribeQueue,
    SubscribeNotifications,
}

/// Query parameters on the upgrade request. The browser WebSocket API
/// cannot set headers, so auth rides in the query string.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket upgrade handler. Auth happens during the handshake, not
/// via the `/v1` middleware.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<GatewayState>,
) -> Response {
    if !state.auth.accepts(query.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(|socket| handle_socket(socket, state)).into_response()
}

/// Handle an individual WebSocket connection.
///
/// One sender task drains an mpsc channel into the socket; each
/// subscribe command sends its snapshot and spawns a forwarder task from
/// the broadcast room into that channel. All tasks are torn down when
/// the client disconnects.
async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: Vec<JoinHandle<()>> = Vec::new();

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let text_str: &str = &text;
                let command: WsCommand = match serde_json::from_str(text_str) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("invalid WebSocket command: {e}");
                        let _ = out_tx
                            .send(
                                serde_json::json!({
                                    "type": message_types::ERROR,
                                    "error": format!("invalid command: {e}"),
                                })
                                .to_string(),
                            )
                            .await;
                        continue;
                    }
                };

                match command {
                    WsCommand::SubscribeConversation { conversation_id } => {
                        // Snapshot first, then the live feed.
                        match state.router.read(&conversation_id).await {
                            Ok((conversation, messages)) => {
                                let snapshot = serde_json::json!({
                                    "type": message_types::CONVERSATION_SNAPSHOT,
                                    "conversation": conversation,
                                    "messages": messages,
                                });
                                if out_tx.send(snapshot.to_string()).await.is_err() {
                                    break;
                                }
                                let rx = state.router.bus().subscribe(&conversation_room(&conversation_id));
                                forwarders.push(spawn_forwarder(rx, out_tx.clone()));
                            }
                            Err(e) => {
                                let _ = out_tx
                                    .send(
                                        serde_json::json!({
                                            "type": message_types::ERROR,
                                            "error": e.to_string(),
                                        })
                                        .to_string(),
                                    )
                                    .await;
                            }
                        }
                    }
                    WsCommand::SubscribeQueue => match state.router.list_queue().await {
                        Ok(queue) => {
                            let snapshot = serde_json::json!({
                                "type": message_types::QUEUE_SNAPSHOT,
                                "conversations": queue,
                            });
                            if out_tx.send(snapshot.to_string()).await.is_err() {
                                break;
                            }
                            let rx = state.router.bus().subscribe(GLOBAL_QUEUE);
                            forwarders.push(spawn_forwarder(rx, out_tx.clone()));
                        }
                        Err(e) => {
                            let _ = out_tx
                                .send(
                                    serde_json::json!({
                                        "type": message_types::ERROR,
                                        "error": e.to_string(),
                                    })
                                    .to_string(),
                                )
                                .await;
                        }
                    },
                    WsCommand::SubscribeNotifications => {
                        let ack = serde_json::json!({
                            "type": message_types::SUBSCRIBED,
                            "room": GLOBAL_NOTIFICATIONS,
                        });
                        if out_tx.send(ack.to_string()).await.is_err() {
                            break;
                        }
                        let rx = state.router.bus().subscribe(GLOBAL_NOTIFICATIONS);
                        forwarders.push(spawn_forwarder(rx, out_tx.clone()));
                    }
                }
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping (handled by tungstenite layer)
        }
    }

    // Cleanup.
    for task in forwarders {
        task.abort();
    }
    sender_task.abort();
}

/// Forward events from a broadcast room into the socket's outbox.
///
/// Lag is surfaced to the client as `resync_required` instead of being
/// silently swallowed -- the client refetches the snapshot.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<RoomEvent>,
    out_tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if out_tx.send(json).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagged, requesting resync");
                    let resync = serde_json::json!({
                        "type": message_types::RESYNC_REQUIRED,
                    });
                    if out_tx.send(resync.to_string()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// WebSocket message type constants for server -> client messages not
/// covered by [`RoomEvent`]'s own tags.
pub mod message_types {
    /// Conversation state + full log, sent on subscribe and resync.
    pub const CONVERSATION_SNAPSHOT: &str = "conversation_snapshot";
    /// Current queue in priority order.
    pub const QUEUE_SNAPSHOT: &str = "queue_snapshot";
    /// Acknowledgement for snapshot-less subscriptions.
    pub const SUBSCRIBED: &str = "subscribed";
    /// The subscriber lagged past the room buffer; refetch state.
    pub const RESYNC_REQUIRED: &str = "resync_required";
    /// Command-level failure.
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_conversation_command_deserializes() {
        let json = r#"{"action": "subscribe_conversation", "conversation_id": "c-1"}"#;
        let cmd: WsCommand = serde_json::from_str(json).unwrap();
        match cmd {
            WsCommand::SubscribeConversation { conversation_id } => {
                assert_eq!(conversation_id, "c-1");
            }
            other => panic!("expected SubscribeConversation, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_queue_command_deserializes() {
        let cmd: WsCommand = serde_json::from_str(r#"{"action": "subscribe_queue"}"#).unwrap();
        assert!(matches!(cmd, WsCommand::SubscribeQueue));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<WsCommand>(r#"{"action": "publish"}"#).is_err());
    }

    #[test]
    fn auth_query_token_is_optional() {
        let q: WsAuthQuery = serde_json::from_str("{}").unwrap();
        assert!(q.token.is_none());
        let q: WsAuthQuery = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        assert_eq!(q.token.as_deref(), Some("abc"));
    }

    #[test]
    fn message_type_constants() {
        assert_eq!(message_types::CONVERSATION_SNAPSHOT, "conversation_snapshot");
        assert_eq!(message_types::QUEUE_SNAPSHOT, "queue_snapshot");
        assert_eq!(message_types::RESYNC_REQUIRED, "resync_required");
    }
}
