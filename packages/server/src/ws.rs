//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::{Mutex, mpsc};

use rehearsal_shared::protocol::ClientMessage;

use crate::{
    router::route_message,
    state::{AppState, ConnIdentity},
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Spawns a task that receives messages from the rx channel and pushes them
/// to the WebSocket sender.
///
/// This is the outbound half of a connection: everything the router queues
/// for this client (unicast replies, relays, broadcasts) drains through
/// here, so a slow peer only ever backs up its own channel.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("new WebSocket connection");

    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    // Filled in by the first successful join, read again for teardown.
    let identity = Arc::new(Mutex::new(ConnIdentity::default()));

    let recv_state = state.clone();
    let recv_identity = identity.clone();
    let recv_tx = tx.clone();

    // Messages from one connection are processed to completion in arrival
    // order; only the directory lock is shared across connections.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(parsed) => {
                            let mut identity = recv_identity.lock().await;
                            route_message(&recv_state, &mut identity, &recv_tx, parsed).await;
                        }
                        Err(e) => {
                            // Malformed input is logged and dropped; the
                            // connection stays alive.
                            tracing::warn!("dropping malformed envelope: {}", e);
                        }
                    }
                }
                Message::Ping(_) => {
                    tracing::debug!("received transport ping");
                }
                Message::Close(_) => {
                    tracing::info!("client requested close");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Close fires at most once per connection, so no idempotence guard is
    // needed around the cleanup.
    let identity = identity.lock().await;
    if let (Some(room_id), Some(user_id)) = (identity.room_id.as_deref(), identity.user_id.as_deref())
    {
        state.directory.leave(room_id, user_id).await;
        tracing::info!("user '{}' disconnected from room '{}'", user_id, room_id);
    } else {
        tracing::info!("connection closed before joining a room");
    }
}
