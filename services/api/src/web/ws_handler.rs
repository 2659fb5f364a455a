//! services/api/src/web/ws_handler.rs
//!
//! The live-update WebSocket. Each connection subscribes to one roster's change
//! stream and forwards every change as a `ServerMessage` until either side closes.

use crate::web::{protocol::ServerMessage, state::AppState};
use attendance_core::RosterId;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(roster_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, roster_id))
}

async fn send(sender: &mut (impl Sink<Message> + Unpin), msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize server message: {:?}", e);
            false
        }
    }
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, roster_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Subscription Phase ---
    let subscription = match RosterId::new(&roster_id) {
        Ok(roster) => app_state.repo.subscribe(&roster).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let mut changes = match subscription {
        Ok(changes) => changes,
        Err(message) => {
            error!("Failed to subscribe to roster {}: {}", roster_id, message);
            let _ = send(&mut sender, &ServerMessage::Error { message }).await;
            return;
        }
    };
    if !send(&mut sender, &ServerMessage::Subscribed { roster_id: roster_id.clone() }).await {
        return;
    }
    info!("WebSocket subscribed to roster {}", roster_id);

    // --- 2. Forwarding Loop ---
    loop {
        tokio::select! {
            change = changes.next() => {
                let Some(change) = change else {
                    info!("Change stream for roster {} ended", roster_id);
                    break;
                };
                if !send(&mut sender, &ServerMessage::from(change)).await {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        error!("WebSocket error on roster {}: {:?}", roster_id, e);
                        break;
                    }
                    // Clients have nothing to say on this channel.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!("WebSocket for roster {} closed", roster_id);
}
