//! WebSocket push of domain events
//!
//! Endpoint: GET /ws/events (bearer header or `?token=`)

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::{
    Extension,
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use super::state::AppState;
use crate::core_types::{Actor, UserId};
use crate::ports::{ConnectionManager, WsMessage};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(actor): Extension<Actor>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let manager = state.ws_manager.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, actor.id, manager))
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "ping"))
        .unwrap_or(false)
}

async fn handle_socket(socket: WebSocket, user_id: UserId, manager: Arc<ConnectionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    let conn_id = manager.add_connection(user_id, tx.clone());

    let welcome = WsMessage::Connected { user_id };
    if let Ok(json) = serde_json::to_string(&welcome) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg)
                && sender.send(Message::Text(json.into())).await.is_err()
            {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if is_ping(text.as_str()) {
                        let _ = tx.send(WsMessage::Pong);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    manager.remove_connection(user_id, conn_id);
}
