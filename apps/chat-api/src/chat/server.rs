//! WebSocket upgrade handler and per-connection event loop.
//!
//! Each connection gets its own task and an unbounded outbound channel
//! registered with the registry. The loop processes one inbound frame at
//! a time (frames from one client are never reordered) while outbound
//! events from other connections' handlers interleave freely.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::models::connection::Role;
use crate::AppState;

/// Connection parameters supplied by the widget:
/// `/ws/chat?type=user&userId=u1&email=alice@example.com`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "type")]
    pub role: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub email: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/chat", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, params))
}

async fn handle_connection(socket: WebSocket, state: AppState, params: ConnectParams) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let role = Role::from_query(params.role.as_deref());
    let user_id = params.user_id.unwrap_or_else(|| "anonymous".to_string());
    let email = params.email.filter(|e| !e.is_empty());

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let conn = state.chat.connect(outbound_tx, role, user_id, email).await;

    loop {
        tokio::select! {
            // An event queued for this connection by any handler.
            event = outbound_rx.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::error!(conn_id = %conn.id, ?err, "failed to serialize event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            // The client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Await here: a client's frames are handled
                        // strictly in arrival order.
                        state.chat.handle_frame(&conn.id, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(conn_id = %conn.id, ?err, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }

    state.chat.disconnect(&conn.id);
}
