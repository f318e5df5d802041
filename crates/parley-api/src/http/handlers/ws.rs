//! WebSocket handler for the chat relay.
//!
//! The `/ws/chat` endpoint upgrades an authenticated HTTP connection to a
//! WebSocket. Each connection owns exactly one orchestrator stream session
//! and one [`RelaySession`]. A single task multiplexes:
//!
//! - inbound client frames, handed to the relay session
//! - orchestrator replies, routed to the chat room or this connection
//! - the connection's outbound queue (its own events plus room broadcasts)
//!
//! Disconnecting cancels the orchestrator session. An in-flight turn is
//! abandoned before it writes anything.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parley_core::chat::StreamChannel;
use parley_core::relay::{ClientEvent, RelaySession};

use crate::http::extractors::auth::AuthenticatedUser;
use crate::state::AppState;

/// Upgrade an authenticated HTTP request to a chat relay connection.
///
/// This is mounted at `/ws/chat` in the router. The token is checked
/// first, so a bad token never opens an orchestrator session.
pub async fn ws_handler(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, user_id))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, user_id: i64) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let cancel = CancellationToken::new();
    let StreamChannel { turns, mut replies } = state.chat_service.connect(user_id, cancel.clone());

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
    let mut session = RelaySession::new(
        user_id,
        outbound_tx,
        Arc::clone(&state.rooms),
        Arc::clone(&state.store),
        turns,
        state.join_timeout(),
    );
    let conn_id = session.conn_id();
    tracing::info!(%conn_id, user_id, "relay connection opened");

    loop {
        tokio::select! {
            // --- Branch 1: Push queued events to the client ---
            event = outbound_rx.recv() => {
                let Some(event) = event else { break };
                if ws_sender.send(Message::Text(event.to_text().into())).await.is_err() {
                    // Client disconnected
                    break;
                }
            }

            // --- Branch 2: Route orchestrator replies ---
            reply = replies.recv() => {
                match reply {
                    Some(reply) => {
                        if let Err(err) = session.route_reply(reply) {
                            tracing::debug!(%conn_id, error = %err, "reply routing stopped");
                            break;
                        }
                    }
                    None => {
                        tracing::info!(%conn_id, "chat stream ended, closing connection");
                        break;
                    }
                }
            }

            // --- Branch 3: Process frames from the client ---
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = session.handle_frame(text.as_str()).await {
                            tracing::debug!(%conn_id, error = %err, "relay session ended");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%conn_id, "WebSocket receive error: {err}");
                        break;
                    }
                    // Ignore binary, ping, pong protocol frames (handled by axum/tungstenite)
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    cancel.cancel();
    session.close();

    // Flush whatever was queued before the loop ended (e.g. the last error).
    while let Ok(event) = outbound_rx.try_recv() {
        if ws_sender.send(Message::Text(event.to_text().into())).await.is_err() {
            break;
        }
    }
    let _ = ws_sender.close().await;

    tracing::info!(%conn_id, user_id, "relay connection closed");
}
