// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint shared by agents and operators.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::error::HubError;
use crate::fanout::ConnectionHandle;
use crate::protocol::{ClientMessage, Role, ServerMessage};
use crate::relay::Relay;
use crate::state::AppState;
use crate::transport::auth;

/// Query parameters for the WS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws`: WebSocket upgrade. Each socket is one connection.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(code) =
        auth::validate_ws_token(query.token.as_deref(), state.config.auth_token.as_deref())
    {
        return code.to_http_response(code.default_message()).into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(state, socket)).into_response()
}

/// Per-connection event loop. Inbound frames are handled one at a time in
/// arrival order; the socket closing is the disconnect.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (handle, mut out_rx) = ConnectionHandle::channel();
    let (mut ws_tx, mut ws_rx) = socket.split();
    tracing::debug!(conn_id = %conn_id, "connection opened");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            msg = out_rx.recv() => {
                let Some(msg) = msg else { break };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(conn_id = %conn_id, err = %e, "failed to encode frame"),
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state.relay, &conn_id, &handle, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(conn_id = %conn_id, err = %e, "socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let removed = state.relay.disconnect(&conn_id);
    tracing::debug!(conn_id = %conn_id, registered = !removed.is_empty(), "connection closed");
}

/// Apply one inbound frame. Replies to the sender go through its own handle
/// so they stay ordered with everything else queued for it.
pub(crate) fn handle_frame(relay: &Relay, conn_id: &str, handle: &ConnectionHandle, text: &str) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            handle.send(ServerMessage::Error {
                code: HubError::BadRequest.as_str().to_owned(),
                message: format!("invalid message: {e}"),
            });
            return;
        }
    };

    match msg {
        ClientMessage::RegisterAgent { metadata } => {
            handle.send(ServerMessage::RegistrationAck { id: conn_id.to_owned(), role: Role::Agent });
            relay.register_agent(conn_id.to_owned(), metadata, handle.clone());
        }
        ClientMessage::RegisterOperator {} => {
            handle.send(ServerMessage::RegistrationAck {
                id: conn_id.to_owned(),
                role: Role::Operator,
            });
            relay.register_operator(conn_id.to_owned(), handle.clone());
        }
        ClientMessage::DispatchCommand { target_agent_id, payload } => {
            if let Err(code) = relay.dispatch_from_operator(conn_id, handle, &target_agent_id, payload) {
                tracing::debug!(conn_id, agent_id = %target_agent_id, code = code.as_str(), "dispatch refused");
            }
        }
        ClientMessage::CommandResult { command_id, result, error } => {
            relay.resolve_result(&command_id, result, error);
        }
        ClientMessage::Ping {} => {
            handle.send(ServerMessage::Pong {});
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
