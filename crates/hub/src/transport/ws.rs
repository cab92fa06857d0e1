// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session gateway: WebSocket handshake, authorization and the
//! per-session loop.
//!
//! The handshake binds the session to the intersection of the requested
//! chats and what the permission store authorizes at that moment; the set is
//! immutable for the session's lifetime, and one unauthorized chat denies
//! the whole session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::publish;
use crate::registry::SessionHandle;
use crate::state::{epoch_ms, HubState};
use crate::transport::ws_msg::{AckStatus, ClientFrame, ServerFrame};

/// Query parameters for the session handshake.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    pub token: Option<String>,
    /// Comma-separated chat ids the session asks to join.
    #[serde(default)]
    pub chat_ids: String,
}

/// `GET /ws?token=<bearer>&chatIds=<csv>` — WebSocket handshake.
pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(ref token) = query.token else {
        return deny(HubError::TokenInvalid, "missing token");
    };

    let verified =
        tokio::time::timeout(state.config.verify_timeout(), state.verifier.verify(token)).await;
    let claims = match verified {
        Ok(Ok(claims)) => claims,
        Ok(Err(code)) => return deny(code, "token rejected"),
        Err(_) => return deny(HubError::TokenInvalid, "token verification timed out"),
    };
    let principal = claims.sub;

    // Deduplicated requested set, order preserved.
    let mut chats: Vec<String> = Vec::new();
    for part in query.chat_ids.split(',') {
        let chat = part.trim();
        if !chat.is_empty() && !chats.iter().any(|c| c == chat) {
            chats.push(chat.to_owned());
        }
    }
    if chats.is_empty() {
        return deny(HubError::MissingField, "no chat ids requested");
    }

    // Every requested chat must be authorized; one miss denies the session.
    for chat in &chats {
        if state.permissions.get(&principal, chat).await.is_none() {
            tracing::debug!(principal = %principal, chat_id = %chat, "handshake denied");
            return deny(HubError::NoPermission, "chat not authorized");
        }
    }

    ws.on_upgrade(move |socket| handle_session(state, principal, chats, socket))
        .into_response()
}

fn deny(code: HubError, message: &str) -> axum::response::Response {
    code.to_http_response(message).into_response()
}

/// Per-session loop: egress frames out, client operations in.
async fn handle_session(
    state: Arc<HubState>,
    principal: String,
    chats: Vec<String>,
    socket: WebSocket,
) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(state.config.session_buffer);

    let handle = state
        .registry
        .open(SessionHandle {
            id: session_id.clone(),
            principal_id: principal.clone(),
            chat_ids: chats.clone(),
            opened_at_ms: epoch_ms(),
            frames: frame_tx,
            cancel: CancellationToken::new(),
        })
        .await;
    tracing::info!(session_id = %session_id, principal = %principal, "session opened");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let connected = ServerFrame::Connected { session_id: session_id.clone(), chat_ids: chats };
    if let Ok(json) = serde_json::to_string(&connected) {
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            state.registry.close(&session_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            // Administrative drop or stale-endpoint reap elsewhere.
            _ = handle.cancel.cancelled() => break,

            // Egress processor -> endpoint.
            frame = frame_rx.recv() => {
                match frame {
                    Some(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Endpoint -> operations.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let ack = handle_operation(&state, handle.principal_id.as_str(), &handle.chat_ids, &text).await;
                        if let Ok(json) = serde_json::to_string(&ack) {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.close(&session_id).await;
    tracing::info!(session_id = %session_id, "session closed");
}

/// Route one inbound text frame. Every frame draws an ack.
async fn handle_operation(
    state: &HubState,
    principal: &str,
    chats: &[String],
    text: &str,
) -> ServerFrame {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            return ServerFrame::Ack {
                ack_id: None,
                status: AckStatus::Error,
                message_id: None,
                error: Some(HubError::MalformedBody.to_error_body("unknown operation")),
            }
        }
    };

    match frame {
        ClientFrame::SendMessage { ack_id, body } => {
            let published = tokio::time::timeout(
                state.config.publish_timeout(),
                publish::publish(state, principal, Some(chats), &body),
            )
            .await;
            match published {
                Ok(Ok(receipt)) => ServerFrame::Ack {
                    ack_id,
                    status: AckStatus::Ok,
                    message_id: Some(receipt.message_id),
                    error: None,
                },
                Ok(Err(code)) => ServerFrame::Ack {
                    ack_id,
                    status: AckStatus::Error,
                    message_id: None,
                    error: Some(code.to_error_body("publish rejected")),
                },
                Err(_) => ServerFrame::Ack {
                    ack_id,
                    status: AckStatus::Error,
                    message_id: None,
                    error: Some(HubError::BusUnavailable.to_error_body("publish timed out")),
                },
            }
        }
    }
}
