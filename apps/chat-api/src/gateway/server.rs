//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chat_common::PrefixedId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time;

use crate::auth::middleware::AuthUser;
use crate::error::ChatError;
use crate::models::user::{Identity, OnlineUser};
use crate::AppState;

use super::events::{
    ClientMessage, EventName, HeartbeatPayload, HubMessage, OutboundEvent, SendGroupPayload,
    SendPrivatePayload, OP_HEARTBEAT, OP_LIST_CONNECTED, OP_SEND_GROUP, OP_SEND_PRIVATE,
};
use super::session::{ConnectionId, ConnectionSession, SessionState};

/// Close codes (4000-range for application-level).
const CLOSE_DECODE_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_CONNECT_REJECTED: u16 = 4004;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41250;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/hub", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    auth: AuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, auth.into()))
}

async fn handle_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut ws_tx, ws_rx) = socket.split();
    let session = Arc::new(ConnectionSession::new(
        ConnectionId::generate(),
        identity.user_id.clone(),
        identity.display_name.clone(),
    ));
    let outbound_rx = state.hub.attach(&session.connection_id, &session.user_id);

    let groups = match state.lifecycle.connect(&session).await {
        Ok(groups) => groups,
        Err(err) => {
            tracing::debug!(
                connection_id = %session.connection_id,
                user_id = %session.user_id,
                %err,
                "connect rejected"
            );
            state.lifecycle.disconnect(&session);
            state.hub.detach(&session.connection_id);
            let _ = send_close(&mut ws_tx, CLOSE_CONNECT_REJECTED, &err.public_message()).await;
            return;
        }
    };

    let ready = HubMessage::dispatch(
        EventName::READY,
        session.next_seq(),
        json!({
            "connection_id": session.connection_id,
            "user": { "id": session.user_id, "display_name": session.display_name },
            "groups": groups,
            "heartbeat_interval": HEARTBEAT_INTERVAL_MS,
        }),
    );

    if send_json(&mut ws_tx, &ready, state.config.send_timeout).await {
        run_session(&state, &session, &identity, ws_tx, ws_rx, outbound_rx).await;
    }

    state.lifecycle.disconnect(&session);
    state.hub.detach(&session.connection_id);
}

/// Main session event loop: read client ops, forward outbound events, enforce heartbeat.
async fn run_session(
    state: &AppState,
    session: &ConnectionSession,
    identity: &Identity,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut outbound_rx: mpsc::Receiver<Arc<OutboundEvent>>,
) {
    let send_timeout = state.config.send_timeout;

    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                };

                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(_) => {
                        let _ = send_close(&mut ws_tx, CLOSE_DECODE_ERROR, "Invalid JSON").await;
                        break;
                    }
                };

                let response = match client_msg.op {
                    OP_HEARTBEAT => {
                        got_heartbeat = true;
                        let payload: HeartbeatPayload =
                            serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                        HubMessage::heartbeat_ack(payload.seq)
                    }
                    OP_SEND_PRIVATE => {
                        let result = match serde_json::from_value::<SendPrivatePayload>(client_msg.d) {
                            Ok(p) => state
                                .router
                                .send_private(identity, &p.receiver_id, &p.content)
                                .await
                                .and_then(|report| to_data(&report)),
                            Err(_) => Err(ChatError::validation("d", "Expected {receiver_id, content}")),
                        };
                        reply(client_msg.nonce, result)
                    }
                    OP_SEND_GROUP => {
                        let result = match serde_json::from_value::<SendGroupPayload>(client_msg.d) {
                            Ok(p) => state
                                .router
                                .send_group(identity, &p.group_id, &p.content)
                                .await
                                .and_then(|report| to_data(&report)),
                            Err(_) => Err(ChatError::validation("d", "Expected {group_id, content}")),
                        };
                        reply(client_msg.nonce, result)
                    }
                    OP_LIST_CONNECTED => {
                        let users: Vec<OnlineUser> =
                            state.registry.snapshot().into_iter().map(OnlineUser::from).collect();
                        reply(client_msg.nonce, to_data(&users))
                    }
                    _ => {
                        let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                        break;
                    }
                };

                if !send_json(&mut ws_tx, &response, send_timeout).await {
                    break;
                }
            }

            event = outbound_rx.recv() => {
                let Some(event) = event else {
                    // Detached from the hub.
                    break;
                };
                if session.state() != SessionState::Connected {
                    break;
                }
                let msg = event.to_dispatch(session.next_seq());
                if !send_json(&mut ws_tx, &msg, send_timeout).await {
                    break;
                }
            }

            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

fn reply(nonce: Option<String>, result: Result<Value, ChatError>) -> HubMessage {
    match result {
        Ok(data) => HubMessage::reply_ok(nonce, data),
        Err(err) => HubMessage::reply_err(nonce, err.code(), &err.public_message(), err.is_retryable()),
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, ChatError> {
    serde_json::to_value(value).map_err(|e| ChatError::Storage(e.to_string()))
}

/// Write one JSON frame. Returns false when the connection should be dropped:
/// the write failed or the client did not accept it within `send_timeout`.
async fn send_json<T: Serialize>(ws_tx: &mut WsSink, msg: &T, send_timeout: Duration) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(?e, "failed to encode hub message");
            return true;
        }
    };
    match time::timeout(send_timeout, ws_tx.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(?e, "ws write error");
            false
        }
        Err(_) => {
            tracing::debug!("ws write timed out");
            false
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
