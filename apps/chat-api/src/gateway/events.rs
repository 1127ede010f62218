//! Hub opcodes, event names, and wire-format messages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::message::Message;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_DISPATCH: u8 = 0;
pub const OP_HEARTBEAT: u8 = 1;
pub const OP_SEND_PRIVATE: u8 = 2;
pub const OP_SEND_GROUP: u8 = 3;
pub const OP_LIST_CONNECTED: u8 = 4;
pub const OP_REPLY: u8 = 5;
pub const OP_HEARTBEAT_ACK: u8 = 6;

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
#[derive(Debug, Clone, Serialize)]
pub struct HubMessage {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    pub d: Value,
}

impl HubMessage {
    /// Build a DISPATCH message (op=0).
    pub fn dispatch(event_name: &str, seq: u64, data: Value) -> Self {
        Self {
            op: OP_DISPATCH,
            t: Some(event_name.to_string()),
            s: Some(seq),
            d: data,
        }
    }

    /// Build a HEARTBEAT_ACK message (op=6).
    pub fn heartbeat_ack(seq: u64) -> Self {
        Self {
            op: OP_HEARTBEAT_ACK,
            t: None,
            s: None,
            d: json!({ "ack": seq }),
        }
    }

    /// Build a successful REPLY (op=5) to a client invocation.
    pub fn reply_ok(nonce: Option<String>, data: Value) -> Self {
        Self {
            op: OP_REPLY,
            t: None,
            s: None,
            d: json!({ "nonce": nonce, "ok": true, "data": data }),
        }
    }

    /// Build a failed REPLY (op=5). `retryable` tells the client whether
    /// resending the same op may succeed.
    pub fn reply_err(nonce: Option<String>, code: &str, message: &str, retryable: bool) -> Self {
        Self {
            op: OP_REPLY,
            t: None,
            s: None,
            d: json!({
                "nonce": nonce,
                "ok": false,
                "error": { "code": code, "message": message, "retryable": retryable },
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    /// Echoed back in the REPLY so clients can correlate invocations.
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Deserialize)]
pub struct SendPrivatePayload {
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendGroupPayload {
    pub group_id: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Dispatch event types
// ---------------------------------------------------------------------------

/// Event names dispatched to clients.
pub struct EventName;

impl EventName {
    pub const READY: &'static str = "READY";
    pub const MESSAGE_CREATE: &'static str = "MESSAGE_CREATE";
    pub const USER_CONNECTED: &'static str = "USER_CONNECTED";
    pub const USER_DISCONNECTED: &'static str = "USER_DISCONNECTED";
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// An event queued for delivery to one or more connections. Each connection
/// stamps its own sequence number when it writes the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub name: &'static str,
    pub data: Value,
}

impl OutboundEvent {
    pub fn message_create(message: &Message, sender_name: &str) -> Self {
        Self {
            name: EventName::MESSAGE_CREATE,
            data: json!({
                "id": message.id.to_string(),
                "kind": message.kind,
                "sender_id": message.sender_id,
                "sender_name": sender_name,
                "receiver_id": message.receiver_id,
                "content": message.content,
                "created_at": message.created_at,
            }),
        }
    }

    pub fn user_connected(user_id: &str, display_name: &str) -> Self {
        Self {
            name: EventName::USER_CONNECTED,
            data: json!({ "user_id": user_id, "display_name": display_name }),
        }
    }

    pub fn user_disconnected(user_id: &str) -> Self {
        Self {
            name: EventName::USER_DISCONNECTED,
            data: json!({ "user_id": user_id }),
        }
    }

    pub fn to_dispatch(&self, seq: u64) -> HubMessage {
        HubMessage::dispatch(self.name, seq, self.data.clone())
    }
}
