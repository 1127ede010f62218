//! Per-connection hub session state.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use chat_common::id::prefix;
use chat_common::PrefixedId;

/// Identifier of one physical connection.
pub struct ConnectionId;

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

const CONNECTING: u8 = 0;
const CONNECTED: u8 = 1;
const DISCONNECTED: u8 = 2;

/// Lifecycle phase of one physical connection. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
}

/// State for a single WebSocket connection.
pub struct ConnectionSession {
    /// Unique connection identifier (`cx_` prefixed ULID).
    pub connection_id: String,
    /// Authenticated user ID.
    pub user_id: String,
    /// Display name taken from the access token at connect time.
    pub display_name: String,
    state: AtomicU8,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl ConnectionSession {
    pub fn new(connection_id: String, user_id: String, display_name: String) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
            state: AtomicU8::new(CONNECTING),
            seq: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            CONNECTING => SessionState::Connecting,
            CONNECTED => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }

    /// Move `Connecting → Connected`. Returns false if the session already
    /// left `Connecting`.
    pub fn mark_connected(&self) -> bool {
        self.state
            .compare_exchange(CONNECTING, CONNECTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Disconnected`. Returns true only for the first caller, so the
    /// disconnect path runs once however many sources observe the closure.
    pub fn begin_disconnect(&self) -> bool {
        self.state.swap(DISCONNECTED, Ordering::AcqRel) != DISCONNECTED
    }

    /// Get the next sequence number for a dispatch event.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ConnectionSession {
        ConnectionSession::new("cx_1".into(), "usr_a".into(), "Alice".into())
    }

    #[test]
    fn follows_connecting_connected_disconnected() {
        let s = session();
        assert_eq!(s.state(), SessionState::Connecting);
        assert!(s.mark_connected());
        assert_eq!(s.state(), SessionState::Connected);
        assert!(s.begin_disconnect());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(!s.mark_connected());
    }

    #[test]
    fn disconnect_runs_once() {
        let s = session();
        assert!(s.begin_disconnect());
        assert!(!s.begin_disconnect());
    }

    #[test]
    fn connection_ids_are_prefixed() {
        assert!(ConnectionId::generate().starts_with("cx_"));
    }

    #[test]
    fn sequence_starts_at_one() {
        let s = session();
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
    }
}
