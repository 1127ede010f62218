//! Transport boundary between the chat core and live connections.
//!
//! Each attached connection owns a bounded outbound channel drained by its
//! WebSocket task. Sends never await: a connection that is gone or not keeping
//! up loses the event, which is a soft failure. The message is already durable
//! and will show up on the next history fetch.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::OutboundEvent;

/// Outbound events buffered per connection before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

/// The operations the core uses to reach live connections.
pub trait Transport: Send + Sync {
    /// Deliver to each listed connection. Returns how many accepted the event.
    fn send_to_connections(&self, connection_ids: &[String], event: OutboundEvent) -> usize;

    /// Deliver to every connection not owned by `user_id`.
    fn broadcast_except(&self, user_id: &str, event: OutboundEvent) -> usize;

    /// Deliver to every connection subscribed to `group_id`.
    fn broadcast_to_group(&self, group_id: &str, event: OutboundEvent) -> usize;

    /// Add `group_id` to the connection's broadcast scopes.
    fn subscribe_to_group(&self, connection_id: &str, group_id: &str);
}

struct ConnectionHandle {
    user_id: String,
    tx: mpsc::Sender<Arc<OutboundEvent>>,
    groups: HashSet<String>,
}

/// DashMap-backed table of attached connections.
pub struct ConnectionHub {
    connections: DashMap<String, ConnectionHandle>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection and return the receiving end of its outbound
    /// channel. Re-attaching an id replaces the previous handle.
    pub fn attach(&self, connection_id: &str, user_id: &str) -> mpsc::Receiver<Arc<OutboundEvent>> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.connections.insert(
            connection_id.to_string(),
            ConnectionHandle {
                user_id: user_id.to_string(),
                tx,
                groups: HashSet::new(),
            },
        );
        rx
    }

    pub fn detach(&self, connection_id: &str) {
        self.connections.remove(connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn deliver(connection_id: &str, handle: &ConnectionHandle, event: &Arc<OutboundEvent>) -> bool {
        match handle.tx.try_send(Arc::clone(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    connection_id,
                    user_id = %handle.user_id,
                    event = event.name,
                    "outbound buffer full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection_id, event = event.name, "connection closed, dropping event");
                false
            }
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConnectionHub {
    fn send_to_connections(&self, connection_ids: &[String], event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        for connection_id in connection_ids {
            match self.connections.get(connection_id) {
                Some(handle) => {
                    if Self::deliver(connection_id, &handle, &event) {
                        delivered += 1;
                    }
                }
                None => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        event = event.name,
                        "connection vanished before delivery"
                    );
                }
            }
        }
        delivered
    }

    fn broadcast_except(&self, user_id: &str, event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        self.connections
            .iter()
            .filter(|entry| entry.user_id != user_id)
            .filter(|entry| Self::deliver(entry.key(), entry.value(), &event))
            .count()
    }

    fn broadcast_to_group(&self, group_id: &str, event: OutboundEvent) -> usize {
        let event = Arc::new(event);
        self.connections
            .iter()
            .filter(|entry| entry.groups.contains(group_id))
            .filter(|entry| Self::deliver(entry.key(), entry.value(), &event))
            .count()
    }

    fn subscribe_to_group(&self, connection_id: &str, group_id: &str) {
        if let Some(mut handle) = self.connections.get_mut(connection_id) {
            handle.groups.insert(group_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> OutboundEvent {
        OutboundEvent::user_disconnected("usr_x")
    }

    #[test]
    fn sends_only_to_listed_live_connections() {
        let hub = ConnectionHub::new();
        let mut a = hub.attach("cx_a", "usr_a");
        let mut b = hub.attach("cx_b", "usr_b");

        let delivered = hub.send_to_connections(&["cx_a".into(), "cx_gone".into()], event());

        assert_eq!(delivered, 1);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn broadcast_except_skips_every_connection_of_user() {
        let hub = ConnectionHub::new();
        let mut a1 = hub.attach("cx_a1", "usr_a");
        let mut a2 = hub.attach("cx_a2", "usr_a");
        let mut b = hub.attach("cx_b", "usr_b");

        assert_eq!(hub.broadcast_except("usr_a", event()), 1);
        assert!(a1.try_recv().is_err());
        assert!(a2.try_recv().is_err());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn group_broadcast_reaches_subscribers() {
        let hub = ConnectionHub::new();
        let mut a = hub.attach("cx_a", "usr_a");
        let mut b = hub.attach("cx_b", "usr_b");
        hub.subscribe_to_group("cx_a", "grp_1");
        hub.subscribe_to_group("cx_missing", "grp_1");

        assert_eq!(hub.broadcast_to_group("grp_1", event()), 1);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn closed_and_full_connections_are_soft_failures() {
        let hub = ConnectionHub::new();
        let closed = hub.attach("cx_closed", "usr_a");
        drop(closed);
        let _full = hub.attach("cx_full", "usr_b");
        for _ in 0..OUTBOUND_CAPACITY {
            hub.send_to_connections(&["cx_full".into()], event());
        }

        let delivered = hub.send_to_connections(&["cx_closed".into(), "cx_full".into()], event());

        assert_eq!(delivered, 0);
    }

    #[test]
    fn detach_removes_connection() {
        let hub = ConnectionHub::new();
        let _rx = hub.attach("cx_a", "usr_a");
        hub.detach("cx_a");
        hub.detach("cx_a");
        assert_eq!(hub.connection_count(), 0);
    }
}
