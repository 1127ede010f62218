//! Presence fan-out on first/last connection transitions.
//!
//! Coming online is announced only to the user's contacts who are connected.
//! Going offline is broadcast to every other connected user: the set of
//! clients that may still show the user as online is unbounded without a
//! contact lookup, and the disconnect path should not wait on one.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::db::store::{StoreError, UserDirectory};

use super::events::OutboundEvent;
use super::hub::Transport;
use super::registry::ConnectionRegistry;

pub struct PresenceNotifier {
    users: Arc<dyn UserDirectory>,
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn Transport>,
}

impl PresenceNotifier {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            users,
            registry,
            transport,
        }
    }

    /// Users who should hear that `user_id` came online.
    pub async fn users_to_notify(&self, user_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let contacts = self.users.contacts_of(user_id).await?;
        Ok(contacts.into_iter().filter(|id| id != user_id).collect())
    }

    /// Announce an online transition to connected contacts. Best-effort: a
    /// failed contact lookup is logged and the announcement skipped.
    /// Returns the number of connections reached.
    pub async fn notify_online(&self, user_id: &str, display_name: &str) -> usize {
        let recipients = match self.users_to_notify(user_id).await {
            Ok(recipients) => recipients,
            Err(err) => {
                tracing::warn!(user_id, %err, "presence lookup failed, skipping online notification");
                return 0;
            }
        };

        let connection_ids: Vec<String> = recipients
            .iter()
            .flat_map(|id| self.registry.list_connections(id))
            .collect();
        if connection_ids.is_empty() {
            return 0;
        }

        let delivered = self
            .transport
            .send_to_connections(&connection_ids, OutboundEvent::user_connected(user_id, display_name));
        tracing::debug!(user_id, delivered, "user online notified");
        delivered
    }

    /// Announce an offline transition to everyone else connected.
    pub fn notify_offline(&self, user_id: &str) -> usize {
        let delivered = self
            .transport
            .broadcast_except(user_id, OutboundEvent::user_disconnected(user_id));
        tracing::debug!(user_id, delivered, "user offline notified");
        delivered
    }
}
