//! Connect/disconnect orchestration for a single physical connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::db::store::GroupDirectory;
use crate::error::ChatError;
use crate::models::group::Group;

use super::hub::Transport;
use super::presence::PresenceNotifier;
use super::registry::ConnectionRegistry;
use super::session::ConnectionSession;

pub struct SessionLifecycle {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<dyn GroupDirectory>,
    presence: Arc<PresenceNotifier>,
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
}

impl SessionLifecycle {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        groups: Arc<dyn GroupDirectory>,
        presence: Arc<PresenceNotifier>,
        transport: Arc<dyn Transport>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            groups,
            presence,
            transport,
            connect_timeout,
        }
    }

    /// Run the Connecting phase. Memberships are resolved before anything is
    /// registered, so a failed or timed-out lookup rejects the connection
    /// with no registry entry left behind.
    pub async fn connect(&self, session: &ConnectionSession) -> Result<Vec<Group>, ChatError> {
        let groups = timeout(
            self.connect_timeout,
            self.groups.groups_for_user(&session.user_id),
        )
        .await??;

        for group in &groups {
            self.transport
                .subscribe_to_group(&session.connection_id, &group.id);
        }

        let first = self.registry.add_connection(
            &session.user_id,
            &session.connection_id,
            &session.display_name,
        );

        if !session.mark_connected() {
            self.roll_back(session, first);
            return Err(ChatError::NotFound("Connection closed during connect".to_string()));
        }

        tracing::info!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            first,
            groups = groups.len(),
            "connection established"
        );

        if first {
            match timeout(
                self.connect_timeout,
                self.presence
                    .notify_online(&session.user_id, &session.display_name),
            )
            .await
            {
                Ok(_) => {}
                Err(_) => tracing::warn!(user_id = %session.user_id, "online notification timed out"),
            }
        }

        Ok(groups)
    }

    /// Undo a registration whose disconnect won the race and found nothing to
    /// remove. If the user's other connections left meanwhile, nobody has
    /// announced the user offline yet.
    fn roll_back(&self, session: &ConnectionSession, first: bool) {
        let last = self
            .registry
            .remove_connection(&session.user_id, &session.connection_id);
        if last && !first {
            self.presence.notify_offline(&session.user_id);
        }
        tracing::debug!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            last,
            "connect abandoned after disconnect"
        );
    }

    /// Run the Disconnected phase. Safe to call from every exit path; only the
    /// first call has an effect. Returns whether this was the user's last
    /// connection.
    pub fn disconnect(&self, session: &ConnectionSession) -> bool {
        if !session.begin_disconnect() {
            return false;
        }

        let last = self
            .registry
            .remove_connection(&session.user_id, &session.connection_id);
        if last {
            self.presence.notify_offline(&session.user_id);
        }

        tracing::info!(
            user_id = %session.user_id,
            connection_id = %session.connection_id,
            last,
            "connection closed"
        );
        last
    }
}
