//! Private and group message routing.
//!
//! Every send persists first. Only an acknowledged message is delivered live
//! or handed to the notification queue, so a recipient can never see a
//! message that later fails to appear in history.

use std::sync::Arc;
use std::time::Duration;

use chat_common::{is_valid_id, SnowflakeGenerator};
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;

use crate::db::store::{GroupDirectory, MessageRepository};
use crate::error::ChatError;
use crate::models::message::{ChatKind, Message, NewMessage};
use crate::models::user::Identity;
use crate::queue::{NotificationQueue, NotificationRequest};

use super::events::OutboundEvent;
use super::hub::Transport;
use super::registry::ConnectionRegistry;

pub const MAX_CONTENT_LEN: usize = 4000;

/// Outcome of a successful send.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub message: Message,
    /// Live connections that accepted the event.
    pub delivered_connections: usize,
    /// Offline recipients whose notification was enqueued.
    pub queued_notifications: usize,
}

pub struct MessageRouter {
    messages: Arc<dyn MessageRepository>,
    groups: Arc<dyn GroupDirectory>,
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn Transport>,
    queue: Arc<dyn NotificationQueue>,
    ids: SnowflakeGenerator,
    send_timeout: Duration,
}

impl MessageRouter {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        groups: Arc<dyn GroupDirectory>,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn Transport>,
        queue: Arc<dyn NotificationQueue>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            groups,
            registry,
            transport,
            queue,
            ids: SnowflakeGenerator::new(0),
            send_timeout,
        }
    }

    /// Send a private message. Delivered only to the receiver's own
    /// connections; an offline receiver gets one notification request.
    pub async fn send_private(
        &self,
        sender: &Identity,
        receiver_id: &str,
        content: &str,
    ) -> Result<DeliveryReport, ChatError> {
        validate_id("receiver_id", receiver_id)?;
        if receiver_id == sender.user_id {
            return Err(ChatError::validation(
                "receiver_id",
                "Cannot send a private message to yourself",
            ));
        }
        let content = validate_content(content)?;

        let message = self
            .persist(ChatKind::Private, sender, receiver_id, content)
            .await?;

        let connections = self.registry.list_connections(receiver_id);
        let mut report = DeliveryReport {
            message,
            delivered_connections: 0,
            queued_notifications: 0,
        };

        if connections.is_empty() {
            if self.notify_offline(&report.message, sender, receiver_id).await {
                report.queued_notifications = 1;
            }
        } else {
            let connections: Vec<String> = connections.into_iter().collect();
            report.delivered_connections = self.transport.send_to_connections(
                &connections,
                OutboundEvent::message_create(&report.message, &sender.display_name),
            );
        }

        tracing::debug!(
            message_id = report.message.id,
            sender_id = %sender.user_id,
            receiver_id,
            delivered = report.delivered_connections,
            queued = report.queued_notifications,
            "private message routed"
        );
        Ok(report)
    }

    /// Send a message to a group the sender belongs to. Fan-out is per member:
    /// online members get the event on each of their connections, each
    /// offline member gets their own notification request. The sender is
    /// skipped.
    pub async fn send_group(
        &self,
        sender: &Identity,
        group_id: &str,
        content: &str,
    ) -> Result<DeliveryReport, ChatError> {
        validate_id("group_id", group_id)?;
        let content = validate_content(content)?;

        let group = timeout(
            self.send_timeout,
            self.groups.group_for_member(&sender.user_id, group_id),
        )
        .await??
        .ok_or_else(|| ChatError::Forbidden("You are not a member of this group".to_string()))?;

        let message = self
            .persist(ChatKind::Group, sender, &group.id, content)
            .await?;

        let mut online = Vec::new();
        let mut offline = Vec::new();
        for member_id in group.member_ids.iter().filter(|m| **m != sender.user_id) {
            let connections = self.registry.list_connections(member_id);
            if connections.is_empty() {
                offline.push(member_id.as_str());
            } else {
                online.extend(connections);
            }
        }

        let delivered_connections = if online.is_empty() {
            0
        } else {
            self.transport.send_to_connections(
                &online,
                OutboundEvent::message_create(&message, &sender.display_name),
            )
        };

        let queued_notifications = join_all(
            offline
                .iter()
                .map(|member_id| self.notify_offline(&message, sender, member_id)),
        )
        .await
        .into_iter()
        .filter(|queued| *queued)
        .count();

        tracing::debug!(
            message_id = message.id,
            sender_id = %sender.user_id,
            group_id,
            delivered = delivered_connections,
            queued = queued_notifications,
            "group message routed"
        );
        Ok(DeliveryReport {
            message,
            delivered_connections,
            queued_notifications,
        })
    }

    async fn persist(
        &self,
        kind: ChatKind,
        sender: &Identity,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message, ChatError> {
        let new_message = NewMessage {
            id: self.ids.generate(),
            kind,
            sender_id: sender.user_id.clone(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let message = timeout(self.send_timeout, self.messages.insert_message(new_message)).await??;
        Ok(message)
    }

    /// Hand one offline recipient to the queue. Failures are logged and
    /// swallowed: the message is already stored.
    async fn notify_offline(&self, message: &Message, sender: &Identity, receiver_id: &str) -> bool {
        let request = NotificationRequest {
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name.clone(),
            receiver_id: receiver_id.to_string(),
            content: message.content.clone(),
            created_at: message.created_at,
        };
        match timeout(self.send_timeout, self.queue.publish(&request)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(message_id = message.id, receiver_id, %err, "notification publish failed");
                false
            }
            Err(_) => {
                tracing::warn!(message_id = message.id, receiver_id, "notification publish timed out");
                false
            }
        }
    }
}

fn validate_id(field: &'static str, id: &str) -> Result<(), ChatError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ChatError::validation(field, "Malformed identifier"))
    }
}

fn validate_content(content: &str) -> Result<&str, ChatError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::validation("content", "Message content is required"));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ChatError::validation(
            "content",
            format!("Message content must be at most {MAX_CONTENT_LEN} characters"),
        ));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::db::store::{GroupFilter, MemoryStore, MessageQuery, StoreError};
    use crate::models::group::Group;
    use crate::gateway::events::EventName;
    use crate::gateway::hub::ConnectionHub;
    use crate::queue::{MemoryQueue, QueueError};

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<ConnectionRegistry>,
        hub: Arc<ConnectionHub>,
        notifications: mpsc::UnboundedReceiver<NotificationRequest>,
        router: MessageRouter,
    }

    fn fixture() -> Fixture {
        let (queue, notifications) = MemoryQueue::new();
        fixture_with(Arc::new(queue), notifications)
    }

    fn fixture_with(
        queue: Arc<dyn NotificationQueue>,
        notifications: mpsc::UnboundedReceiver<NotificationRequest>,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.upsert_group("grp_1", "Team", &["usr_a", "usr_b", "usr_c"]);
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Arc::new(ConnectionHub::new());
        let router = MessageRouter::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            hub.clone(),
            queue,
            Duration::from_secs(1),
        );
        Fixture {
            store,
            registry,
            hub,
            notifications,
            router,
        }
    }

    fn connect(f: &Fixture, user_id: &str, connection_id: &str) -> mpsc::Receiver<Arc<OutboundEvent>> {
        let rx = f.hub.attach(connection_id, user_id);
        f.registry.add_connection(user_id, connection_id, user_id);
        rx
    }

    fn alice() -> Identity {
        Identity::new("usr_a", "Alice")
    }

    #[tokio::test]
    async fn group_send_delivers_to_online_members_and_queues_offline() {
        let mut f = fixture();
        let mut a = connect(&f, "usr_a", "cx_a");
        let mut c1 = connect(&f, "usr_c", "cx_c1");
        let mut c2 = connect(&f, "usr_c", "cx_c2");

        let report = f.router.send_group(&alice(), "grp_1", "hello team").await.unwrap();

        assert_eq!(f.store.message_count(), 1);
        assert_eq!(report.message.kind, ChatKind::Group);
        assert_eq!(report.message.receiver_id, "grp_1");
        assert_eq!(report.delivered_connections, 2);
        assert_eq!(report.queued_notifications, 1);

        assert_eq!(c1.try_recv().unwrap().name, EventName::MESSAGE_CREATE);
        assert_eq!(c2.try_recv().unwrap().name, EventName::MESSAGE_CREATE);
        assert!(a.try_recv().is_err());

        let request = f.notifications.try_recv().unwrap();
        assert_eq!(request.receiver_id, "usr_b");
        assert_eq!(request.sender_name, "Alice");
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn private_send_to_offline_user_only_queues() {
        let mut f = fixture();
        let mut other = connect(&f, "usr_c", "cx_c");

        let report = f.router.send_private(&alice(), "usr_b", "ping").await.unwrap();

        assert_eq!(f.store.message_count(), 1);
        assert_eq!(report.delivered_connections, 0);
        assert_eq!(report.queued_notifications, 1);
        assert!(other.try_recv().is_err());

        let request = f.notifications.try_recv().unwrap();
        assert_eq!(request.sender_id, "usr_a");
        assert_eq!(request.receiver_id, "usr_b");
        assert_eq!(request.content, "ping");
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn private_send_to_online_user_reaches_only_their_connections() {
        let mut f = fixture();
        let mut b = connect(&f, "usr_b", "cx_b");
        let mut c = connect(&f, "usr_c", "cx_c");

        let report = f.router.send_private(&alice(), "usr_b", "  hi  ").await.unwrap();

        assert_eq!(report.message.content, "hi");
        assert_eq!(report.delivered_connections, 1);
        let event = b.try_recv().unwrap();
        assert_eq!(event.data["content"], "hi");
        assert!(c.try_recv().is_err());
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn vanished_connection_is_not_an_error() {
        let f = fixture();
        f.registry.add_connection("usr_b", "cx_gone", "Bob");

        let report = f.router.send_private(&alice(), "usr_b", "hi").await.unwrap();

        assert_eq!(report.delivered_connections, 0);
        assert_eq!(report.queued_notifications, 0);
        assert_eq!(f.store.message_count(), 1);
    }

    #[tokio::test]
    async fn validation_errors_have_no_side_effects() {
        let mut f = fixture();

        for (receiver, content, field) in [
            ("", "hi", "receiver_id"),
            ("usr b", "hi", "receiver_id"),
            ("usr_a", "hi", "receiver_id"),
            ("usr_b", "   ", "content"),
        ] {
            let err = f.router.send_private(&alice(), receiver, content).await.unwrap_err();
            match err {
                ChatError::Validation { field: got, .. } => assert_eq!(got, field),
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        let long = "x".repeat(MAX_CONTENT_LEN + 1);
        assert!(matches!(
            f.router.send_group(&alice(), "grp_1", &long).await,
            Err(ChatError::Validation { field: "content", .. })
        ));
        assert_eq!(f.store.message_count(), 0);
        assert!(f.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_member_group_send_is_forbidden_before_persisting() {
        let mut f = fixture();
        let _b = connect(&f, "usr_b", "cx_b");
        let outsider = Identity::new("usr_z", "Zed");

        let err = f.router.send_group(&outsider, "grp_1", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        let err = f.router.send_group(&alice(), "grp_missing", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        assert_eq!(f.store.message_count(), 0);
        assert!(f.notifications.try_recv().is_err());
    }

    struct FailingMessages;

    #[async_trait]
    impl MessageRepository for FailingMessages {
        async fn insert_message(&self, _message: NewMessage) -> Result<Message, StoreError> {
            Err(StoreError::Database("disk full".to_string()))
        }

        async fn query_messages(&self, _query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }

        async fn conversation_peers(&self, _user_id: &str) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn failed_write_aborts_delivery_and_notification() {
        let (queue, mut notifications) = MemoryQueue::new();
        let f = fixture();
        let router = MessageRouter::new(
            Arc::new(FailingMessages),
            f.store.clone(),
            f.registry.clone(),
            f.hub.clone(),
            Arc::new(queue),
            Duration::from_secs(1),
        );
        let mut c = connect(&f, "usr_c", "cx_c");

        let err = router.send_group(&alice(), "grp_1", "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.is_retryable());
        assert!(c.try_recv().is_err());
        assert!(notifications.try_recv().is_err());
    }

    struct SlowMessages;

    #[async_trait]
    impl MessageRepository for SlowMessages {
        async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(StoreError::Database(format!("gave up on {}", message.id)))
        }

        async fn query_messages(&self, _query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }

        async fn conversation_peers(&self, _user_id: &str) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct SlowGroups;

    #[async_trait]
    impl GroupDirectory for SlowGroups {
        async fn query_groups(&self, _filter: &GroupFilter) -> Result<Vec<Group>, StoreError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_times_out_without_delivery_or_notification() {
        let (queue, mut notifications) = MemoryQueue::new();
        let f = fixture();
        let router = MessageRouter::new(
            Arc::new(SlowMessages),
            f.store.clone(),
            f.registry.clone(),
            f.hub.clone(),
            Arc::new(queue),
            Duration::from_secs(1),
        );
        let mut b = connect(&f, "usr_b", "cx_b");

        let err = router.send_private(&alice(), "usr_b", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout));
        assert!(err.is_retryable());

        let err = router.send_group(&alice(), "grp_1", "hi team").await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout));

        assert!(b.try_recv().is_err());
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_membership_check_times_out_before_persisting() {
        let (queue, mut notifications) = MemoryQueue::new();
        let f = fixture();
        let router = MessageRouter::new(
            f.store.clone(),
            Arc::new(SlowGroups),
            f.registry.clone(),
            f.hub.clone(),
            Arc::new(queue),
            Duration::from_secs(1),
        );
        let mut c = connect(&f, "usr_c", "cx_c");

        let err = router.send_group(&alice(), "grp_1", "hi").await.unwrap_err();

        assert!(matches!(err, ChatError::Timeout));
        assert_eq!(f.store.message_count(), 0);
        assert!(c.try_recv().is_err());
        assert!(notifications.try_recv().is_err());
    }

    struct RejectingQueue;

    #[async_trait]
    impl NotificationQueue for RejectingQueue {
        async fn publish(&self, _request: &NotificationRequest) -> Result<(), QueueError> {
            Err(QueueError::Retryable("broker down".to_string()))
        }
    }

    #[tokio::test]
    async fn queue_failure_does_not_fail_the_send() {
        let (_unused, rx) = mpsc::unbounded_channel();
        let f = fixture_with(Arc::new(RejectingQueue), rx);

        let report = f.router.send_private(&alice(), "usr_b", "hi").await.unwrap();

        assert_eq!(report.queued_notifications, 0);
        assert_eq!(f.store.message_count(), 1);
    }
}
