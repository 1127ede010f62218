use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{NotificationQueue, NotificationRequest, QueueError};

/// In-process queue over an unbounded channel. The paired receiver is the
/// consumer side.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<NotificationRequest>,
}

impl MemoryQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn publish(&self, request: &NotificationRequest) -> Result<(), QueueError> {
        self.tx.send(request.clone()).map_err(|_| QueueError::Closed)
    }
}

/// Consume requests until every producer is dropped. No push provider is
/// wired in-process, so requests are only logged.
pub async fn drain_to_log(mut rx: mpsc::UnboundedReceiver<NotificationRequest>) {
    while let Some(request) = rx.recv().await {
        tracing::info!(
            sender_id = %request.sender_id,
            receiver_id = %request.receiver_id,
            created_at = %request.created_at,
            "offline notification ready for push delivery"
        );
    }
    tracing::debug!("notification consumer stopped");
}
