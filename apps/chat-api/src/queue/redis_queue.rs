use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{NotificationQueue, NotificationRequest, QueueError};

/// Redis list that downstream notification workers `BRPOP` from.
pub const NOTIFICATION_LIST_KEY: &str = "chat:notifications";

pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(key = NOTIFICATION_LIST_KEY, "redis notification queue connected");
        Ok(Self {
            conn,
            key: NOTIFICATION_LIST_KEY.to_string(),
        })
    }
}

#[async_trait]
impl NotificationQueue for RedisQueue {
    async fn publish(&self, request: &NotificationRequest) -> Result<(), QueueError> {
        let payload =
            serde_json::to_string(request).map_err(|e| QueueError::Rejected(e.to_string()))?;

        // ConnectionManager is a cheap handle; it reconnects on its own.
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, payload)
            .await
            .map_err(|e| {
                tracing::warn!(?e, "redis lpush failed");
                QueueError::Retryable(e.to_string())
            })
    }
}
