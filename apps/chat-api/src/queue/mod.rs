//! Offline notification hand-off.
//!
//! The core only publishes; consumption, push delivery and dedup live
//! downstream. Delivery is at-least-once.

pub mod memory;
pub mod redis_queue;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;
pub use retry::{RetryConfig, RetryingQueue};

/// One offline-delivery work item, always addressed to an individual user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Transient broker failure; publishing again may succeed.
    #[error("queue temporarily unavailable: {0}")]
    Retryable(String),
    #[error("queue rejected request: {0}")]
    Rejected(String),
    #[error("queue closed")]
    Closed,
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Enqueue a request. Resolves on enqueue acknowledgment, never on
    /// consumption.
    async fn publish(&self, request: &NotificationRequest) -> Result<(), QueueError>;
}
