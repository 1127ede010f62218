//! Bounded exponential-backoff retry for queue publishing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{NotificationQueue, NotificationRequest, QueueError};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in ±30%.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retries `Retryable` publish failures of the wrapped queue. Other errors
/// are returned immediately.
pub struct RetryingQueue {
    inner: Arc<dyn NotificationQueue>,
    config: RetryConfig,
}

impl RetryingQueue {
    pub fn new(inner: Arc<dyn NotificationQueue>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl NotificationQueue for RetryingQueue {
    async fn publish(&self, request: &NotificationRequest) -> Result<(), QueueError> {
        let mut attempt = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            match self.inner.publish(request).await {
                Ok(()) => return Ok(()),
                Err(QueueError::Retryable(reason)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = jittered(backoff, self.config.jitter);
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        ?delay,
                        %reason,
                        receiver_id = %request.receiver_id,
                        "notification publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    backoff = Duration::from_millis(
                        (backoff.as_millis() as f64 * self.config.backoff_multiplier)
                            .min(self.config.max_backoff.as_millis() as f64) as u64,
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jittered(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.7..1.3);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;

    use super::*;

    /// Fails with `Retryable` for the first `failures` attempts.
    struct FlakyQueue {
        failures: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl NotificationQueue for FlakyQueue {
        async fn publish(&self, _request: &NotificationRequest) -> Result<(), QueueError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(QueueError::Retryable("broker down".into()))
            } else {
                Ok(())
            }
        }
    }

    struct RejectingQueue {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl NotificationQueue for RejectingQueue {
        async fn publish(&self, _request: &NotificationRequest) -> Result<(), QueueError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::Rejected("too large".into()))
        }
    }

    fn request() -> NotificationRequest {
        NotificationRequest {
            sender_id: "a".into(),
            sender_name: "Alice".into(),
            receiver_id: "b".into(),
            content: "hi".into(),
            created_at: Utc::now(),
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let inner = Arc::new(FlakyQueue {
            failures: 2,
            attempts: AtomicU32::new(0),
        });
        let queue = RetryingQueue::new(inner.clone(), fast_config(3));

        queue.publish(&request()).await.unwrap();
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(FlakyQueue {
            failures: u32::MAX,
            attempts: AtomicU32::new(0),
        });
        let queue = RetryingQueue::new(inner.clone(), fast_config(2));

        let result = queue.publish(&request()).await;
        assert!(matches!(result, Err(QueueError::Retryable(_))));
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let inner = Arc::new(RejectingQueue {
            attempts: AtomicU32::new(0),
        });
        let queue = RetryingQueue::new(inner.clone(), fast_config(5));

        assert!(matches!(
            queue.publish(&request()).await,
            Err(QueueError::Rejected(_))
        ));
        assert_eq!(inner.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(base, true);
            assert!(d >= Duration::from_millis(700) && d <= Duration::from_millis(1300));
        }
        assert_eq!(jittered(base, false), base);
    }
}
