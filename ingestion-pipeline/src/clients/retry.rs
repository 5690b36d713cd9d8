use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::error::ServiceError;

/// Uniform backoff for every external collaborator: wait roughly
/// `base_delay * 2^attempt` between attempts, up to `max_retries` retries.
/// Only transient failures loop; permanent ones surface immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: usize,
    base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        // from_millis(2) doubles per attempt; factor scales to the base delay.
        ExponentialBackoff::from_millis(2)
            .factor(self.base_delay_ms.max(2) / 2)
            .map(jitter)
            .take(self.max_retries)
    }

    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        RetryIf::spawn(self.strategy(), operation, ServiceError::is_transient).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, 2);

        let result = policy
            .run(|| async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::Transient("busy".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(5, 2);

        let result: Result<(), _> = policy
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Permanent("bad input".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let attempts = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, 2);

        let result: Result<(), _> = policy
            .run(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Transient("still busy".into()))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 4, "initial call plus three retries");
    }
}
