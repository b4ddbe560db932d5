//! Bounded retry with linear backoff for worker requests.

use std::future::Future;
use std::time::Duration;

use hoit_compute::transport::WorkerError;
use hoit_core::types::JobId;

/// Retries connection failures; every other outcome is returned as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Wait before retry `n` is `n * backoff_step`.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_step: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` retries are spent. `attempt` receives the retry number
    /// (0 for the first try).
    pub async fn run<T, F, Fut>(&self, job_id: JobId, mut attempt: F) -> Result<T, WorkerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, WorkerError>>,
    {
        let mut retry = 0;
        loop {
            match attempt(retry).await {
                Err(e) if e.is_retryable() && retry < self.max_retries => {
                    retry += 1;
                    let wait = self.backoff(retry);
                    tracing::warn!(
                        %job_id,
                        attempt = retry,
                        max_retries = self.max_retries,
                        wait_secs = wait.as_secs(),
                        error = %e,
                        "Worker unreachable, retrying",
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = policy
            .run(JobId::nil(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkerError::Connect("refused".into()))
            })
            .await;

        assert_matches!(result, Err(WorkerError::Connect(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run(JobId::nil(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WorkerError::Timeout(Duration::from_secs(1)))
            })
            .await;

        assert_matches!(result, Err(WorkerError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_later_attempt() {
        let policy = RetryPolicy::default();
        let result = policy
            .run(JobId::nil(), |retry| async move {
                if retry < 1 {
                    Err(WorkerError::Connect("refused".into()))
                } else {
                    Ok(retry)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 1);
    }
}
