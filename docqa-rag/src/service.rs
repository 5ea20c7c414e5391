//! Deadlines and retries for calls to external model services.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// Await `future`, failing with [`RagError::ServiceTimeout`] once `timeout` elapses.
pub async fn call_with_deadline<T, F>(service: &str, timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(service, ?timeout, "service call timed out");
            Err(RagError::ServiceTimeout { service: service.to_string(), timeout })
        }
    }
}

/// Exponential backoff applied to retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_retries: 0, initial_backoff: Duration::ZERO }
    }

    /// Retry up to `max_retries` times, starting from a 500 ms backoff.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, initial_backoff: Duration::from_millis(500) }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// The deadline and retry policy wrapped around every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Retry behavior after a retryable failure.
    pub retry: RetryPolicy,
}

impl CallPolicy {
    /// Build the policy from `REQUEST_TIMEOUT_SECS` and `MAX_RETRIES`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self { timeout: config.request_timeout(), retry: RetryPolicy::new(config.max_retries) }
    }

    /// Run `operation`, applying the deadline to each attempt.
    pub async fn call<T, F, Fut>(&self, service: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.retry.initial_backoff;
        loop {
            match call_with_deadline(service, self.timeout, operation()).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(service, attempt, ?backoff, error = %e, "retrying service call");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), retry: RetryPolicy::none() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out() {
        let result: Result<()> =
            call_with_deadline("llm", Duration::from_secs(5), std::future::pending()).await;
        match result {
            Err(RagError::ServiceTimeout { service, timeout }) => {
                assert_eq!(service, "llm");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_timeouts_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = CallPolicy { timeout: Duration::from_secs(1), retry: RetryPolicy::new(2) };

        let counter = Arc::clone(&attempts);
        let value = policy
            .call("embedder", move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        std::future::pending::<()>().await;
                    }
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_configuration_defects() {
        let attempts = AtomicU32::new(0);
        let policy = CallPolicy { timeout: Duration::from_secs(1), retry: RetryPolicy::new(3) };

        let result: Result<()> = policy
            .call("embedder", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RagError::ModelLoadError {
                        provider: "test".into(),
                        model: "missing".into(),
                        message: "not found".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RagError::ModelLoadError { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
