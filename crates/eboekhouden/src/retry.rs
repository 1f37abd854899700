//! Retry with exponential backoff.
//!
//! Every upstream call and every batched write goes through
//! [`RetryPolicy::execute`] instead of growing its own retry loop.

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Exponential-backoff retry policy.
///
/// Retries only errors classified transient by
/// [`ClientError::is_transient`]; validation and auth failures pass
/// straight through.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Hard cap on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Used by dry-run probes and tests.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let millis =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(retry as i32);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Runs `operation`, retrying transient failures with growing delays.
    ///
    /// The closure is re-invoked from scratch on each attempt, so it must
    /// be cheap to rebuild (a request builder, not a consumed body).
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_transient() || attempt + 1 == attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        // Unreachable: the loop always returns. Kept for completeness.
        Err(last_err.unwrap_or(ClientError::Config("retry loop exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(5)
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ClientError::RateLimited)
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: ClientResult<()> = fast_policy(5)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Auth("bad token".to_string()))
            })
            .await;
        assert!(matches!(result, Err(ClientError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ClientResult<()> = fast_policy(3)
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::RateLimited)
            })
            .await;
        assert!(matches!(result, Err(ClientError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(5), Duration::from_millis(350));
    }
}
