//! Bounded exponential backoff with jitter for convergence steps.
//!
//! A condition is polled until it reports done. Errors whose provider code is
//! in the caller's retryable list are remembered and polling continues; any
//! other error aborts immediately.
//!
//! # Example
//!
//! ```ignore
//! use stratus_common::retry::{wait_for_with_retryable, Backoff};
//!
//! wait_for_with_retryable(
//!     &Backoff::default(),
//!     "authorize ingress",
//!     || async { client.authorize(&group, &rules).await.map(|_| true) },
//!     &[codes::SECURITY_GROUP_PROCESSING],
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::duration_ms;
use crate::Error;

/// Backoff schedule for polling a condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    /// Delay before the second attempt
    #[serde(with = "duration_ms", rename = "initialDelayMs")]
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub factor: f64,
    /// Extra random delay as a fraction of the current delay (0.5 = up to 50%)
    pub jitter: f64,
    /// Maximum number of attempts
    pub steps: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.71,
            jitter: 0.5,
            steps: 10,
        }
    }
}

impl Backoff {
    /// Apply random jitter in `[delay, delay * (1 + jitter))`
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.jitter);
        delay + delay.mul_f64(extra)
    }
}

/// Poll `condition` until it reports done, aborting on any error.
///
/// Returns [`Error::Timeout`] when the attempts run out.
pub async fn wait_for<F, Fut>(backoff: &Backoff, operation: &str, condition: F) -> crate::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<bool>>,
{
    wait_for_with_retryable(backoff, operation, condition, &[]).await
}

/// Poll `condition` until it reports done, tolerating the given error codes.
///
/// - `Ok(true)` stops with success
/// - `Ok(false)` means not ready yet and keeps polling
/// - an error with a code in `retryable` is recorded and polling continues
/// - any other error is returned immediately
///
/// When attempts run out, the error recorded on the final attempt is returned,
/// or [`Error::Timeout`] if the final attempt did not fail.
pub async fn wait_for_with_retryable<F, Fut>(
    backoff: &Backoff,
    operation: &str,
    mut condition: F,
    retryable: &[&str],
) -> crate::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<bool>>,
{
    let mut delay = backoff.initial_delay;
    let mut last_retryable: Option<Error> = None;

    for attempt in 1..=backoff.steps {
        last_retryable = None;

        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                debug!(operation = %operation, attempt, "Condition not met yet");
            }
            Err(e) => match e.code() {
                Some(code) if retryable.contains(&code) => {
                    warn!(
                        operation = %operation,
                        attempt,
                        code,
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    last_retryable = Some(e);
                }
                _ => return Err(e),
            },
        }

        if attempt == backoff.steps {
            break;
        }

        tokio::time::sleep(backoff.jittered(delay)).await;
        delay = delay.mul_f64(backoff.factor);
    }

    warn!(operation = %operation, steps = backoff.steps, "Gave up waiting");
    Err(last_retryable.unwrap_or_else(|| Error::timeout(operation)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{AUTH_FAILURE, SECURITY_GROUP_PROCESSING};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(steps: u32) -> Backoff {
        Backoff {
            initial_delay: Duration::from_millis(1),
            factor: 1.71,
            jitter: 0.5,
            steps,
        }
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result = wait_for(&fast(3), "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Story: A busy group rejects a mutation twice, then accepts it
    #[tokio::test]
    async fn story_retryable_code_retried_until_success() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for_with_retryable(
            &fast(10),
            "authorize",
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::api(SECURITY_GROUP_PROCESSING, "busy"))
                    } else {
                        Ok(true)
                    }
                }
            },
            &[SECURITY_GROUP_PROCESSING],
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    /// Story: A non-retryable code is never retried, not even once
    #[tokio::test]
    async fn story_non_retryable_code_aborts_on_first_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for_with_retryable(
            &fast(10),
            "authorize",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>(Error::api(AUTH_FAILURE, "denied"))
                }
            },
            &[SECURITY_GROUP_PROCESSING],
        )
        .await;

        assert_eq!(result.unwrap_err().code(), Some(AUTH_FAILURE));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_without_code_abort() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for_with_retryable(
            &fast(5),
            "op",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>(Error::internal("transport closed"))
                }
            },
            &[SECURITY_GROUP_PROCESSING],
        )
        .await;

        assert!(matches!(result, Err(Error::Internal { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_retryable_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for_with_retryable(
            &fast(4),
            "revoke",
            || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>(Error::api(SECURITY_GROUP_PROCESSING, "busy"))
                }
            },
            &[SECURITY_GROUP_PROCESSING],
        )
        .await;

        assert_eq!(
            result.unwrap_err().code(),
            Some(SECURITY_GROUP_PROCESSING)
        );
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_not_ready_forever_times_out() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for(&fast(3), "instance running", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
        })
        .await;

        match result {
            Err(Error::Timeout { operation }) => assert_eq!(operation, "instance running"),
            other => panic!("Expected Timeout, got {:?}", other),
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recorded_error_cleared_by_later_not_ready() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        // Busy first, then merely not ready: the busy error is stale
        let result = wait_for_with_retryable(
            &fast(2),
            "op",
            || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::api(SECURITY_GROUP_PROCESSING, "busy"))
                    } else {
                        Ok(false)
                    }
                }
            },
            &[SECURITY_GROUP_PROCESSING],
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_zero_steps_never_calls_condition() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = wait_for(&fast(0), "op", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff::default();
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = backoff.jittered(base);
            assert!(d >= base);
            assert!(d < Duration::from_millis(1500));
        }

        let no_jitter = Backoff {
            jitter: 0.0,
            ..Backoff::default()
        };
        assert_eq!(no_jitter.jittered(base), base);
    }

    #[test]
    fn test_default_schedule() {
        let backoff = Backoff::default();
        assert_eq!(backoff.initial_delay, Duration::from_secs(1));
        assert_eq!(backoff.factor, 1.71);
        assert_eq!(backoff.jitter, 0.5);
        assert_eq!(backoff.steps, 10);
    }
}
