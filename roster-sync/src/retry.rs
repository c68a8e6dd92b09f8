//! Bounded retry around a single remote call.
//!
//! Quota and transient backend failures are retried after a backoff wait, up
//! to `max_attempts` calls in total. Not-found and every other failure end the
//! loop immediately. Both the call and the wait race the run's cancellation
//! token.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use roster_core::{DirectoryError, RetryConfig};

use crate::outcome::EntityRef;

/// Why a retried call produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DirectoryError },

    #[error("{0}")]
    Fatal(DirectoryError),

    #[error("cancelled")]
    Cancelled,
}

/// Attempt bound and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Fixed `backoff` between attempts.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            max_backoff: backoff,
            multiplier: 1.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let backoff = Duration::from_secs(config.backoff_secs);
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff,
            max_backoff: Duration::from_secs(config.max_backoff_secs).max(backoff),
            multiplier: config.multiplier.max(1.0),
        }
    }

    /// Grow each wait by `multiplier`, never past `max_backoff`.
    pub fn with_growth(mut self, multiplier: f64, max_backoff: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_backoff = max_backoff.max(self.backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.multiplier <= 1.0 {
            return self.backoff;
        }
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails for good, or the budget runs out.
    ///
    /// `op` is called once per attempt and must start a fresh remote call each
    /// time.
    pub async fn run<T, F, Fut>(
        &self,
        target: &EntityRef,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(entity = %target, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(DirectoryError::NotFound(message)) => {
                    return Err(RetryError::NotFound(message));
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => {
                    tracing::error!(entity = %target, error = %err, "remote call failed");
                    return Err(RetryError::Fatal(err));
                }
            };

            if attempt >= self.max_attempts {
                tracing::warn!(
                    entity = %target,
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                entity = %target,
                attempt,
                max_attempts = self.max_attempts,
                ?delay,
                error = %err,
                "retryable failure, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use roster_core::types::EntityKind;
    use tokio::time::Instant;

    fn target() -> EntityRef {
        EntityRef::new(EntityKind::User, "u1")
    }

    /// Fails with `err` on the first `failures` calls, then succeeds.
    fn flaky(
        failures: u32,
        err: DirectoryError,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str, DirectoryError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                std::future::ready(Err(err.clone()))
            } else {
                std::future::ready(Ok("ok"))
            }
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn quota_failures_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let started = Instant::now();

        let value = policy
            .run(
                &target(),
                &CancellationToken::new(),
                flaky(3, DirectoryError::QuotaExceeded("q".into()), calls.clone()),
            )
            .await
            .expect("eventually succeeds");

        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 4, "N failures + 1 success");
        assert!(started.elapsed() >= Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn backend_failures_exhaust_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(60));

        let err = policy
            .run(
                &target(),
                &CancellationToken::new(),
                flaky(10, DirectoryError::Backend("503".into()), calls.clone()),
            )
            .await
            .expect_err("budget exhausted");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }), "got {err:?}");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn not_found_and_other_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));

        let calls = Arc::new(AtomicU32::new(0));
        let err = policy
            .run(
                &target(),
                &CancellationToken::new(),
                flaky(1, DirectoryError::NotFound("u1".into()), calls.clone()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, RetryError::NotFound("u1".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let err = policy
            .run(
                &target(),
                &CancellationToken::new(),
                flaky(1, DirectoryError::Other("403".into()), calls.clone()),
            )
            .await
            .unwrap_err();
        assert_eq!(err, RetryError::Fatal(DirectoryError::Other("403".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn cancellation_interrupts_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(100, Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = policy
            .run(
                &target(),
                &cancel,
                flaky(u32::MAX, DirectoryError::QuotaExceeded("q".into()), calls.clone()),
            )
            .await
            .unwrap_err();

        assert_eq!(err, RetryError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10))
            .with_growth(2.0, Duration::from_secs(35));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(35));
        assert_eq!(policy.delay_for(30), Duration::from_secs(35));
    }

    #[test]
    fn unbounded_cap_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 100,
            backoff_secs: 60,
            max_backoff_secs: u64::MAX,
            multiplier: 2.0,
        });
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(70), Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn default_matches_config_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
    }
}
