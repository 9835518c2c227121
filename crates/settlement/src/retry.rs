//! Bounded retry with exponential backoff and a per-attempt timeout.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{Result, SettlementError};

/// How a remote step is retried.
///
/// Every attempt runs under `timeout`; a timed-out attempt counts as a
/// failure. Only retryable errors are attempted again, and at most
/// `max_attempts` attempts are made in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            timeout,
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Runs one attempt under the timeout.
    pub async fn attempt<T, Fut>(&self, step: &'static str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SettlementError::Timeout {
                step,
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// the attempts are used up. Returns the last error on exhaustion.
    #[tracing::instrument(skip(self, op))]
    pub async fn run<T, F, Fut>(&self, step: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        let outcome = loop {
            match self.attempt(step, op()).await {
                Ok(value) => break Ok(value),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    metrics::counter!("settlement_step_retries_total", "step" => step)
                        .increment(1);
                    tracing::warn!(attempt, ?delay, %error, "step failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => break Err(error),
            }
        };

        metrics::histogram!("settlement_step_duration_seconds", "step" => step)
            .record(started.elapsed().as_secs_f64());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(40),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff_for(1), Duration::from_millis(10));
        assert_eq!(p.backoff_for(2), Duration::from_millis(20));
        assert_eq!(p.backoff_for(3), Duration::from_millis(40));
        assert_eq!(p.backoff_for(10), Duration::from_millis(40));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(p.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy()
            .run("flaky", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SettlementError::remote("logistics", "connection reset"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy()
            .run("down", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SettlementError::remote("ledger", "503"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(SettlementError::RemoteUnavailable { service: "ledger", .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy()
            .run("coupon", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SettlementError::InvalidCoupon {
                        code: "NOPE".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SettlementError::InvalidCoupon { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let result: Result<()> = policy()
            .attempt("slow", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(SettlementError::Timeout {
                step: "slow",
                timeout_ms: 200
            })
        ));
    }
}
