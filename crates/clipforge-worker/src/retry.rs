//! The stage-level retry policy.
//!
//! One backoff implementation for every external call in the pipeline;
//! stages differ only in the policy values they pass in. Quota errors use
//! a longer curve than plain transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// Retry policy for one stage's external calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts (first try included)
    pub max_attempts: u32,
    /// Base delay, doubled each retry
    pub base_delay: Duration,
    /// Cap on the computed delay
    pub max_delay: Duration,
    /// Base delay when the error is quota-classified
    pub quota_base_delay: Duration,
    /// Stage name for logging
    pub stage: &'static str,
}

impl RetryPolicy {
    pub fn new(stage: &'static str) -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            quota_base_delay: Duration::from_secs(5),
            stage,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `retry` (1-indexed).
    fn delay_for(&self, retry: u32, quota: bool) -> Duration {
        let base = if quota {
            self.quota_base_delay
        } else {
            self.base_delay
        };
        base.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, exhausts the attempt budget, or
    /// fails non-retryably.
    pub async fn run<F, Fut, T>(&self, operation: F) -> PipelineResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(stage = self.stage, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_call_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, e.is_quota());
                    warn!(
                        stage = self.stage,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new("test").with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new("test");
        assert_eq!(policy.delay_for(1, false), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2, false), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3, false), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10, false), Duration::from_secs(30));
    }

    #[test]
    fn quota_curve_is_longer() {
        let policy = RetryPolicy::new("test");
        assert!(policy.delay_for(1, true) > policy.delay_for(1, false));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::UpstreamUnavailable("503".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = fast_policy()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::MediaUnreadable("bad".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: PipelineResult<()> = fast_policy()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::Toolchain("boom".into())) }
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Toolchain(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
