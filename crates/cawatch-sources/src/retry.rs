//! Per-source retry with exponential backoff.

use crate::error::{SourceError, SourceResult};
use cawatch_telemetry::Metrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Bounded retry policy for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard ceiling on attempts per resolution call.
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Backoff after the given failed attempt, without jitter.
    ///
    /// attempt=1 -> base, attempt=2 -> 2*base, attempt=3 -> 4*base, capped at max.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base.as_millis() as u64;
        let max = self.backoff_max.as_millis() as u64;
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(max))
    }

    /// Backoff plus random jitter in `[0, base/2]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let half_base = self.backoff_base.as_millis() as u64 / 2;
        let jitter = if half_base > 0 {
            rand::thread_rng().gen_range(0..=half_base)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt ceiling is reached. Each attempt is bounded by the timeout and
    /// recorded against `source`.
    pub async fn run<T, F, Fut>(&self, source: &str, mut op: F) -> SourceResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.attempt_timeout.as_millis() as u64)),
            };
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(value) => {
                    Metrics::source_request(source, "ok", latency_ms);
                    debug!(source, attempt, latency_ms, "Source attempt succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    Metrics::source_request(source, e.outcome(), latency_ms);
                    if !e.is_retryable() || attempt >= max_attempts {
                        debug!(source, attempt, error = %e, "Source attempt failed, giving up");
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        source,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Source attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(100),
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_base_delay_exponential_capped() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_millis(500));
        assert_eq!(p.base_delay(2), Duration::from_millis(1000));
        assert_eq!(p.base_delay(3), Duration::from_millis(1500));
        assert_eq!(p.base_delay(30), Duration::from_millis(1500));
    }

    #[test]
    fn test_jitter_bounded() {
        let p = policy();
        for _ in 0..100 {
            let d = p.delay_for(1);
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(750));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy()
            .run("retry_test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(SourceError::Blocked("429".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_ceiling() {
        let calls = AtomicU32::new(0);
        let result: SourceResult<()> = policy()
            .run("retry_test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::Unavailable("502".into())) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_not_retried() {
        let calls = AtomicU32::new(0);
        let result: SourceResult<()> = policy()
            .run("retry_test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::NotFound("none".into())) }
            })
            .await;
        assert!(matches!(result, Err(SourceError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_becomes_timeout_error() {
        let p = RetryPolicy::once(Duration::from_millis(50));
        let result: SourceResult<()> = p
            .run("retry_test", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(SourceError::Timeout(50)));
    }
}
