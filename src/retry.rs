//! Retry executor with exponential backoff
//!
//! Wraps any asynchronous operation in bounded retries. Delay grows as
//! `base_delay * 2^attempt`, capped, with a small random jitter so that
//! simultaneous failures do not retry in lockstep. Failures classified as
//! non-transient (permission, validation) are surfaced immediately.

use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given bounds
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Backoff delay before retry number `attempt` (0-based), with jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        // Up to 10% jitter keeps concurrent retriers from synchronizing.
        let jitter_cap = (delay.as_millis() as u64) / 10;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

/// Run `operation`, retrying transient failures per `policy`.
///
/// Resolves with the first success, or with the last error once the retry
/// budget is exhausted. Non-transient errors are returned immediately
/// without consuming the budget.
pub async fn run<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                debug!("Non-transient failure, not retrying: {}", e);
                return Err(e);
            }
            Err(e) => {
                if attempt >= policy.max_retries {
                    warn!(
                        "Operation failed after {} attempts, giving up: {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "Transient failure (attempt {}), retrying in {:?}: {}",
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(60));

        // Jitter adds at most 10%, so successive delays still dominate.
        assert!(policy.delay_for(0) >= Duration::from_millis(100));
        assert!(policy.delay_for(1) >= Duration::from_millis(200));
        assert!(policy.delay_for(3) >= Duration::from_millis(800));
        assert!(policy.delay_for(0) < policy.delay_for(3));
    }

    #[test]
    fn test_delay_respects_cap() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(4));
        let capped = policy.delay_for(9);
        // Cap plus at most 10% jitter.
        assert!(capped <= Duration::from_millis(4400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_exact_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_secs(1));
        let calls = AtomicU32::new(0);

        let result: Result<()> = run(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Timeout("injected".to_string())) }
        })
        .await;

        assert!(result.is_err());
        // 1 initial + 3 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = run(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Api("503".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.expect("should eventually succeed"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_short_circuits() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = run(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Permission("forbidden".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Permission(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
