//! Exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::errors::{AdminError, AdminResult};

/// Largest share of a delay that jitter may remove.
const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: true,
        }
    }

    /// Disable jitter so delays are exact.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay after failed attempt number `attempt`, with up to 25% removed at
    /// random.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let cut = rand::rng().random_range(0.0..=JITTER_FRACTION);
        delay.mul_f64(1.0 - cut)
    }

    /// Whether a failure on `attempt` should be followed by another try.
    pub fn should_retry(&self, attempt: u32, err: &AdminError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, runs out
    /// of attempts, or `cancel` fires. `on_attempt` sees each attempt number
    /// before it starts.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut on_attempt: impl FnMut(u32),
        mut op: F,
    ) -> AdminResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdminResult<T>>,
    {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(AdminError::Cancelled);
            }
            on_attempt(attempt);

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(AdminError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !self.should_retry(attempt, &err) {
                if attempt > 1 {
                    warn!(attempt, error = %err, "Giving up after retries");
                }
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
            tokio::select! {
                _ = cancel.cancelled() => return Err(AdminError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(5))
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(5));
        assert_eq!(p.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let p = policy();
        for attempt in 1..6 {
            let full = p.backoff(attempt);
            for _ in 0..50 {
                let d = p.delay_for(attempt);
                assert!(d <= full);
                assert!(d >= full.mul_f64(0.75) - Duration::from_micros(1));
            }
        }
    }

    #[test]
    fn only_retryable_errors_are_retried() {
        let p = policy();
        assert!(p.should_retry(1, &AdminError::Timeout));
        assert!(p.should_retry(1, &AdminError::Server { status: 503, message: String::new() }));
        assert!(!p.should_retry(1, &AdminError::NotFound("x".into())));
        assert!(!p.should_retry(1, &AdminError::Unauthorized("x".into())));
        assert!(!p.should_retry(4, &AdminError::Timeout));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let mut seen = Vec::new();

        let result = policy()
            .without_jitter()
            .run(
                &CancellationToken::new(),
                |attempt| seen.push(attempt),
                || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(AdminError::Network("reset".into()))
                        } else {
                            Ok(7)
                        }
                    }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_permanent_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: AdminResult<()> = policy()
            .run(&CancellationToken::new(), |_| {}, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(AdminError::Forbidden("no".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(AdminError::Forbidden(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: AdminResult<()> = policy()
            .run(&CancellationToken::new(), |_| {}, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(AdminError::Timeout)
                }
            })
            .await;

        assert!(matches!(result, Err(AdminError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: AdminResult<()> = policy()
            .run(&cancel, |_| {}, || async { Err(AdminError::Timeout) })
            .await;
        assert!(matches!(result, Err(AdminError::Cancelled)));
    }
}
