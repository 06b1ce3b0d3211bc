//! Pacing for retries after a lost optimistic transaction.

use rand::Rng;
use std::time::Duration;

use crate::error::{QueueError, QueueResult};

/// How `acquire` and `release` wait between conflicting attempts.
///
/// The n-th retry sleeps `initial_backoff * multiplier^(n-1)`, capped at
/// `max_backoff`. With `jitter` the delay is scaled by a random factor in
/// `[0.5, 1.0]` so that workers which collided do not collide again in
/// lockstep.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    /// Total transaction attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately and forever.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    pub(crate) fn backoff(&self, operation: &'static str) -> Backoff<'_> {
        Backoff {
            policy: self,
            operation,
            attempts: 0,
        }
    }
}

/// Per-call retry state.
pub(crate) struct Backoff<'a> {
    policy: &'a RetryPolicy,
    operation: &'static str,
    attempts: u32,
}

impl Backoff<'_> {
    /// Record a lost attempt and sleep before the next one.
    ///
    /// Fails once the policy's attempt limit is reached.
    pub(crate) async fn wait(&mut self) -> QueueResult<()> {
        self.attempts += 1;

        if let Some(max) = self.policy.max_attempts
            && self.attempts >= max
        {
            return Err(QueueError::ContentionExhausted {
                operation: self.operation,
                attempts: self.attempts,
            });
        }

        let mut delay = self.policy.delay_for(self.attempts);
        if self.policy.jitter && !delay.is_zero() {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay = delay.mul_f64(factor);
        }

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_and_capped() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(10), Duration::from_millis(50));

        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(4), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1000), Duration::from_millis(50));
    }

    #[test]
    fn immediate_never_sleeps() {
        assert_eq!(RetryPolicy::immediate().delay_for(7), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_limit() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        let mut backoff = policy.backoff("acquire");

        assert!(backoff.wait().await.is_ok());
        assert!(backoff.wait().await.is_ok());
        let err = backoff.wait().await.unwrap_err();

        assert!(matches!(
            err,
            QueueError::ContentionExhausted {
                operation: "acquire",
                attempts: 3
            }
        ));
        assert_eq!(backoff.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_within_half_to_full_delay() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(100));
        let mut backoff = policy.backoff("release");

        let start = tokio::time::Instant::now();
        backoff.wait().await.unwrap();
        let slept = start.elapsed();

        assert!(slept >= Duration::from_millis(50));
        assert!(slept <= Duration::from_millis(101));
    }
}
