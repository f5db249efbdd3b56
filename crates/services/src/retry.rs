//! One retry policy for every remote call.
//!
//! Callers pass a predicate saying which errors are worth repeating; the
//! policy sleeps `base_delay * 2^attempt` between tries and hands back the
//! last error once the attempt budget is spent.

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given budget; at least one attempt always runs.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `operation` until it succeeds, fails terminally, or the budget
    /// runs out; returns the last error in the failing cases.
    ///
    /// # Errors
    ///
    /// The first error `retryable` rejects, or the final error once
    /// `max_attempts` tries have failed.
    pub async fn run<T, E, P, F, Fut>(&self, retryable: P, mut operation: F) -> Result<T, E>
    where
        P: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !retryable(&error) || attempt + 1 >= self.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "transient failure, retry {} of {} in {:?}",
                        attempt + 1,
                        self.max_attempts - 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
