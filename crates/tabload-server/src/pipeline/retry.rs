//! Retry policy for the load step
//!
//! Only transient failure classes are re-attempted: transport errors and
//! quota exhaustion. Everything deterministic fails fast, because retrying
//! a validation or permission failure just burns the invocation's timeout
//! budget and delays the failure notification. Quota errors back off from a
//! doubled base since the provider needs a longer cool-down.

use std::future::Future;
use std::time::Duration;
use tabload_common::{ErrorClass, PipelineError, Result};
use tracing::warn;

/// Exponential-backoff retry policy applied around the load orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retries.
    pub max_attempts: u32,
    /// Base delay before the first re-attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff before the re-attempt following failed attempt `attempt`
    /// (1-based): `base * 2^(attempt-1)`, with a doubled base for quota
    /// failures.
    pub fn delay_for(&self, error: &PipelineError, attempt: u32) -> Duration {
        let base = if error.class() == ErrorClass::Quota {
            self.base_delay * 2
        } else {
            self.base_delay
        };
        base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op`, re-attempting transient failures until the attempt budget
    /// is exhausted. The final error is surfaced unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(&e, attempt);
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "Transient failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
