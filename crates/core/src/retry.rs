//! Bounded retry with exponential backoff and jitter for capability calls.

use crate::error::CapabilityError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How a fallible capability call is retried before its failure becomes
/// terminal.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay within [0.5x, 1.5x] to spread concurrent
    /// retries apart.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        if self.jitter {
            let factor = 0.5 + rand::rng().random::<f64>();
            exp.mul_f64(factor)
        } else {
            exp
        }
    }
}

/// Runs `op` until it succeeds or the policy's attempt budget is spent,
/// sleeping between attempts. The last attempt's error is returned as-is.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= policy.max_attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    capability = err.capability,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "capability call failed, retrying: {}",
                    err.message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
