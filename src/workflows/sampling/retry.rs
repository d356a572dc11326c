use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Fixed retry schedule: up to `max_attempts` tries with a delay that
/// multiplies by `backoff_multiplier` after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    /// Schedule for status lookups against the remote case site.
    pub const fn network() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(5),
            backoff_multiplier: 2,
        }
    }

    /// Flat schedule for finding a working egress proxy.
    pub const fn rotation() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            backoff_multiplier: 1,
        }
    }
}

/// Runs `op` until it succeeds or the schedule is exhausted, sleeping between
/// attempts. The final error comes back unchanged.
pub fn retry_with_policy<T, E, F>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                thread::sleep(delay);
                delay *= policy.backoff_multiplier;
                attempt += 1;
            }
        }
    }
}
