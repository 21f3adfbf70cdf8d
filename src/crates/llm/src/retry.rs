//! Retry with exponential backoff for provider calls.
//!
//! Only errors where [`LlmError::is_retryable`] holds are retried: connect
//! failures, timeouts, 429 and 5xx. Anything else (auth, 404, bad payload)
//! fails on the first attempt.

use crate::error::{LlmError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, in seconds
    pub initial_interval: f64,

    pub backoff_factor: f64,

    /// Upper bound for a single delay, in seconds
    pub max_interval: f64,

    /// Scale each delay by a random factor in [0.5, 1.5]
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 8.0,
            jitter: true,
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_interval * self.backoff_factor.powi(retry as i32);
        let capped = base.min(self.max_interval).max(0.0);

        let delay = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Run `operation`, retrying transient failures according to `policy`.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                tracing::debug!(
                    retry = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying provider call"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
