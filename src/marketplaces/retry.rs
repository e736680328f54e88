//! Retry policy for marketplace calls
//!
//! Only `Transient` errors are retried. Permission, malformed-response and
//! validation errors fail on the first attempt.

use crate::error::{AppError, Result};
use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry settings injected into every adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Add ±25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt. Used for price submissions, which must not be duplicated.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32, error: &AppError) -> Duration {
        let base = error.retry_delay_ms().unwrap_or(self.base_delay_ms) as f64;
        let scaled = base * self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let capped = scaled.min(self.max_delay_ms as f64);

        let millis = if self.jitter && capped > 0.0 {
            let spread = capped * 0.25;
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_millis(millis.max(0.0) as u64)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out
    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(call = label, attempts = attempt + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    warn!(
                        call = label,
                        error = %e,
                        attempts = attempt + 1,
                        "Retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        call = label,
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
