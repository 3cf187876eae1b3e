//! Bounded retry with jittered exponential backoff.
//!
//! Applies only to transient transport errors; everything the error taxonomy
//! marks non-retryable fails on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::block::errors::{PtbError, PtbResult};

/// Retry configuration with jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial attempt)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Jitter factor (0.0 to 1.0) - adds randomness to backoff
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// A config that never sleeps, for tests.
    #[doc(hidden)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Calculate backoff delay for a given attempt (0-indexed).
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^attempt, capped
        let exp_backoff = (self.base_backoff_ms as f64) * 2_f64.powi(attempt as i32);
        let capped_backoff = exp_backoff.min(self.max_backoff_ms as f64);

        // Jitter avoids thundering-herd retries against the same endpoint
        let jitter_range = capped_backoff * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_backoff = (capped_backoff + jitter).max(0.0);

        Duration::from_millis(final_backoff as u64)
    }
}

/// Retry an async operation under the bounded policy.
///
/// Transient errors (per [`PtbError::is_retryable`]) trigger backoff and
/// retry; permanent errors return immediately. When every attempt fails
/// transiently, the last transport error is returned; callers that need a
/// terminal timeout map it to `ResolutionTimeout` themselves.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> PtbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PtbResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = config.max_attempts,
                "Retrying operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt + 1 < config.max_attempts {
                    let backoff = config.calculate_backoff(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient error, backing off before retry"
                    );
                    last_error = Some(err);
                    sleep(backoff).await;
                } else {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                    last_error = Some(err);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| PtbError::rpc("retry exhausted without recording an error")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(5);
        let result = retry_with_backoff("test", &config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PtbError::rpc("transient"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_fails_immediately() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(5);
        let result: PtbResult<()> = retry_with_backoff("test", &config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(PtbError::invalid_input("bad")) }
        })
        .await;
        assert!(matches!(result, Err(PtbError::InvalidInput(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_transport_error() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::immediate(3);
        let result: PtbResult<()> = retry_with_backoff("test", &config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(PtbError::rpc("still down")) }
        })
        .await;
        assert!(matches!(result, Err(PtbError::Rpc(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            jitter_factor: 0.0,
        };
        assert_eq!(config.calculate_backoff(0), Duration::from_millis(500));
        assert_eq!(config.calculate_backoff(1), Duration::from_millis(1_000));
        assert_eq!(config.calculate_backoff(10), Duration::from_millis(8_000));
    }
}
