//! Retry engine with capped exponential backoff
//!
//! A pure backoff strategy plus a driver that runs an async operation until
//! it succeeds, exhausts its attempts, or hits a terminal error. Attempt
//! semantics: attempt `0` is the initial call (no delay); retries start at
//! attempt `1`. Retryability is decided by [`Error::is_retryable`], so an
//! error wrapped with [`Error::retryable`] forces the next delay while an
//! unwrapped terminal error stops the loop. The provider client runs every
//! request through this driver, so the pipeline and the scheduler inherit
//! the policy on all their remote calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Retry configuration: capped exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the initial call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    /// Upper bound on any single delay
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Growth factor applied per retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_attempts() -> usize {
    5
}

fn default_initial_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// Calculate the delay preceding the given attempt (0-based; attempt 0
    /// is the initial call and gets no delay). Saturates at the cap.
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let initial = self.initial_backoff_secs as f64;
        let max = self.max_backoff_secs as f64;
        let exponent = (attempt - 1).min(u32::MAX as usize) as i32;
        let secs = initial * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= max {
            Duration::from_secs(self.max_backoff_secs)
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("retry max_attempts must be > 0"));
        }
        if self.multiplier < 1.0 {
            return Err(Error::config("retry multiplier must be >= 1.0"));
        }
        if self.max_backoff_secs < self.initial_backoff_secs {
            return Err(Error::config(
                "retry max_backoff_secs must be >= initial_backoff_secs",
            ));
        }
        Ok(())
    }
}

/// Run `operation` with retries according to `config`.
///
/// Each attempt's error is classified via [`Error::is_retryable`]. When the
/// attempts are exhausted, or a terminal error occurs, the underlying error
/// is returned with any retryable marker stripped.
pub async fn retry<T, Op, Fut>(config: &RetryConfig, mut operation: Op) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            tokio::time::sleep(config.delay(attempt)).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err.into_inner());
                }
                warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_attempts,
                    error = %err,
                    "operation failed, will retry"
                );
                last_err = Some(err);
            }
        }
    }

    Err(last_err
        .map(Error::into_inner)
        .unwrap_or_else(|| Error::Other("retry loop exhausted without error".to_string())))
}
