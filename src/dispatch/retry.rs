//! Bounded retry with exponential backoff

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Failure of one attempt, classified for the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network hiccup or server-side error, worth another try
    Retriable(String),
    /// Bad request, auth failure or unreadable input, retrying won't help
    NonRetriable(String),
}

impl AttemptError {
    pub fn message(&self) -> &str {
        match self {
            AttemptError::Retriable(msg) | AttemptError::NonRetriable(msg) => msg,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, AttemptError::Retriable(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn new(max_attempts: u32, initial_backoff: Duration, multiplier: f64, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: multiplier.max(1.0),
            max_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            config.multiplier,
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based), capped at `max_backoff`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails non-retriably, runs out of attempts, or `cancel` fires
    /// during a backoff. Returns the last error together with the number of attempts made.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<(T, u32), (AttemptError, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if !err.is_retriable() || attempt >= self.max_attempts => {
                    return Err((err, attempt));
                }
                Err(err) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {} (retrying in {:?})",
                        label,
                        attempt,
                        self.max_attempts,
                        err.message(),
                        delay
                    );

                    if let Some(token) = cancel {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!("{} retry abandoned on shutdown", label);
                                return Err((err, attempt));
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
