/*
 * Retry utilities with exponential backoff and jitter.
 *
 * Bounded retries for transient failures of worker calls and of the
 * client's initial broker connection. Non-retryable errors (see
 * `GolError::is_retryable`) are returned on the first attempt.
 */

use crate::{GolError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
    /// Jitter added on top of the backoff, as a fraction of it (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Creates a retry config with no retries (fail fast).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry config for per-turn RPCs: a few quick attempts, since a slow
    /// worker stalls the whole generation.
    pub fn for_network() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.15,
        }
    }

    /// Retry config for waiting on a process that is still starting up.
    pub fn for_startup() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            jitter_factor: 0.0,
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic golden-ratio jitter spreads concurrent retries apart
        let jitter = if self.jitter_factor > 0.0 {
            capped * self.jitter_factor * ((attempt as f64 * 0.618033988749895) % 1.0)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped + jitter)
    }
}

/// Executes an async operation with retry logic.
///
/// # Example
/// ```ignore
/// let client = retry_async(&RetryConfig::for_startup(), || async {
///     BrokerClient::connect(&config).await
/// }).await?;
/// ```
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryBuilder::new(config).run(operation).await
}

/// A named retry operation with an optional hook invoked before each retry.
pub struct RetryBuilder<'a> {
    config: &'a RetryConfig,
    operation_name: Option<String>,
    on_retry: Option<Box<dyn Fn(usize, &GolError) + Send + Sync + 'a>>,
}

impl<'a> RetryBuilder<'a> {
    /// Creates a new retry builder with the given configuration.
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            operation_name: None,
            on_retry: None,
        }
    }

    /// Sets a name for the operation (used in logging).
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Registers a callback run with (attempt, error) before every retry.
    pub fn on_retry(mut self, hook: impl Fn(usize, &GolError) + Send + Sync + 'a) -> Self {
        self.on_retry = Some(Box::new(hook));
        self
    }

    /// Executes the operation with retry logic.
    pub async fn run<F, Fut, T>(self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op_name = self.operation_name.as_deref().unwrap_or("operation");
        let mut attempt = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", op_name, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!("{}: non-retryable error: {}", op_name, err);
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                warn!(
                    "{}: all {} retries exhausted: {}",
                    op_name, self.config.max_retries, err
                );
                return Err(err);
            }

            let delay = err
                .suggested_retry_delay()
                .map(|d| d.max(self.config.delay_for_attempt(attempt)))
                .unwrap_or_else(|| self.config.delay_for_attempt(attempt));

            warn!(
                "{}: attempt {} failed ({} remaining), retrying in {:?}: {}",
                op_name,
                attempt + 1,
                self.config.max_retries - attempt,
                delay,
                err
            );
            if let Some(hook) = &self.on_retry {
                hook(attempt, &err);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
