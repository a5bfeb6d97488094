/*
 * Error types for distributed Game of Life.
 *
 * Errors are categorized by:
 * - Source: where the error originated (worker call, grid decoding, control plane, etc.)
 * - Retryability: whether the operation can be retried
 * - Severity: how the error should be handled (retry, abort the job, exit)
 */

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GolError {
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Timeout: operation exceeded {0:?}")]
    Timeout(Duration),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker terminated")]
    Terminated,

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl GolError {
    /// Returns true if this error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GolError::Communication(_) | GolError::Timeout(_) | GolError::ResourceExhausted(_)
        )
    }

    /// Returns a suggested retry delay for this error type.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            GolError::Communication(_) => Some(Duration::from_millis(100)),
            GolError::ResourceExhausted(_) => Some(Duration::from_millis(250)),
            _ => None,
        }
    }

    /// Wraps this error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match self {
            GolError::Communication(msg) => GolError::Communication(format!("{}: {}", ctx, msg)),
            GolError::ResourceExhausted(msg) => {
                GolError::ResourceExhausted(format!("{}: {}", ctx, msg))
            }
            GolError::Worker(msg) => GolError::Worker(format!("{}: {}", ctx, msg)),
            GolError::InvalidGrid(msg) => GolError::InvalidGrid(format!("{}: {}", ctx, msg)),
            GolError::Protocol(msg) => GolError::Protocol(format!("{}: {}", ctx, msg)),
            GolError::JobFailed(msg) => GolError::JobFailed(format!("{}: {}", ctx, msg)),
            GolError::Config(msg) => GolError::Config(format!("{}: {}", ctx, msg)),
            GolError::Serialization(msg) => GolError::Serialization(format!("{}: {}", ctx, msg)),
            GolError::Io(msg) => GolError::Io(format!("{}: {}", ctx, msg)),
            GolError::Unexpected(msg) => GolError::Unexpected(format!("{}: {}", ctx, msg)),
            // Timeout keeps its duration so it stays retryable
            e @ GolError::Timeout(_) => e,
            e @ GolError::Terminated => e,
        }
    }
}

impl From<std::io::Error> for GolError {
    fn from(err: std::io::Error) -> Self {
        GolError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GolError {
    fn from(err: serde_json::Error) -> Self {
        GolError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GolError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context lazily (only evaluated on error).
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
