/*
 * Configuration for the broker, workers and client.
 */

use crate::retry::RetryConfig;
use crate::{GolError, Result};
use derive_builder::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default gRPC message size limit (64 MiB), large enough for a 5120x5120 grid.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// What the broker does once a worker has exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the job with the worker's error.
    #[default]
    Abort,
    /// Mark the worker dead and recompute the generation across the survivors.
    Repartition,
}

impl std::str::FromStr for FailurePolicy {
    type Err = GolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "repartition" => Ok(FailurePolicy::Repartition),
            other => Err(GolError::Config(format!(
                "unknown failure policy '{}', expected 'abort' or 'repartition'",
                other
            ))),
        }
    }
}

/// Configuration for the broker.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the broker's gRPC server binds to
    pub listen_addr: String,

    /// Worker endpoints, one per partition (e.g. "http://127.0.0.1:8031")
    pub worker_addresses: Vec<String>,

    /// Deadline for a single ComputeStrip call
    pub call_timeout_ms: u64,

    /// How long a pause may last before the turn loop resumes itself (0 = forever)
    pub pause_timeout_ms: u64,

    /// Behaviour once a worker has failed all retries
    pub failure_policy: FailurePolicy,

    /// Retry policy for worker calls
    pub retry: RetryConfig,

    /// gRPC message size limit, both directions
    pub max_message_bytes: usize,

    /// Optional address for the plain-HTTP health/metrics endpoint
    pub health_addr: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8030".to_string(),
            worker_addresses: Vec::new(),
            call_timeout_ms: 30_000,
            pause_timeout_ms: 300_000, // 5 minutes
            failure_policy: FailurePolicy::Abort,
            retry: RetryConfig::for_network(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            health_addr: None,
        }
    }
}

impl BrokerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// The pause timeout, or `None` if pauses may last forever.
    pub fn pause_timeout(&self) -> Option<Duration> {
        (self.pause_timeout_ms > 0).then(|| Duration::from_millis(self.pause_timeout_ms))
    }

    /// Checks the settings the broker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.worker_addresses.is_empty() {
            return Err(GolError::Config("at least one worker address is required".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(GolError::Config("call_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration for a worker.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the worker's gRPC server binds to
    pub listen_addr: String,

    /// Maximum strips computed concurrently; extra requests are rejected
    pub max_concurrent_strips: usize,

    /// gRPC message size limit, both directions
    pub max_message_bytes: usize,

    /// How long shutdown waits for in-flight strips
    pub drain_timeout_ms: u64,

    /// Optional address for the plain-HTTP health/metrics endpoint
    pub health_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8031".to_string(),
            max_concurrent_strips: 4,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            drain_timeout_ms: 5_000,
            health_addr: None,
        }
    }
}

impl WorkerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Configuration for the job submitter.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker endpoint
    pub broker_addr: String,

    /// Interval between progress polls
    pub tick_interval_ms: u64,

    /// Directory snapshots are written to
    pub output_dir: String,

    /// gRPC message size limit, both directions
    pub max_message_bytes: usize,

    /// Retry policy for the initial broker connection
    pub connect_retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_addr: "http://127.0.0.1:8030".to_string(),
            tick_interval_ms: 2_000,
            output_dir: "out".to_string(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            connect_retry: RetryConfig::no_retry(),
        }
    }
}

impl ClientConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Loads any of the configs above from a JSON file; missing fields take defaults.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| GolError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| GolError::Config(format!("invalid config {}: {}", path.display(), e)))
}
