/*
 * Distributed Game of Life - Common Types
 *
 * Shared grid model, reports, errors, configuration, retry and metrics
 * used across the broker, the workers and the client.
 */

pub mod config;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod patterns;
pub mod report;
pub mod retry;

pub use config::*;
pub use error::{GolError, Result, ResultExt};
pub use grid::{AliveSet, Cell, Grid, RowRange, ALIVE, DEAD};
pub use metrics::{GolMetrics, MetricsSnapshot, Timer};
pub use patterns::{random_grid, Pattern};
pub use report::{ControlReport, JobReport, ShutdownReport, StatusReport, TickReport};
pub use retry::{retry_async, RetryBuilder, RetryConfig};
