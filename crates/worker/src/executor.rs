/*
 * Strip executor - runs strip computations off the async runtime.
 */

use gol_common::{AliveSet, GolError, GolMetrics, Grid, Result, RowRange};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine;

/// Outcome of one strip computation.
#[derive(Debug, Clone)]
pub struct StripOutput {
    pub alive: AliveSet,
    pub elapsed: Duration,
}

/// Executes strip computations on the blocking thread pool.
pub struct StripExecutor {
    metrics: Arc<GolMetrics>,
}

impl StripExecutor {
    /// Creates a new executor with its own metrics.
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(GolMetrics::new()))
    }

    /// Creates a new executor reporting into the given metrics.
    pub fn with_metrics(metrics: Arc<GolMetrics>) -> Self {
        Self { metrics }
    }

    /// Validates the strip bounds, then computes it.
    pub async fn execute(&self, grid: Arc<Grid>, rows: RowRange) -> Result<StripOutput> {
        match rows.checked_end() {
            Some(end) if end <= grid.height() => {}
            _ => {
                return Err(GolError::InvalidGrid(format!(
                    "strip at row {} with height {} exceeds grid height {}",
                    rows.offset,
                    rows.height,
                    grid.height()
                )));
            }
        }

        let cells = rows.height as u64 * grid.width() as u64;
        let start = Instant::now();

        // CPU-bound: keep it off the runtime's worker threads
        let alive = tokio::task::spawn_blocking(move || engine::compute_strip(&grid, rows))
            .await
            .map_err(|e| GolError::Unexpected(format!("strip computation panicked: {}", e)))?;

        let elapsed = start.elapsed();
        self.metrics.record_strip_computed(cells, elapsed);

        tracing::debug!(
            "Computed rows {}..{} ({} alive) in {:?}",
            rows.offset,
            rows.end(),
            alive.len(),
            elapsed
        );

        Ok(StripOutput { alive, elapsed })
    }

    pub fn metrics(&self) -> Arc<GolMetrics> {
        self.metrics.clone()
    }
}

impl Default for StripExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_common::patterns::BLINKER;
    use gol_common::Cell;

    #[tokio::test]
    async fn test_execute_records_metrics() {
        let executor = StripExecutor::new();
        let grid = BLINKER.grid(Cell::new(1, 2), 5, 5).unwrap();

        let output = executor
            .execute(Arc::new(grid), RowRange::new(0, 5))
            .await
            .unwrap();
        assert_eq!(output.alive.len(), 3);

        let snap = executor.metrics().snapshot();
        assert_eq!(snap.strips_computed, 1);
        assert_eq!(snap.cells_evaluated, 25);
    }

    #[tokio::test]
    async fn test_out_of_range_strip_rejected() {
        let executor = StripExecutor::new();
        let grid = Arc::new(Grid::new(4, 4).unwrap());

        let result = executor.execute(grid, RowRange::new(3, 2)).await;
        assert!(matches!(result, Err(GolError::InvalidGrid(_))));
    }

    #[tokio::test]
    async fn test_overflowing_strip_rejected() {
        let executor = StripExecutor::new();
        let grid = Arc::new(Grid::new(4, 4).unwrap());

        // offset + height wraps to 1 in u32
        let result = executor.execute(grid, RowRange::new(u32::MAX, 2)).await;
        assert!(matches!(result, Err(GolError::InvalidGrid(_))));
        assert_eq!(executor.metrics().snapshot().strips_computed, 0);
    }
}
