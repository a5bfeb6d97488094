/*
 * Observability - Metrics and Tracing
 *
 * Provides Prometheus-compatible counters for the broker turn loop,
 * its control plane, and worker strip computation.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics registry shared by a broker or worker process.
#[derive(Debug, Default)]
pub struct GolMetrics {
    // Job metrics
    pub jobs_started: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_attached: AtomicU64,

    // Turn loop metrics
    pub generations_completed: AtomicU64,
    pub strips_dispatched: AtomicU64,
    pub strips_failed: AtomicU64,
    pub strip_retries: AtomicU64,
    pub workers_lost: AtomicU64,

    // Worker metrics
    pub strips_computed: AtomicU64,
    pub strips_rejected: AtomicU64,
    pub cells_evaluated: AtomicU64,

    // Control plane metrics
    pub pauses: AtomicU64,
    pub resumes: AtomicU64,
    pub pause_timeouts: AtomicU64,
    pub interrupts: AtomicU64,

    // Timing metrics (in microseconds)
    pub total_generation_time_us: AtomicU64,
    pub total_strip_time_us: AtomicU64,
}

impl GolMetrics {
    /// Creates a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_start(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_attach(&self) {
        self.jobs_attached.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a job finishing, successfully or not.
    pub fn record_job_complete(&self, success: bool) {
        if success {
            self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a merged generation and how long it took end to end.
    pub fn record_generation(&self, duration: Duration) {
        self.generations_completed.fetch_add(1, Ordering::Relaxed);
        self.total_generation_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_strip_dispatched(&self, count: u64) {
        self.strips_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_strip_failure(&self) {
        self.strips_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_strip_retry(&self) {
        self.strip_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_lost(&self) {
        self.workers_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a strip computed on a worker.
    pub fn record_strip_computed(&self, cells: u64, duration: Duration) {
        self.strips_computed.fetch_add(1, Ordering::Relaxed);
        self.cells_evaluated.fetch_add(cells, Ordering::Relaxed);
        self.total_strip_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_strip_rejected(&self) {
        self.strips_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pause(&self) {
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resume(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pause_timeout(&self) {
        self.pause_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_attached: self.jobs_attached.load(Ordering::Relaxed),
            generations_completed: self.generations_completed.load(Ordering::Relaxed),
            strips_dispatched: self.strips_dispatched.load(Ordering::Relaxed),
            strips_failed: self.strips_failed.load(Ordering::Relaxed),
            strip_retries: self.strip_retries.load(Ordering::Relaxed),
            workers_lost: self.workers_lost.load(Ordering::Relaxed),
            strips_computed: self.strips_computed.load(Ordering::Relaxed),
            strips_rejected: self.strips_rejected.load(Ordering::Relaxed),
            cells_evaluated: self.cells_evaluated.load(Ordering::Relaxed),
            pauses: self.pauses.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            pause_timeouts: self.pause_timeouts.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
            total_generation_time_us: self.total_generation_time_us.load(Ordering::Relaxed),
            total_strip_time_us: self.total_strip_time_us.load(Ordering::Relaxed),
        }
    }

    /// Formats metrics as Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let snap = self.snapshot();
        format!(
            r#"# HELP gol_jobs_total Jobs by outcome
# TYPE gol_jobs_total counter
gol_jobs_total{{status="started"}} {}
gol_jobs_total{{status="completed"}} {}
gol_jobs_total{{status="failed"}} {}
gol_jobs_total{{status="attached"}} {}

# HELP gol_generations_total Generations merged by the broker
# TYPE gol_generations_total counter
gol_generations_total {}

# HELP gol_strips_total Strip calls by outcome
# TYPE gol_strips_total counter
gol_strips_total{{status="dispatched"}} {}
gol_strips_total{{status="failed"}} {}
gol_strips_total{{status="retried"}} {}
gol_strips_total{{status="computed"}} {}
gol_strips_total{{status="rejected"}} {}

# HELP gol_workers_lost_total Workers declared dead mid-job
# TYPE gol_workers_lost_total counter
gol_workers_lost_total {}

# HELP gol_cells_evaluated_total Cells evaluated by this worker
# TYPE gol_cells_evaluated_total counter
gol_cells_evaluated_total {}

# HELP gol_control_total Control-plane calls
# TYPE gol_control_total counter
gol_control_total{{call="pause"}} {}
gol_control_total{{call="resume"}} {}
gol_control_total{{call="pause_timeout"}} {}
gol_control_total{{call="interrupt"}} {}

# HELP gol_generation_time_seconds Total time spent computing generations
# TYPE gol_generation_time_seconds counter
gol_generation_time_seconds {}

# HELP gol_strip_time_seconds Total time spent computing strips
# TYPE gol_strip_time_seconds counter
gol_strip_time_seconds {}
"#,
            snap.jobs_started,
            snap.jobs_completed,
            snap.jobs_failed,
            snap.jobs_attached,
            snap.generations_completed,
            snap.strips_dispatched,
            snap.strips_failed,
            snap.strip_retries,
            snap.strips_computed,
            snap.strips_rejected,
            snap.workers_lost,
            snap.cells_evaluated,
            snap.pauses,
            snap.resumes,
            snap.pause_timeouts,
            snap.interrupts,
            snap.total_generation_time_us as f64 / 1_000_000.0,
            snap.total_strip_time_us as f64 / 1_000_000.0,
        )
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_attached: u64,
    pub generations_completed: u64,
    pub strips_dispatched: u64,
    pub strips_failed: u64,
    pub strip_retries: u64,
    pub workers_lost: u64,
    pub strips_computed: u64,
    pub strips_rejected: u64,
    pub cells_evaluated: u64,
    pub pauses: u64,
    pub resumes: u64,
    pub pause_timeouts: u64,
    pub interrupts: u64,
    pub total_generation_time_us: u64,
    pub total_strip_time_us: u64,
}

impl MetricsSnapshot {
    /// Average wall time of one merged generation.
    pub fn avg_generation_time(&self) -> Duration {
        if self.generations_completed == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_generation_time_us / self.generations_completed)
        }
    }

    /// Fraction of dispatched strips that failed at least once.
    pub fn strip_failure_rate(&self) -> f64 {
        if self.strips_dispatched == 0 {
            0.0
        } else {
            self.strips_failed as f64 / self.strips_dispatched as f64
        }
    }
}

/// Timer guard that records a generation's duration when dropped.
pub struct Timer {
    start: Instant,
    metrics: Arc<GolMetrics>,
    record_fn: Option<fn(&GolMetrics, Duration)>,
}

impl Timer {
    /// Starts a timer for one generation.
    pub fn generation(metrics: Arc<GolMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            record_fn: Some(|m, d| m.record_generation(d)),
        }
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Drops the timer without recording, for work that did not complete.
    pub fn discard(mut self) {
        self.record_fn = None;
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(record) = self.record_fn {
            record(&self.metrics, self.start.elapsed());
        }
    }
}

/// Tracing span names for consistent instrumentation.
pub mod spans {
    pub const SUBMIT_JOB: &str = "submit_job";
    pub const TURN_LOOP: &str = "turn_loop";
    pub const GENERATION: &str = "generation";
    pub const COMPUTE_STRIP: &str = "compute_strip";
    pub const TERMINATE: &str = "terminate";
}
