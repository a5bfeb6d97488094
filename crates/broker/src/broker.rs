/*
 * Broker - job submission, turn loop and control plane.
 *
 * All job state sits behind one mutex, held only for short critical
 * sections and never across a worker call. The turn loop per generation:
 *
 *   gate.enter -> snapshot grid -> split rows -> fan out -> join_all (barrier)
 *   -> merge into a fresh grid -> commit (grid, turn, alive count) -> gate.exit
 *
 * Because the commit is a single critical section, every control-plane read
 * (CheckStatus, Tick, Interrupt) sees a grid and turn from the same
 * generation.
 */

use futures::future::join_all;
use gol_common::metrics::spans;
use gol_common::{
    AliveSet, BrokerConfig, ControlReport, FailurePolicy, GolError, GolMetrics, Grid, JobReport,
    Result, ShutdownReport, StatusReport, TickReport, Timer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::Instrument;

use crate::control::{ControlGate, ControlState};
use crate::job::{await_outcome, Job, JobOutcome};
use crate::partition::split_rows;
use crate::worker_pool::{StripWorker, WorkerPool};

/// A worker that failed a strip after all retries.
#[derive(Debug)]
struct StripFailure {
    worker: String,
    error: GolError,
}

/// The broker context shared by the gRPC service and the turn loop.
pub struct Broker {
    /// Current or most recent job
    job: Mutex<Option<Job>>,
    gate: ControlGate,
    pool: WorkerPool,
    metrics: Arc<GolMetrics>,
    pause_timeout: Option<Duration>,
    failure_policy: FailurePolicy,
    /// Flipped by Terminate to stop the gRPC server
    shutdown_tx: watch::Sender<bool>,
}

impl Broker {
    pub fn new(pool: WorkerPool, config: &BrokerConfig, metrics: Arc<GolMetrics>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            job: Mutex::new(None),
            gate: ControlGate::new(metrics.clone()),
            pool,
            metrics,
            pause_timeout: config.pause_timeout(),
            failure_policy: config.failure_policy,
            shutdown_tx,
        }
    }

    /// Builds a broker over the given workers using the config's call policy.
    pub fn with_workers(workers: Vec<Arc<dyn StripWorker>>, config: &BrokerConfig) -> Self {
        let metrics = Arc::new(GolMetrics::new());
        let pool = WorkerPool::new(
            workers,
            config.call_timeout(),
            config.retry.clone(),
            metrics.clone(),
        );
        Self::new(pool, config, metrics)
    }

    /// Connects to every configured worker. Any unreachable worker is fatal.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(GolMetrics::new());
        let pool = WorkerPool::connect(config, metrics.clone()).await?;
        Ok(Self::new(pool, config, metrics))
    }

    pub fn metrics(&self) -> Arc<GolMetrics> {
        self.metrics.clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn control_state(&self) -> ControlState {
        self.gate.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.gate.is_closed()
    }

    /// Resolves once Terminate has run.
    pub async fn shutdown_signal(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Runs `grid` for `turns` generations, or attaches to the running job.
    ///
    /// The turn loop runs as its own task, so dropping this future (a client
    /// going away) leaves the job running.
    pub async fn submit_job(self: &Arc<Self>, grid: Grid, turns: u32) -> Result<JobReport> {
        if self.gate.is_closed() {
            return Err(GolError::Terminated);
        }

        let outcome = {
            let mut slot = self.job.lock().await;
            match slot.as_ref() {
                Some(job) if job.is_working() => {
                    self.metrics.record_job_attach();
                    tracing::info!(
                        "Attaching to running job {} at turn {}/{}",
                        job.id(),
                        job.turn(),
                        job.turns()
                    );
                    job.subscribe()
                }
                _ => {
                    let job = Job::new(grid, turns);
                    let outcome = job.subscribe();
                    tracing::info!(
                        "Starting job {}: {}x{} grid, {} turns, {} workers",
                        job.id(),
                        job.grid().width(),
                        job.grid().height(),
                        turns,
                        self.pool.live_count()
                    );
                    let span = tracing::info_span!(spans::TURN_LOOP, job = %job.id());
                    *slot = Some(job);
                    self.metrics.record_job_start();

                    let broker = self.clone();
                    tokio::spawn(async move { broker.run_job().await }.instrument(span));
                    outcome
                }
            }
        };

        await_outcome(outcome).await
    }

    async fn run_job(self: Arc<Self>) {
        let result = self.turn_loop().await;

        let mut slot = self.job.lock().await;
        let Some(job) = slot.as_mut() else {
            return;
        };

        match result {
            Ok(()) => {
                let report = job.report();
                tracing::info!(
                    "Job {} completed {} turns with {} alive cells (submitted {})",
                    job.id(),
                    report.completed_turns,
                    report.alive.len(),
                    job.submitted_at().to_rfc3339()
                );
                self.metrics.record_job_complete(true);
                job.finish(JobOutcome::Completed(report));
            }
            Err(e) => {
                // Work interrupted by Terminate reports as such, whatever the call error was
                let error = if self.gate.is_closed() {
                    GolError::Terminated
                } else {
                    e
                };
                tracing::error!("Job {} failed at turn {}: {}", job.id(), job.turn(), error);
                self.metrics.record_job_complete(false);
                job.finish(JobOutcome::Failed(error));
            }
        }
    }

    async fn turn_loop(&self) -> Result<()> {
        loop {
            {
                let slot = self.job.lock().await;
                let job = slot
                    .as_ref()
                    .ok_or_else(|| GolError::Unexpected("turn loop without a job".into()))?;
                if job.is_done() {
                    return Ok(());
                }
            }

            self.gate.enter(self.pause_timeout).await?;
            let result = self.step().await;
            self.gate.exit();
            result?;
        }
    }

    /// Computes and commits one generation.
    async fn step(&self) -> Result<()> {
        let (grid, turn) = {
            let slot = self.job.lock().await;
            let job = slot
                .as_ref()
                .ok_or_else(|| GolError::Unexpected("turn loop without a job".into()))?;
            (job.grid(), job.turn())
        };

        let span = tracing::debug_span!(spans::GENERATION, turn = turn + 1);
        let timer = Timer::generation(self.metrics.clone());

        let next = loop {
            let failures = match self.compute_generation(grid.clone()).instrument(span.clone()).await {
                Ok(Ok(next)) => break next,
                Ok(Err(failures)) => failures,
                Err(e) => {
                    timer.discard();
                    return Err(e);
                }
            };

            if let Err(e) = self.apply_failure_policy(failures) {
                timer.discard();
                return Err(e);
            }
        };

        let mut slot = self.job.lock().await;
        let job = slot
            .as_mut()
            .ok_or_else(|| GolError::Unexpected("job vanished mid-generation".into()))?;
        job.commit(next);
        tracing::debug!(
            "Turn {} merged in {:?}: {} alive",
            job.turn(),
            timer.elapsed(),
            job.tick().alive_count
        );
        Ok(())
    }

    /// Fans one generation out to the live workers and merges the results.
    ///
    /// The outer error is fatal to the job; the inner one lists the workers
    /// that failed, for the failure policy to handle.
    async fn compute_generation(
        &self,
        grid: Arc<Grid>,
    ) -> Result<std::result::Result<Grid, Vec<StripFailure>>> {
        let workers = self.pool.live_workers();
        if workers.is_empty() {
            return Err(GolError::JobFailed("no live workers".into()));
        }

        let partitions: Vec<_> = split_rows(grid.height(), workers.len())
            .into_iter()
            .filter(|p| !p.rows.is_empty())
            .collect();
        self.metrics.record_strip_dispatched(partitions.len() as u64);

        let calls = partitions.iter().map(|p| {
            let worker = workers[p.worker_index].clone();
            let grid = grid.clone();
            let rows = p.rows;
            async move {
                let id = worker.id().to_string();
                (id, rows, self.pool.compute(worker, grid, rows).await)
            }
        });

        // Barrier: nothing is merged until every strip has answered
        let results = join_all(calls).await;

        let mut next = Grid::new(grid.width(), grid.height())?;
        let mut failures = Vec::new();

        for (worker, rows, result) in results {
            let alive = match result {
                Ok(alive) => alive,
                Err(error) => {
                    failures.push(StripFailure { worker, error });
                    continue;
                }
            };

            if let Err(error) = merge_strip(&mut next, alive, rows) {
                tracing::warn!("Worker {} returned a bad strip: {}", worker, error);
                failures.push(StripFailure { worker, error });
            }
        }

        if failures.is_empty() {
            Ok(Ok(next))
        } else {
            Ok(Err(failures))
        }
    }

    /// Decides whether a generation with failed strips can be retried.
    fn apply_failure_policy(&self, failures: Vec<StripFailure>) -> Result<()> {
        match self.failure_policy {
            FailurePolicy::Abort => {
                let first = failures
                    .into_iter()
                    .next()
                    .ok_or_else(|| GolError::Unexpected("empty failure list".into()))?;
                Err(GolError::JobFailed(format!(
                    "worker {} failed: {}",
                    first.worker, first.error
                )))
            }
            FailurePolicy::Repartition => {
                for failure in &failures {
                    tracing::warn!(
                        "Worker {} failed, repartitioning: {}",
                        failure.worker,
                        failure.error
                    );
                    self.pool.mark_dead(&failure.worker);
                }
                if self.pool.live_count() == 0 {
                    return Err(GolError::JobFailed(
                        "every worker has failed; nothing left to repartition across".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Reports whether a job is running and its turn.
    pub async fn check_status(&self) -> StatusReport {
        let slot = self.job.lock().await;
        slot.as_ref().map(Job::status).unwrap_or(StatusReport {
            working: false,
            turn: 0,
        })
    }

    /// Reports the turn and the alive count of the current generation.
    pub async fn tick(&self) -> TickReport {
        let slot = self.job.lock().await;
        slot.as_ref().map(Job::tick).unwrap_or(TickReport {
            turn: 0,
            alive_count: 0,
        })
    }

    /// Pauses the turn loop. Returns once no generation is in flight, so the
    /// reported turn stays valid until Resume.
    pub async fn pause(&self) -> ControlReport {
        if self.gate.pause() {
            tracing::info!("Paused");
        } else {
            tracing::debug!("Pause while already paused");
        }
        self.gate.wait_idle().await;
        self.control_report().await
    }

    /// Resumes the turn loop. Resuming while not paused changes nothing.
    pub async fn resume(&self) -> ControlReport {
        if self.gate.resume() {
            tracing::info!("Resumed");
        } else {
            tracing::warn!("Resume while not paused");
        }
        self.control_report().await
    }

    async fn control_report(&self) -> ControlReport {
        let status = self.check_status().await;
        ControlReport {
            turn: status.turn,
            working: status.working,
        }
    }

    /// Snapshot of the current generation; the turn loop keeps going.
    pub async fn interrupt(&self) -> JobReport {
        self.metrics.record_interrupt();
        let slot = self.job.lock().await;
        slot.as_ref().map(Job::report).unwrap_or(JobReport {
            completed_turns: 0,
            alive: AliveSet::new(),
        })
    }

    /// Stops the turn loop, cascades Shutdown to every worker and signals the
    /// gRPC server to stop.
    pub async fn terminate(&self, reason: &str) -> ShutdownReport {
        let span = tracing::info_span!(spans::TERMINATE);
        async {
            tracing::info!("Terminating: {}", reason);
            self.gate.close();

            let report = self.pool.shutdown_all(reason).await;
            tracing::info!(
                "Shutdown sent: {} notified, {} failed",
                report.notified.len(),
                report.failed.len()
            );

            self.shutdown_tx.send_replace(true);
            report
        }
        .instrument(span)
        .await
    }
}

/// Marks a worker's cells alive in `next`, refusing cells outside its rows.
fn merge_strip(next: &mut Grid, alive: AliveSet, rows: gol_common::RowRange) -> Result<()> {
    for cell in alive {
        if !rows.contains(cell.y) {
            return Err(GolError::Protocol(format!(
                "cell ({}, {}) outside assigned rows {}..{}",
                cell.x,
                cell.y,
                rows.offset,
                rows.end()
            )));
        }
        next.set_alive(cell)?;
    }
    Ok(())
}
