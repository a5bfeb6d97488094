/*
 * Job state.
 *
 * A job owns the current generation and its progress counters. The grid is
 * never edited in place: each merge produces a new grid that replaces the
 * old one, so a snapshot handed to workers stays valid for the whole
 * generation.
 */

use chrono::{DateTime, Utc};
use gol_common::{GolError, Grid, JobReport, Result, StatusReport, TickReport};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// How a job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(JobReport),
    Failed(GolError),
}

/// A submitted job and its progress.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    grid: Arc<Grid>,
    turns: u32,
    turn: u32,
    working: bool,
    alive_count: u64,
    submitted_at: DateTime<Utc>,
    outcome: watch::Sender<Option<JobOutcome>>,
}

impl Job {
    /// Creates a job at turn 0.
    pub fn new(grid: Grid, turns: u32) -> Self {
        let (outcome, _) = watch::channel(None);
        let alive_count = grid.alive_count() as u64;
        Self {
            id: Uuid::new_v4(),
            grid: Arc::new(grid),
            turns,
            turn: 0,
            working: true,
            alive_count,
            submitted_at: Utc::now(),
            outcome,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The current generation.
    pub fn grid(&self) -> Arc<Grid> {
        self.grid.clone()
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn is_done(&self) -> bool {
        self.turn >= self.turns
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            working: self.working,
            turn: self.turn,
        }
    }

    pub fn tick(&self) -> TickReport {
        TickReport {
            turn: self.turn,
            alive_count: self.alive_count,
        }
    }

    /// Completed turns and the alive cells of the current generation.
    pub fn report(&self) -> JobReport {
        JobReport {
            completed_turns: self.turn,
            alive: self.grid.alive_cells(),
        }
    }

    /// Installs the next generation.
    pub fn commit(&mut self, next: Grid) {
        self.alive_count = next.alive_count() as u64;
        self.grid = Arc::new(next);
        self.turn += 1;
    }

    /// Receiver that sees the outcome once the job ends.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobOutcome>> {
        self.outcome.subscribe()
    }

    /// Ends the job and wakes every attached submitter.
    pub fn finish(&mut self, outcome: JobOutcome) {
        self.working = false;
        self.outcome.send_replace(Some(outcome));
    }
}

/// Waits for a job's outcome.
pub async fn await_outcome(mut rx: watch::Receiver<Option<JobOutcome>>) -> Result<JobReport> {
    let outcome = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| GolError::JobFailed("job dropped without an outcome".into()))?
        .clone();

    match outcome {
        Some(JobOutcome::Completed(report)) => Ok(report),
        Some(JobOutcome::Failed(err)) => Err(err),
        None => Err(GolError::Unexpected("outcome observed as empty".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_common::patterns::BLOCK;
    use gol_common::Cell;

    #[test]
    fn test_commit_advances_turn() {
        let mut job = Job::new(Grid::new(6, 6).unwrap(), 3);
        assert_eq!(job.status(), StatusReport { working: true, turn: 0 });

        job.commit(BLOCK.grid(Cell::new(1, 1), 6, 6).unwrap());
        assert_eq!(job.tick(), TickReport { turn: 1, alive_count: 4 });
        assert_eq!(job.report().alive.len(), 4);
        assert!(!job.is_done());
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_outcome() {
        let mut job = Job::new(Grid::new(4, 4).unwrap(), 0);
        let first = job.subscribe();
        let second = job.subscribe();

        let report = job.report();
        job.finish(JobOutcome::Completed(report.clone()));
        assert!(!job.is_working());

        assert_eq!(await_outcome(first).await.unwrap(), report);
        assert_eq!(await_outcome(second).await.unwrap(), report);

        // Subscribing after the fact still sees it
        assert_eq!(await_outcome(job.subscribe()).await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_failure_propagates() {
        let mut job = Job::new(Grid::new(4, 4).unwrap(), 5);
        let rx = job.subscribe();
        job.finish(JobOutcome::Failed(GolError::Terminated));
        assert!(matches!(await_outcome(rx).await, Err(GolError::Terminated)));
    }
}
