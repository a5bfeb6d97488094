/*
 * Job controller.
 *
 * Drives one job from the client side: submits it (or attaches to the job
 * already running on the broker), polls Tick while waiting, and turns key
 * commands into control-plane calls. Snapshot, quit and kill are refused
 * while paused, so a paused job can only be resumed.
 */

use gol_common::{GolError, Grid, JobReport, Result, ShutdownReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::broker_client::BrokerApi;
use crate::events::{Command, Event, State};
use crate::sink::{AliveSetSink, SnapshotFile};

/// How a controller run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The job reached its final turn.
    Completed(JobReport),
    /// The client detached; the job keeps running on the broker.
    Detached { turn: u32 },
    /// The broker and its workers were shut down.
    Killed { turn: u32, shutdown: ShutdownReport },
}

/// Client-side driver of one job.
pub struct Controller<B: BrokerApi + 'static> {
    broker: Arc<B>,
    sink: Arc<dyn AliveSetSink>,
    events: mpsc::UnboundedSender<Event>,
    tick_interval: Duration,
}

impl<B: BrokerApi + 'static> Controller<B> {
    pub fn new(
        broker: Arc<B>,
        sink: Arc<dyn AliveSetSink>,
        events: mpsc::UnboundedSender<Event>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            broker,
            sink,
            events,
            tick_interval,
        }
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Runs the job until it completes, the client quits, or the broker is killed.
    pub async fn run(
        &self,
        grid: Grid,
        turns: u32,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<Outcome> {
        let (width, height) = (grid.width(), grid.height());

        let status = self.broker.check_status().await?;
        if status.working {
            tracing::info!("Attaching to the running job at turn {}", status.turn);
        } else {
            tracing::info!("Submitting {}x{} job for {} turns", width, height, turns);
        }

        let mut submit: JoinHandle<Result<JobReport>> = {
            let broker = self.broker.clone();
            tokio::spawn(async move { broker.submit_job(grid, turns).await })
        };

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut paused = false;
        let mut commands_open = true;

        loop {
            tokio::select! {
                joined = &mut submit => {
                    let report = joined
                        .map_err(|e| GolError::Unexpected(format!("submit task failed: {}", e)))??;
                    return self.finish(width, height, report).await;
                }
                _ = ticker.tick(), if !paused => {
                    match self.broker.tick().await {
                        Ok(tick) => self.emit(Event::AliveCellsCount {
                            turn: tick.turn,
                            alive: tick.alive_count,
                        }),
                        Err(e) => tracing::warn!("Tick failed: {}", e),
                    }
                }
                command = commands.recv(), if commands_open => {
                    let Some(command) = command else {
                        commands_open = false;
                        continue;
                    };
                    if let Some(outcome) = self.handle(command, &mut paused, width, height).await? {
                        submit.abort();
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    async fn handle(
        &self,
        command: Command,
        paused: &mut bool,
        width: u32,
        height: u32,
    ) -> Result<Option<Outcome>> {
        if *paused && command != Command::TogglePause {
            tracing::warn!("Execution is paused; resume before {:?}", command);
            return Ok(None);
        }

        match command {
            Command::TogglePause if *paused => {
                let report = self.broker.resume().await?;
                *paused = false;
                tracing::info!("Resumed at turn {}", report.turn);
                self.emit(Event::StateChange {
                    turn: report.turn,
                    state: State::Executing,
                });
                Ok(None)
            }
            Command::TogglePause => {
                let report = self.broker.pause().await?;
                *paused = true;
                tracing::info!("Paused at turn {}", report.turn);
                self.emit(Event::StateChange {
                    turn: report.turn,
                    state: State::Paused,
                });
                Ok(None)
            }
            Command::Snapshot => {
                self.snapshot(width, height).await?;
                Ok(None)
            }
            Command::Quit => {
                let status = self.broker.check_status().await?;
                tracing::info!("Detaching at turn {}; the job keeps running", status.turn);
                self.emit(Event::StateChange {
                    turn: status.turn,
                    state: State::Quitting,
                });
                Ok(Some(Outcome::Detached { turn: status.turn }))
            }
            Command::Kill => {
                let turn = self.snapshot(width, height).await?;
                let shutdown = self.broker.terminate("client requested shutdown").await?;
                tracing::info!(
                    "Broker shut down ({} workers notified, {} failed)",
                    shutdown.notified.len(),
                    shutdown.failed.len()
                );
                self.emit(Event::StateChange {
                    turn,
                    state: State::Quitting,
                });
                Ok(Some(Outcome::Killed { turn, shutdown }))
            }
        }
    }

    /// Saves the current generation and returns its turn.
    async fn snapshot(&self, width: u32, height: u32) -> Result<u32> {
        let report = self.broker.interrupt().await?;
        let snapshot = SnapshotFile::new(width, height, &report);
        let location = self.sink.save(&snapshot).await?;
        self.emit(Event::SnapshotSaved {
            turn: snapshot.turn,
            location,
        });
        Ok(snapshot.turn)
    }

    async fn finish(&self, width: u32, height: u32, report: JobReport) -> Result<Outcome> {
        tracing::info!(
            "Job finished after {} turns with {} alive cells",
            report.completed_turns,
            report.alive.len()
        );
        self.emit(Event::FinalTurnComplete {
            turn: report.completed_turns,
            alive: report.alive.clone(),
        });

        let snapshot = SnapshotFile::new(width, height, &report);
        self.sink.save(&snapshot).await?;

        self.emit(Event::StateChange {
            turn: report.completed_turns,
            state: State::Quitting,
        });
        Ok(Outcome::Completed(report))
    }
}
