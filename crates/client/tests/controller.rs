/*
 * Controller tests against an in-process broker with local workers.
 */

use async_trait::async_trait;
use gol_broker::{Broker, LocalWorker};
use gol_client::{BrokerApi, Command, Controller, Event, MemorySink, Outcome, State};
use gol_common::patterns::{BLOCK, GLIDER};
use gol_common::{
    random_grid, BrokerConfig, Cell, ControlReport, Grid, JobReport, Result, ShutdownReport,
    StatusReport, TickReport,
};
use gol_worker::run_turns;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Talks to a broker in the same process instead of over gRPC.
struct InProcess(Arc<Broker>);

#[async_trait]
impl BrokerApi for InProcess {
    async fn submit_job(&self, grid: Grid, turns: u32) -> Result<JobReport> {
        self.0.submit_job(grid, turns).await
    }

    async fn check_status(&self) -> Result<StatusReport> {
        Ok(self.0.check_status().await)
    }

    async fn tick(&self) -> Result<TickReport> {
        Ok(self.0.tick().await)
    }

    async fn pause(&self) -> Result<ControlReport> {
        Ok(self.0.pause().await)
    }

    async fn resume(&self) -> Result<ControlReport> {
        Ok(self.0.resume().await)
    }

    async fn interrupt(&self) -> Result<JobReport> {
        Ok(self.0.interrupt().await)
    }

    async fn terminate(&self, reason: &str) -> Result<ShutdownReport> {
        Ok(self.0.terminate(reason).await)
    }
}

struct Harness {
    broker: Arc<Broker>,
    sink: Arc<MemorySink>,
    events: mpsc::UnboundedReceiver<Event>,
    controller: Controller<InProcess>,
}

fn harness(workers: usize, tick: Duration) -> Harness {
    let broker = Arc::new(Broker::with_workers(
        LocalWorker::pool(workers),
        &BrokerConfig::default(),
    ));
    attach(broker, tick)
}

fn attach(broker: Arc<Broker>, tick: Duration) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let (tx, events) = mpsc::unbounded_channel();
    let controller = Controller::new(
        Arc::new(InProcess(broker.clone())),
        sink.clone(),
        tx,
        tick,
    );
    Harness {
        broker,
        sink,
        events,
        controller,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_completed_job_saves_final_generation() {
    let mut h = harness(3, Duration::from_secs(60));
    let grid = GLIDER.grid(Cell::new(2, 2), 16, 16).unwrap();
    let expected = run_turns(&grid, 8).alive_cells().normalized();
    let (_commands, rx) = mpsc::channel(1);

    let outcome = h.controller.run(grid, 8, rx).await.unwrap();
    let Outcome::Completed(report) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(report.alive.normalized(), expected);

    let saved = h.sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_name(), "16x16x8.json");

    let events = drain(&mut h.events);
    assert!(matches!(events.as_slice(), [
        Event::FinalTurnComplete { turn: 8, .. },
        Event::StateChange { turn: 8, state: State::Quitting },
    ]));
}

#[tokio::test]
async fn test_ticks_report_progress() {
    let mut h = harness(2, Duration::from_millis(10));
    let grid = random_grid(48, 48, 3).unwrap();
    let (_commands, rx) = mpsc::channel(1);

    let run = h.controller.run(grid, 2_000, rx);
    let outcome = run.await.unwrap();
    assert!(matches!(outcome, Outcome::Completed(_)));

    let ticks: Vec<u32> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            Event::AliveCellsCount { turn, .. } => Some(turn),
            _ => None,
        })
        .collect();
    assert!(!ticks.is_empty());
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(h.broker.check_status().await.turn, 2_000);
}

#[tokio::test]
async fn test_pause_blocks_other_commands() {
    let mut h = harness(2, Duration::from_secs(60));
    let grid = random_grid(32, 32, 8).unwrap();
    let (commands, rx) = mpsc::channel(8);

    commands.send(Command::TogglePause).await.unwrap();
    commands.send(Command::Snapshot).await.unwrap();
    commands.send(Command::Quit).await.unwrap();
    commands.send(Command::TogglePause).await.unwrap();

    let controller = h.controller;
    let run = tokio::spawn(async move { controller.run(grid, 1_000_000, rx).await });
    while !h.broker.check_status().await.working {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    commands.send(Command::Quit).await.unwrap();

    let outcome = run.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Detached { .. }));

    // Snapshot and the first quit were refused while paused
    assert!(h.sink.saved().is_empty());
    let states: Vec<State> = drain(&mut h.events)
        .into_iter()
        .filter_map(|e| match e {
            Event::StateChange { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![State::Paused, State::Executing, State::Quitting]);

    // Detaching left the job running
    assert!(h.broker.check_status().await.working);
    h.broker.terminate("test over").await;
}

#[tokio::test]
async fn test_quit_then_reattach_gets_the_same_job() {
    let h = harness(2, Duration::from_secs(60));
    let grid = BLOCK.grid(Cell::new(4, 4), 24, 24).unwrap();
    let broker = h.broker.clone();

    // The broker stays paused at turn 0 until the second client has attached
    broker.pause().await;
    let (commands, rx) = mpsc::channel(8);
    let controller = h.controller;
    let first = tokio::spawn(async move { controller.run(grid, 50, rx).await });
    while !broker.check_status().await.working {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    commands.send(Command::Quit).await.unwrap();
    assert!(matches!(first.await.unwrap().unwrap(), Outcome::Detached { turn: 0 }));

    // A new client with a different grid attaches and gets the original job's result
    let second = attach(broker.clone(), Duration::from_secs(60));
    let (_commands, rx) = mpsc::channel(1);
    let controller = second.controller;
    let run = tokio::spawn(async move { controller.run(Grid::new(24, 24).unwrap(), 3, rx).await });
    while broker.metrics().snapshot().jobs_attached == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    broker.resume().await;

    let outcome = run.await.unwrap().unwrap();
    let Outcome::Completed(report) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(report.completed_turns, 50);
    assert_eq!(report.alive.len(), 4);
    assert_eq!(second.sink.saved().len(), 1);
}

#[tokio::test]
async fn test_kill_saves_and_terminates() {
    let mut h = harness(2, Duration::from_secs(60));
    let grid = random_grid(32, 32, 4).unwrap();
    let (commands, rx) = mpsc::channel(8);
    commands.send(Command::Kill).await.unwrap();

    let outcome = h.controller.run(grid, 1_000_000, rx).await.unwrap();
    let Outcome::Killed { turn, shutdown } = outcome else {
        panic!("expected kill, got {:?}", outcome);
    };
    assert_eq!(shutdown.notified.len(), 2);
    assert!(h.broker.is_terminated());

    let saved = h.sink.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].turn, turn);

    let events = drain(&mut h.events);
    assert!(matches!(
        events.last(),
        Some(Event::StateChange { state: State::Quitting, .. })
    ));
}
