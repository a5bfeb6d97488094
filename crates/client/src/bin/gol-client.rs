/*
 * Game of Life job submitter.
 *
 * Usage:
 *   gol-client --width 64 --height 64 --turns 1000 --pattern glider
 *
 * Optional flags:
 *   --broker <URI>             Broker endpoint [default: http://127.0.0.1:8030]
 *   --input <FILE>             Start from a saved {w}x{h}x{turn}.json snapshot
 *   --seed <N>                 Random start grid (when no pattern or input)
 *   --tick-interval-ms <MS>    Progress poll interval [default: 2000]
 *   --out-dir <DIR>            Where snapshots are written [default: out]
 *
 * While running, type a key and press enter:
 *   p  pause / resume     s  save snapshot
 *   q  detach             k  save snapshot and shut everything down
 */

use clap::Parser;
use gol_client::{BrokerClient, Command, Controller, Event, JsonFileSink, Outcome, SnapshotFile};
use gol_common::{load_json, random_grid, Cell, ClientConfig, Grid, Pattern};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Game of Life client
#[derive(Parser, Debug)]
#[command(name = "gol-client")]
#[command(about = "Submits a Game of Life job to the broker and controls it")]
struct Args {
    /// JSON client config
    #[arg(long)]
    config: Option<String>,

    /// Broker endpoint
    #[arg(long)]
    broker: Option<String>,

    #[arg(long, default_value_t = 64)]
    width: u32,

    #[arg(long, default_value_t = 64)]
    height: u32,

    #[arg(long, default_value_t = 100)]
    turns: u32,

    /// Saved snapshot to start from
    #[arg(long)]
    input: Option<String>,

    /// Named seed pattern placed at the centre
    #[arg(long)]
    pattern: Option<String>,

    /// Seed for a random start grid
    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long)]
    tick_interval_ms: Option<u64>,

    #[arg(long)]
    out_dir: Option<String>,
}

async fn initial_grid(args: &Args) -> Result<Grid, Box<dyn std::error::Error>> {
    if let Some(path) = &args.input {
        return Ok(SnapshotFile::load(path).await?.to_grid()?);
    }
    if let Some(name) = &args.pattern {
        let pattern =
            Pattern::by_name(name).ok_or_else(|| format!("unknown pattern '{}'", name))?;
        let origin = Cell::new(args.width / 2, args.height / 2);
        return Ok(pattern.grid(origin, args.width, args.height)?);
    }
    Ok(random_grid(args.width, args.height, args.seed)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gol_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config: ClientConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => ClientConfig::default(),
    };
    if let Some(broker) = &args.broker {
        config.broker_addr = broker.clone();
    }
    if let Some(ms) = args.tick_interval_ms {
        config.tick_interval_ms = ms;
    }
    if let Some(dir) = &args.out_dir {
        config.output_dir = dir.clone();
    }

    let grid = initial_grid(&args).await?;

    let broker = match BrokerClient::connect(&config).await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            tracing::error!("Cannot reach broker: {}", e);
            std::process::exit(1);
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::channel(8);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Event::AliveCellsCount { turn, alive } => {
                    tracing::info!("Turn {}: {} alive cells", turn, alive)
                }
                Event::StateChange { turn, state } => {
                    tracing::info!("Turn {}: {:?}", turn, state)
                }
                Event::SnapshotSaved { turn, location } => {
                    tracing::info!("Turn {}: snapshot saved to {}", turn, location)
                }
                Event::FinalTurnComplete { turn, alive } => {
                    tracing::info!("Final turn {} complete: {} alive cells", turn, alive.len())
                }
            }
        }
    });

    // Interactive stdin reads block; keep them off the runtime so exit never waits on them
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.parse::<Command>() {
                Ok(command) => {
                    if command_tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("{}", e),
            }
        }
    });

    let sink = Arc::new(JsonFileSink::new(&config.output_dir));
    let controller = Controller::new(broker, sink, event_tx, config.tick_interval());

    match controller.run(grid, args.turns, command_rx).await? {
        Outcome::Completed(report) => {
            tracing::info!("Completed {} turns", report.completed_turns)
        }
        Outcome::Detached { turn } => tracing::info!("Detached at turn {}", turn),
        Outcome::Killed { turn, shutdown } => {
            if !shutdown.all_notified() {
                tracing::warn!("Some workers did not acknowledge shutdown: {:?}", shutdown.failed);
            }
            tracing::info!("Shut down at turn {}", turn);
        }
    }
    Ok(())
}
