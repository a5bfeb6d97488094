// Game of Life strip worker.
//
// Usage:
//   gol-worker --listen 0.0.0.0:8031
//
// Optional flags:
//   --config <FILE>         JSON worker config; flags override its fields
//   --max-strips <N>        Concurrent strips before requests are rejected
//   --health <ADDR>         Serve /health/* and /metrics on ADDR
//   --id <NAME>             Name used in logs [default: the listen address]

use clap::Parser;
use gol_common::{load_json, WorkerConfig};
use gol_worker::{setup_graceful_shutdown, HealthServer, WorkerGrpcServer};
use std::net::SocketAddr;

#[global_allocator]
static GLOBAL: gol_worker::Jemalloc = gol_worker::Jemalloc;

/// Game of Life worker process
#[derive(Parser, Debug)]
#[command(name = "gol-worker")]
#[command(about = "Computes next-generation strips for the Game of Life broker")]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<String>,

    /// gRPC listen address
    #[arg(long)]
    listen: Option<String>,

    /// Maximum strips computed concurrently
    #[arg(long)]
    max_strips: Option<usize>,

    /// Address for the HTTP health/metrics endpoint
    #[arg(long)]
    health: Option<String>,

    /// Worker name used in logs
    #[arg(long)]
    id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gol_worker=info".parse()?)
                .add_directive("gol_common=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config: WorkerConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(max) = args.max_strips {
        config.max_concurrent_strips = max;
    }
    if args.health.is_some() {
        config.health_addr = args.health;
    }

    let addr: SocketAddr = config.listen_addr.parse()?;
    let worker_id = args.id.unwrap_or_else(|| config.listen_addr.clone());
    let server = WorkerGrpcServer::new(worker_id.clone(), &config);
    let health = server.health();

    if let Some(health_addr) = &config.health_addr {
        let probe = HealthServer::new(health.clone(), health_addr.parse()?);
        tokio::spawn(async move {
            if let Err(e) = probe.serve().await {
                tracing::error!("Health server failed: {}", e);
            }
        });
    }

    {
        let health = health.clone();
        tokio::spawn(async move {
            if let Err(e) = setup_graceful_shutdown(health).await {
                tracing::error!("Failed to install signal handlers: {}", e);
            }
        });
    }

    tracing::info!(
        "Worker {} starting (max {} concurrent strips)",
        worker_id,
        config.max_concurrent_strips
    );
    server.serve(addr).await?;

    health.wait_for_drain(config.drain_timeout()).await;
    tracing::info!("Worker {} exited", worker_id);
    Ok(())
}
