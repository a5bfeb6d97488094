// Game of Life broker.
//
// Usage:
//   gol-broker --listen 0.0.0.0:8030 --worker http://10.0.0.2:8031 --worker http://10.0.0.3:8031
//
// Optional flags:
//   --config <FILE>            JSON broker config; flags override its fields
//   --call-timeout-ms <MS>     Deadline for one strip call
//   --pause-timeout-ms <MS>    Auto-resume after this long paused (0 = never)
//   --failure-policy <P>       abort | repartition
//   --health <ADDR>            Serve /health/* and /metrics on ADDR
//
// Every worker must be reachable at startup; the broker exits otherwise.

use clap::Parser;
use gol_broker::{Broker, BrokerGrpcServer};
use gol_common::{load_json, BrokerConfig, FailurePolicy};
use gol_worker::{setup_graceful_shutdown, HealthServer, HealthState};
use std::net::SocketAddr;
use std::sync::Arc;

/// Game of Life broker process
#[derive(Parser, Debug)]
#[command(name = "gol-broker")]
#[command(about = "Partitions Game of Life jobs across a fixed pool of workers")]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<String>,

    /// gRPC listen address
    #[arg(long)]
    listen: Option<String>,

    /// Worker endpoint; repeat once per worker
    #[arg(long = "worker")]
    workers: Vec<String>,

    /// Deadline for one strip call, in milliseconds
    #[arg(long)]
    call_timeout_ms: Option<u64>,

    /// Pause auto-resume timeout in milliseconds (0 disables)
    #[arg(long)]
    pause_timeout_ms: Option<u64>,

    /// What to do once a worker has failed all retries
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Address for the HTTP health/metrics endpoint
    #[arg(long)]
    health: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gol_broker=info".parse()?)
                .add_directive("gol_common=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config: BrokerConfig = match &args.config {
        Some(path) => load_json(path)?,
        None => BrokerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if !args.workers.is_empty() {
        config.worker_addresses = args.workers;
    }
    if let Some(ms) = args.call_timeout_ms {
        config.call_timeout_ms = ms;
    }
    if let Some(ms) = args.pause_timeout_ms {
        config.pause_timeout_ms = ms;
    }
    if let Some(policy) = args.failure_policy {
        config.failure_policy = policy;
    }
    if args.health.is_some() {
        config.health_addr = args.health;
    }

    let addr: SocketAddr = config.listen_addr.parse()?;

    let broker = match Broker::connect(&config).await {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            tracing::error!("Cannot start broker: {}", e);
            std::process::exit(1);
        }
    };

    let health = HealthState::new(usize::MAX, broker.metrics());
    if let Some(health_addr) = &config.health_addr {
        let probe = HealthServer::new(health.clone(), health_addr.parse()?);
        tokio::spawn(async move {
            if let Err(e) = probe.serve().await {
                tracing::error!("Health server failed: {}", e);
            }
        });
    }

    // A signal terminates the broker the same way a Terminate call does
    {
        let broker = broker.clone();
        let health = health.clone();
        tokio::spawn(async move {
            if let Err(e) = setup_graceful_shutdown(health).await {
                tracing::error!("Failed to install signal handlers: {}", e);
                return;
            }
            broker.terminate("broker received a shutdown signal").await;
        });
    }

    tracing::info!(
        "Broker ready with {} workers (policy {:?})",
        broker.pool().len(),
        config.failure_policy
    );
    BrokerGrpcServer::new(broker.clone(), config.max_message_bytes)
        .serve(addr)
        .await?;

    health.initiate_shutdown();
    tracing::info!("Broker exited");
    Ok(())
}
