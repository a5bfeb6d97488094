/*
 * Worker pool.
 *
 * The broker talks to workers through the `StripWorker` trait: remote
 * workers over gRPC, or in-process workers that run the same engine. The
 * pool wraps every strip call in a deadline and bounded retry, tracks which
 * workers are still alive, and cascades shutdown to all of them.
 */

use async_trait::async_trait;
use futures::future::join_all;
use gol_common::{
    AliveSet, BrokerConfig, GolError, GolMetrics, Grid, Result, RetryBuilder, RetryConfig,
    RowRange, ShutdownReport,
};
use gol_proto::grpc::gol_worker_client::GolWorkerClient;
use gol_proto::grpc::{ComputeStripRequest, ShutdownRequest};
use gol_proto::{alive_from_wire, error_from_status};
use gol_worker::StripExecutor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Something that can compute strips and be told to shut down.
#[async_trait]
pub trait StripWorker: Send + Sync {
    /// Identifier used in logs and shutdown reports.
    fn id(&self) -> &str;

    /// Computes the next-generation alive cells of `rows`.
    async fn compute_strip(&self, grid: Arc<Grid>, rows: RowRange) -> Result<AliveSet>;

    /// Asks the worker to exit.
    async fn shutdown(&self, reason: &str) -> Result<()>;
}

/// A worker process reached over gRPC.
pub struct RemoteWorker {
    address: String,
    client: GolWorkerClient<Channel>,
}

impl RemoteWorker {
    /// Connects eagerly; fails if the worker is unreachable.
    pub async fn connect(address: &str, max_message_bytes: usize) -> Result<Self> {
        let channel = Self::endpoint(address)?
            .connect()
            .await
            .map_err(|e| {
                GolError::Communication(format!("cannot connect to worker {}: {}", address, e))
            })?;
        Ok(Self::from_channel(address, channel, max_message_bytes))
    }

    /// Connects on first use.
    pub fn connect_lazy(address: &str, max_message_bytes: usize) -> Result<Self> {
        let channel = Self::endpoint(address)?.connect_lazy();
        Ok(Self::from_channel(address, channel, max_message_bytes))
    }

    fn endpoint(address: &str) -> Result<Endpoint> {
        Channel::from_shared(address.to_string())
            .map_err(|e| GolError::Config(format!("invalid worker address {}: {}", address, e)))
    }

    fn from_channel(address: &str, channel: Channel, max_message_bytes: usize) -> Self {
        let client = GolWorkerClient::new(channel)
            .max_decoding_message_size(max_message_bytes)
            .max_encoding_message_size(max_message_bytes);
        Self {
            address: address.to_string(),
            client,
        }
    }
}

#[async_trait]
impl StripWorker for RemoteWorker {
    fn id(&self) -> &str {
        &self.address
    }

    async fn compute_strip(&self, grid: Arc<Grid>, rows: RowRange) -> Result<AliveSet> {
        let request = ComputeStripRequest::for_strip(&grid, rows);
        let response = self
            .client
            .clone()
            .compute_strip(request)
            .await
            .map_err(error_from_status)?;
        Ok(alive_from_wire(response.into_inner().alive_cells))
    }

    async fn shutdown(&self, reason: &str) -> Result<()> {
        let response = self
            .client
            .clone()
            .shutdown(ShutdownRequest {
                reason: reason.to_string(),
            })
            .await
            .map_err(error_from_status)?;

        if response.into_inner().accepted {
            Ok(())
        } else {
            Err(GolError::Worker(format!("{} refused to shut down", self.address)))
        }
    }
}

/// A worker running the strip engine inside the broker process.
pub struct LocalWorker {
    id: String,
    executor: StripExecutor,
    stopped: AtomicBool,
}

impl LocalWorker {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_metrics(id, Arc::new(GolMetrics::new()))
    }

    pub fn with_metrics(id: impl Into<String>, metrics: Arc<GolMetrics>) -> Self {
        Self {
            id: id.into(),
            executor: StripExecutor::with_metrics(metrics),
            stopped: AtomicBool::new(false),
        }
    }

    /// Builds `n` in-process workers named `local-0`, `local-1`, ...
    pub fn pool(n: usize) -> Vec<Arc<dyn StripWorker>> {
        (0..n)
            .map(|i| Arc::new(LocalWorker::new(format!("local-{}", i))) as Arc<dyn StripWorker>)
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StripWorker for LocalWorker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn compute_strip(&self, grid: Arc<Grid>, rows: RowRange) -> Result<AliveSet> {
        if self.is_stopped() {
            return Err(GolError::Communication(format!("{} has shut down", self.id)));
        }
        let output = self.executor.execute(grid, rows).await?;
        Ok(output.alive)
    }

    async fn shutdown(&self, _reason: &str) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Member {
    worker: Arc<dyn StripWorker>,
    alive: AtomicBool,
}

/// The fixed set of workers serving the broker.
pub struct WorkerPool {
    members: Vec<Member>,
    call_timeout: Duration,
    retry: RetryConfig,
    metrics: Arc<GolMetrics>,
}

impl WorkerPool {
    pub fn new(
        workers: Vec<Arc<dyn StripWorker>>,
        call_timeout: Duration,
        retry: RetryConfig,
        metrics: Arc<GolMetrics>,
    ) -> Self {
        let members = workers
            .into_iter()
            .map(|worker| Member {
                worker,
                alive: AtomicBool::new(true),
            })
            .collect();
        Self {
            members,
            call_timeout,
            retry,
            metrics,
        }
    }

    /// Connects to every configured worker; any unreachable worker is fatal.
    pub async fn connect(config: &BrokerConfig, metrics: Arc<GolMetrics>) -> Result<Self> {
        let connects = config
            .worker_addresses
            .iter()
            .map(|addr| RemoteWorker::connect(addr, config.max_message_bytes));

        let mut workers: Vec<Arc<dyn StripWorker>> = Vec::new();
        for result in join_all(connects).await {
            workers.push(Arc::new(result?));
        }

        tracing::info!("Connected to {} workers", workers.len());
        Ok(Self::new(
            workers,
            config.call_timeout(),
            config.retry.clone(),
            metrics,
        ))
    }

    /// Number of registered workers, dead or alive.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Workers not yet declared dead, in registration order.
    pub fn live_workers(&self) -> Vec<Arc<dyn StripWorker>> {
        self.members
            .iter()
            .filter(|m| m.alive.load(Ordering::SeqCst))
            .map(|m| m.worker.clone())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Declares a worker dead. Returns false if it was already.
    pub fn mark_dead(&self, id: &str) -> bool {
        let Some(member) = self.members.iter().find(|m| m.worker.id() == id) else {
            return false;
        };
        let was_alive = member.alive.swap(false, Ordering::SeqCst);
        if was_alive {
            self.metrics.record_worker_lost();
            tracing::warn!("Worker {} declared dead", id);
        }
        was_alive
    }

    /// One strip call with a deadline per attempt and bounded retry.
    pub async fn compute(
        &self,
        worker: Arc<dyn StripWorker>,
        grid: Arc<Grid>,
        rows: RowRange,
    ) -> Result<AliveSet> {
        let call_timeout = self.call_timeout;
        let metrics = self.metrics.clone();

        let result = RetryBuilder::new(&self.retry)
            .operation(format!("compute_strip@{}", worker.id()))
            .on_retry(move |_, _| metrics.record_strip_retry())
            .run(|| {
                let worker = worker.clone();
                let grid = grid.clone();
                async move {
                    tokio::time::timeout(call_timeout, worker.compute_strip(grid, rows))
                        .await
                        .map_err(|_| GolError::Timeout(call_timeout))?
                }
            })
            .await;

        if result.is_err() {
            self.metrics.record_strip_failure();
        }
        result
    }

    /// Sends Shutdown to every registered worker concurrently.
    ///
    /// Failures are collected, never short-circuited.
    pub async fn shutdown_all(&self, reason: &str) -> ShutdownReport {
        let calls = self.members.iter().map(|m| {
            let worker = m.worker.clone();
            let call_timeout = self.call_timeout;
            async move {
                let result = tokio::time::timeout(call_timeout, worker.shutdown(reason))
                    .await
                    .unwrap_or(Err(GolError::Timeout(call_timeout)));
                (worker.id().to_string(), result)
            }
        });

        let mut report = ShutdownReport::default();
        for (id, result) in join_all(calls).await {
            match result {
                Ok(()) => report.notified.push(id),
                Err(e) => {
                    tracing::warn!("Could not shut down worker {}: {}", id, e);
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Fails the first `failures` calls with a retryable error.
    struct FlakyWorker {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StripWorker for FlakyWorker {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn compute_strip(&self, _grid: Arc<Grid>, _rows: RowRange) -> Result<AliveSet> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(GolError::Communication("connection reset".into()))
            } else {
                Ok(AliveSet::new())
            }
        }

        async fn shutdown(&self, _reason: &str) -> Result<()> {
            Err(GolError::Communication("gone".into()))
        }
    }

    fn fast_retry(max_retries: usize) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    fn pool_of(worker: Arc<dyn StripWorker>, retries: usize) -> (WorkerPool, Arc<GolMetrics>) {
        let metrics = Arc::new(GolMetrics::new());
        let pool = WorkerPool::new(
            vec![worker],
            Duration::from_secs(1),
            fast_retry(retries),
            metrics.clone(),
        );
        (pool, metrics)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let worker: Arc<dyn StripWorker> = Arc::new(FlakyWorker {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let (pool, metrics) = pool_of(worker.clone(), 3);
        let grid = Arc::new(Grid::new(4, 4).unwrap());

        assert!(pool.compute(worker, grid, RowRange::new(0, 4)).await.is_ok());
        assert_eq!(metrics.snapshot().strip_retries, 2);
        assert_eq!(metrics.snapshot().strips_failed, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let worker: Arc<dyn StripWorker> = Arc::new(FlakyWorker {
            failures: 10,
            calls: AtomicUsize::new(0),
        });
        let (pool, metrics) = pool_of(worker.clone(), 1);
        let grid = Arc::new(Grid::new(4, 4).unwrap());

        let result = pool.compute(worker, grid, RowRange::new(0, 4)).await;
        assert!(matches!(result, Err(GolError::Communication(_))));
        assert_eq!(metrics.snapshot().strips_failed, 1);
    }

    #[tokio::test]
    async fn test_mark_dead_shrinks_live_set() {
        let metrics = Arc::new(GolMetrics::new());
        let pool = WorkerPool::new(
            LocalWorker::pool(3),
            Duration::from_secs(1),
            fast_retry(0),
            metrics.clone(),
        );

        assert!(pool.mark_dead("local-1"));
        assert!(!pool.mark_dead("local-1"));
        assert!(!pool.mark_dead("nobody"));

        let ids: Vec<String> = pool.live_workers().iter().map(|w| w.id().to_string()).collect();
        assert_eq!(ids, vec!["local-0", "local-2"]);
        assert_eq!(pool.len(), 3);
        assert_eq!(metrics.snapshot().workers_lost, 1);
    }

    #[tokio::test]
    async fn test_shutdown_collects_every_failure() {
        let mut workers = LocalWorker::pool(2);
        workers.push(Arc::new(FlakyWorker {
            failures: 0,
            calls: AtomicUsize::new(0),
        }));
        let pool = WorkerPool::new(
            workers,
            Duration::from_secs(1),
            fast_retry(0),
            Arc::new(GolMetrics::new()),
        );

        let report = pool.shutdown_all("test").await;
        assert_eq!(report.notified, vec!["local-0", "local-1"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "flaky");
    }
}
