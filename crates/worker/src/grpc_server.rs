/*
 * gRPC Server for Worker
 *
 * Implements the GolWorker service: the broker sends a full grid snapshot
 * plus a row range and gets back the alive cells of that range for the
 * next generation. A Shutdown call starts the worker's graceful exit.
 */

use gol_common::{GolError, GolMetrics, Result, WorkerConfig};
use gol_proto::grpc::gol_worker_server::{GolWorker, GolWorkerServer};
use gol_proto::grpc::{
    ComputeStripRequest, ComputeStripResponse, ShutdownRequest, ShutdownResponse,
};
use gol_proto::{alive_to_wire, grid_from_wire, status_from_error};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::transport::server::TcpIncoming;
use tonic::{Request, Response, Status};
use tracing::Instrument;

use crate::executor::StripExecutor;
use crate::health::HealthState;

/// Worker gRPC server that computes strips on request.
#[derive(Clone)]
pub struct WorkerGrpcServer {
    /// Identifier used in logs
    worker_id: String,
    /// Runs the strip computations
    executor: Arc<StripExecutor>,
    /// Admission control and shutdown signalling
    health: HealthState,
    /// gRPC message size limit, both directions
    max_message_bytes: usize,
}

impl WorkerGrpcServer {
    /// Creates a new worker server from its configuration.
    pub fn new(worker_id: impl Into<String>, config: &WorkerConfig) -> Self {
        let metrics = Arc::new(GolMetrics::new());
        let health = HealthState::new(config.max_concurrent_strips, metrics);
        Self::with_health(worker_id, health, config.max_message_bytes)
    }

    /// Creates a server sharing an existing health state (and its metrics).
    pub fn with_health(
        worker_id: impl Into<String>,
        health: HealthState,
        max_message_bytes: usize,
    ) -> Self {
        let executor = Arc::new(StripExecutor::with_metrics(health.metrics()));
        Self {
            worker_id: worker_id.into(),
            executor,
            health,
            max_message_bytes,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    pub fn metrics(&self) -> Arc<GolMetrics> {
        self.health.metrics()
    }

    /// Wraps the server in the generated tonic service with size limits applied.
    pub fn into_service(self) -> GolWorkerServer<Self> {
        let limit = self.max_message_bytes;
        GolWorkerServer::new(self)
            .max_decoding_message_size(limit)
            .max_encoding_message_size(limit)
    }

    /// Serves on `addr` until shutdown is initiated.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already-bound listener until shutdown is initiated.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Starting worker {} gRPC server on {}", self.worker_id, addr);

        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| GolError::Communication(format!("listener setup failed: {}", e)))?;
        let health = self.health.clone();

        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve_with_incoming_shutdown(incoming, async move { health.shutdown_signal().await })
            .await
            .map_err(|e| GolError::Communication(format!("worker server failed: {}", e)))?;

        tracing::info!("Worker gRPC server on {} stopped", addr);
        Ok(())
    }
}

#[tonic::async_trait]
impl GolWorker for WorkerGrpcServer {
    async fn compute_strip(
        &self,
        request: Request<ComputeStripRequest>,
    ) -> std::result::Result<Response<ComputeStripResponse>, Status> {
        let req = request.into_inner();
        let rows = req.rows();

        let _permit = match self.health.try_accept_strip() {
            Some(permit) => permit,
            None if self.health.is_shutting_down() => {
                return Err(Status::unavailable(format!(
                    "worker {} is shutting down",
                    self.worker_id
                )));
            }
            None => {
                self.metrics().record_strip_rejected();
                return Err(status_from_error(&GolError::ResourceExhausted(format!(
                    "worker {} at capacity",
                    self.worker_id
                ))));
            }
        };

        let grid = grid_from_wire(req.grid).map_err(|e| status_from_error(&e))?;

        let span = tracing::debug_span!(
            gol_common::metrics::spans::COMPUTE_STRIP,
            worker = %self.worker_id,
            offset = rows.offset,
            height = rows.height
        );

        let output = self
            .executor
            .execute(Arc::new(grid), rows)
            .instrument(span)
            .await
            .map_err(|e| {
                tracing::warn!("Strip {}..{} failed: {}", rows.offset, rows.end(), e);
                status_from_error(&e)
            })?;

        Ok(Response::new(ComputeStripResponse {
            alive_cells: alive_to_wire(output.alive),
            elapsed_us: output.elapsed.as_micros() as u64,
        }))
    }

    async fn shutdown(
        &self,
        request: Request<ShutdownRequest>,
    ) -> std::result::Result<Response<ShutdownResponse>, Status> {
        let reason = request.into_inner().reason;
        tracing::info!("Worker {} asked to shut down: {}", self.worker_id, reason);

        self.health.initiate_shutdown();

        Ok(Response::new(ShutdownResponse { accepted: true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_common::patterns::BLINKER;
    use gol_common::{Cell, RowRange};
    use gol_proto::alive_from_wire;
    use gol_proto::grpc::GridFrame;

    fn server(max_strips: usize) -> WorkerGrpcServer {
        let config = gol_common::WorkerConfigBuilder::default()
            .max_concurrent_strips(max_strips)
            .build()
            .unwrap();
        WorkerGrpcServer::new("w-test", &config)
    }

    #[tokio::test]
    async fn test_compute_strip_returns_only_assigned_rows() {
        let server = server(4);
        // Horizontal blinker on row 2 becomes vertical on rows 1..=3
        let grid = BLINKER.grid(Cell::new(1, 2), 5, 5).unwrap();

        let req = ComputeStripRequest::for_strip(&grid, RowRange::new(0, 2));
        let resp = server.compute_strip(Request::new(req)).await.unwrap();
        let alive = alive_from_wire(resp.into_inner().alive_cells);

        assert_eq!(alive.into_vec(), vec![Cell::new(2, 1)]);
        assert_eq!(server.metrics().snapshot().strips_computed, 1);
    }

    #[tokio::test]
    async fn test_bad_frame_is_invalid_argument() {
        let server = server(4);
        let req = ComputeStripRequest {
            grid: Some(GridFrame {
                width: 4,
                height: 4,
                cells: vec![0; 5],
            }),
            strip_offset: 0,
            strip_height: 4,
        };

        let status = server.compute_strip(Request::new(req)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_full_worker_rejects_with_resource_exhausted() {
        let server = server(1);
        let _held = server.health().try_accept_strip().unwrap();

        let grid = gol_common::Grid::new(4, 4).unwrap();
        let req = ComputeStripRequest::for_strip(&grid, RowRange::new(0, 4));
        let status = server.compute_strip(Request::new(req)).await.unwrap_err();

        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
        assert_eq!(server.metrics().snapshot().strips_rejected, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rpc_stops_admission() {
        let server = server(4);
        let resp = server
            .shutdown(Request::new(ShutdownRequest {
                reason: "test".into(),
            }))
            .await
            .unwrap();
        assert!(resp.into_inner().accepted);
        assert!(server.health().is_shutting_down());

        let grid = gol_common::Grid::new(4, 4).unwrap();
        let req = ComputeStripRequest::for_strip(&grid, RowRange::new(0, 4));
        let status = server.compute_strip(Request::new(req)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }
}
