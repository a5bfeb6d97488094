/*
 * gRPC Server for Broker
 *
 * Exposes the GolBroker service: SubmitJob plus the control plane. Every
 * handler is a thin translation between wire messages and `Broker` calls;
 * Terminate also stops this server once its response has been sent.
 */

use gol_common::{GolError, Result};
use gol_proto::grpc::gol_broker_server::{GolBroker, GolBrokerServer};
use gol_proto::grpc::{
    CheckStatusRequest, ControlResponse, InterruptRequest, JobResultResponse, PauseRequest,
    ResumeRequest, StatusResponse, SubmitJobRequest, TerminateRequest, TerminateResponse,
    TickRequest, TickResponse,
};
use gol_proto::{grid_from_wire, status_from_error};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::transport::server::TcpIncoming;
use tonic::{Request, Response, Status};
use tracing::Instrument;

use crate::broker::Broker;

/// Broker gRPC server.
#[derive(Clone)]
pub struct BrokerGrpcServer {
    broker: Arc<Broker>,
    max_message_bytes: usize,
}

impl BrokerGrpcServer {
    pub fn new(broker: Arc<Broker>, max_message_bytes: usize) -> Self {
        Self {
            broker,
            max_message_bytes,
        }
    }

    pub fn broker(&self) -> Arc<Broker> {
        self.broker.clone()
    }

    /// Wraps the server in the generated tonic service with size limits applied.
    pub fn into_service(self) -> GolBrokerServer<Self> {
        let limit = self.max_message_bytes;
        GolBrokerServer::new(self)
            .max_decoding_message_size(limit)
            .max_encoding_message_size(limit)
    }

    /// Serves on `addr` until Terminate.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already-bound listener until Terminate.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("Starting broker gRPC server on {}", addr);

        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|e| GolError::Communication(format!("listener setup failed: {}", e)))?;
        let broker = self.broker.clone();

        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve_with_incoming_shutdown(incoming, async move { broker.shutdown_signal().await })
            .await
            .map_err(|e| GolError::Communication(format!("broker server failed: {}", e)))?;

        tracing::info!("Broker gRPC server on {} stopped", addr);
        Ok(())
    }
}

#[tonic::async_trait]
impl GolBroker for BrokerGrpcServer {
    async fn submit_job(
        &self,
        request: Request<SubmitJobRequest>,
    ) -> std::result::Result<Response<JobResultResponse>, Status> {
        let req = request.into_inner();
        let grid = grid_from_wire(req.grid).map_err(|e| status_from_error(&e))?;

        let span = tracing::info_span!(
            gol_common::metrics::spans::SUBMIT_JOB,
            width = grid.width(),
            height = grid.height(),
            turns = req.turns
        );

        let report = self
            .broker
            .submit_job(grid, req.turns)
            .instrument(span)
            .await
            .map_err(|e| status_from_error(&e))?;

        Ok(Response::new(report.into()))
    }

    async fn check_status(
        &self,
        _request: Request<CheckStatusRequest>,
    ) -> std::result::Result<Response<StatusResponse>, Status> {
        Ok(Response::new(self.broker.check_status().await.into()))
    }

    async fn tick(
        &self,
        _request: Request<TickRequest>,
    ) -> std::result::Result<Response<TickResponse>, Status> {
        Ok(Response::new(self.broker.tick().await.into()))
    }

    async fn pause(
        &self,
        _request: Request<PauseRequest>,
    ) -> std::result::Result<Response<ControlResponse>, Status> {
        Ok(Response::new(self.broker.pause().await.into()))
    }

    async fn resume(
        &self,
        _request: Request<ResumeRequest>,
    ) -> std::result::Result<Response<ControlResponse>, Status> {
        Ok(Response::new(self.broker.resume().await.into()))
    }

    async fn interrupt(
        &self,
        _request: Request<InterruptRequest>,
    ) -> std::result::Result<Response<JobResultResponse>, Status> {
        Ok(Response::new(self.broker.interrupt().await.into()))
    }

    async fn terminate(
        &self,
        request: Request<TerminateRequest>,
    ) -> std::result::Result<Response<TerminateResponse>, Status> {
        let reason = request.into_inner().reason;
        let reason = if reason.is_empty() {
            "terminate requested".to_string()
        } else {
            reason
        };
        Ok(Response::new(self.broker.terminate(&reason).await.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker_pool::LocalWorker;
    use gol_common::patterns::BLOCK;
    use gol_common::{BrokerConfig, Cell};
    use gol_proto::grpc::GridFrame;

    fn server() -> BrokerGrpcServer {
        let broker = Broker::with_workers(LocalWorker::pool(2), &BrokerConfig::default());
        BrokerGrpcServer::new(Arc::new(broker), gol_common::DEFAULT_MAX_MESSAGE_BYTES)
    }

    #[tokio::test]
    async fn test_submit_job_handler() {
        let server = server();
        let grid = BLOCK.grid(Cell::new(2, 2), 6, 6).unwrap();

        let resp = server
            .submit_job(Request::new(SubmitJobRequest {
                grid: Some(GridFrame::from(&grid)),
                turns: 3,
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(resp.completed_turns, 3);
        assert_eq!(resp.alive_cells.len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_grid_rejected() {
        let server = server();
        let status = server
            .submit_job(Request::new(SubmitJobRequest {
                grid: Some(GridFrame {
                    width: 0,
                    height: 4,
                    cells: vec![],
                }),
                turns: 1,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = server
            .submit_job(Request::new(SubmitJobRequest {
                grid: None,
                turns: 1,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_terminated_broker_answers_aborted() {
        let server = server();
        let resp = server
            .terminate(Request::new(TerminateRequest {
                reason: String::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.workers_notified.len(), 2);

        let grid = gol_common::Grid::new(4, 4).unwrap();
        let status = server
            .submit_job(Request::new(SubmitJobRequest {
                grid: Some(GridFrame::from(&grid)),
                turns: 1,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Aborted);
    }
}
