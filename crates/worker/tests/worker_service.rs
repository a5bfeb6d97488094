/*
 * End-to-end worker tests over a real loopback gRPC connection.
 */

use gol_common::patterns::GLIDER;
use gol_common::{AliveSet, Cell, Grid, RowRange, WorkerConfig};
use gol_proto::alive_from_wire;
use gol_proto::grpc::gol_worker_client::GolWorkerClient;
use gol_proto::grpc::{ComputeStripRequest, ShutdownRequest};
use gol_worker::{next_generation, WorkerGrpcServer};
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_worker() -> (String, tokio::task::JoinHandle<gol_common::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = WorkerGrpcServer::new("it-worker", &WorkerConfig::default());
    let handle = tokio::spawn(server.serve_with_listener(listener));
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn test_strips_over_grpc_reassemble_next_generation() {
    let (endpoint, _handle) = start_worker().await;
    let mut client = GolWorkerClient::connect(endpoint).await.unwrap();

    let start = GLIDER.placed(Cell::new(2, 3), 9, 7);
    let grid = Grid::from_alive(9, 7, &start).unwrap();

    let mut merged = AliveSet::new();
    for rows in [RowRange::new(0, 3), RowRange::new(3, 2), RowRange::new(5, 2)] {
        let resp = client
            .compute_strip(ComputeStripRequest::for_strip(&grid, rows))
            .await
            .unwrap()
            .into_inner();
        merged.extend(alive_from_wire(resp.alive_cells));
    }

    assert_eq!(
        merged.normalized(),
        next_generation(&grid).alive_cells().normalized()
    );
}

#[tokio::test]
async fn test_shutdown_rpc_stops_server() {
    let (endpoint, handle) = start_worker().await;
    let mut client = GolWorkerClient::connect(endpoint).await.unwrap();

    let resp = client
        .shutdown(ShutdownRequest {
            reason: "test over".into(),
        })
        .await
        .unwrap();
    assert!(resp.into_inner().accepted);
    drop(client);

    let served = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop after Shutdown")
        .unwrap();
    assert!(served.is_ok());
}
