/*
 * End-to-end: real worker and broker gRPC servers on loopback ports.
 */

use gol_broker::{Broker, BrokerGrpcServer};
use gol_common::{
    random_grid, BrokerConfigBuilder, FailurePolicy, JobReport, StatusReport, WorkerConfig,
};
use gol_proto::grpc::gol_broker_client::GolBrokerClient;
use gol_proto::grpc::{
    CheckStatusRequest, GridFrame, InterruptRequest, PauseRequest, ResumeRequest,
    SubmitJobRequest, TerminateRequest,
};
use gol_worker::{run_turns, WorkerGrpcServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

struct Cluster {
    broker: GolBrokerClient<Channel>,
    workers: Vec<JoinHandle<gol_common::Result<()>>>,
    server: JoinHandle<gol_common::Result<()>>,
}

async fn start_worker(name: &str) -> (String, JoinHandle<gol_common::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = WorkerGrpcServer::new(name, &WorkerConfig::default());
    (format!("http://{}", addr), tokio::spawn(server.serve_with_listener(listener)))
}

async fn start_cluster(n: usize, extra_addresses: &[&str]) -> Cluster {
    let mut addresses = Vec::new();
    let mut workers = Vec::new();
    for i in 0..n {
        let (addr, handle) = start_worker(&format!("w{}", i)).await;
        addresses.push(addr);
        workers.push(handle);
    }
    addresses.extend(extra_addresses.iter().map(|a| a.to_string()));

    let config = BrokerConfigBuilder::default()
        .worker_addresses(addresses)
        .failure_policy(FailurePolicy::Abort)
        .build()
        .unwrap();

    let mut remote: Vec<Arc<dyn gol_broker::StripWorker>> = Vec::new();
    for addr in &config.worker_addresses {
        remote.push(Arc::new(
            gol_broker::RemoteWorker::connect_lazy(addr, config.max_message_bytes).unwrap(),
        ));
    }
    let broker = Arc::new(Broker::with_workers(remote, &config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(
        BrokerGrpcServer::new(broker, config.max_message_bytes).serve_with_listener(listener),
    );

    let broker = GolBrokerClient::connect(endpoint).await.unwrap();
    Cluster {
        broker,
        workers,
        server,
    }
}

#[tokio::test]
async fn test_job_over_grpc_matches_reference() {
    let mut cluster = start_cluster(3, &[]).await;
    let grid = random_grid(40, 25, 1234).unwrap();

    let resp = cluster
        .broker
        .submit_job(SubmitJobRequest {
            grid: Some(GridFrame::from(&grid)),
            turns: 20,
        })
        .await
        .unwrap()
        .into_inner();
    let report = JobReport::from(resp);

    assert_eq!(report.completed_turns, 20);
    assert_eq!(
        report.alive.normalized(),
        run_turns(&grid, 20).alive_cells().normalized()
    );

    let status = StatusReport::from(
        cluster
            .broker
            .check_status(CheckStatusRequest {})
            .await
            .unwrap()
            .into_inner(),
    );
    assert_eq!(status, StatusReport { working: false, turn: 20 });
}

#[tokio::test]
async fn test_control_plane_over_grpc() {
    let mut cluster = start_cluster(2, &[]).await;
    let grid = random_grid(64, 64, 99).unwrap();

    let mut submitter = cluster.broker.clone();
    let job = tokio::spawn(async move {
        submitter
            .submit_job(SubmitJobRequest {
                grid: Some(GridFrame::from(&grid)),
                turns: 1_000_000,
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let paused = cluster.broker.pause(PauseRequest {}).await.unwrap().into_inner();
    assert!(paused.working);

    let snapshot = JobReport::from(
        cluster
            .broker
            .interrupt(InterruptRequest {})
            .await
            .unwrap()
            .into_inner(),
    );
    assert_eq!(snapshot.completed_turns, paused.turn);

    let resumed = cluster.broker.resume(ResumeRequest {}).await.unwrap().into_inner();
    assert_eq!(resumed.turn, paused.turn);

    let terminated = cluster
        .broker
        .terminate(TerminateRequest {
            reason: "end of test".into(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(terminated.workers_notified.len(), 2);
    assert!(terminated.workers_failed.is_empty());

    // The running submission ends with the terminated status
    let status = job.await.unwrap().unwrap_err();
    assert_eq!(status.code(), tonic::Code::Aborted);

    // Workers and broker all stop on their own
    for handle in cluster.workers.drain(..) {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker kept running after Terminate")
            .unwrap()
            .unwrap();
    }
    tokio::time::timeout(Duration::from_secs(5), cluster.server)
        .await
        .expect("broker kept running after Terminate")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_terminate_reports_unreachable_worker() {
    // Nothing listens on port 1; the lazy channel fails on first use
    let mut cluster = start_cluster(1, &["http://127.0.0.1:1"]).await;

    let report = cluster
        .broker
        .terminate(TerminateRequest {
            reason: "cleanup".into(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(report.workers_notified.len(), 1);
    assert_eq!(report.workers_failed.len(), 1);
    assert_eq!(report.workers_failed[0].worker, "http://127.0.0.1:1");
}
