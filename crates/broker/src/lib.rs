/*
 * Distributed Game of Life - Broker
 *
 * The broker is responsible for:
 * 1. Accepting jobs (initial grid + turn count) from clients
 * 2. Splitting every generation into row strips, one per live worker
 * 3. Fanning strips out, waiting for all of them, and merging the results
 * 4. Answering status, tick, pause/resume, snapshot and terminate calls
 *    while a job runs
 */

pub mod broker;
pub mod control;
pub mod grpc_server;
pub mod job;
pub mod partition;
pub mod worker_pool;

pub use broker::Broker;
pub use control::{ControlGate, ControlState};
pub use grpc_server::BrokerGrpcServer;
pub use job::{Job, JobOutcome};
pub use partition::{split_rows, Partition};
pub use worker_pool::{LocalWorker, RemoteWorker, StripWorker, WorkerPool};
