/*
 * Distributed Game of Life - Worker
 *
 * The worker is responsible for:
 * 1. Receiving strip requests from the broker (via gRPC)
 * 2. Computing the next generation of its assigned rows
 * 3. Returning the alive cells of those rows
 * 4. Exiting cleanly when the broker (or a signal) asks it to
 *
 * Workers hold no state between calls: every request carries the full
 * grid snapshot, so any worker can compute any strip.
 *
 * For production, use jemalloc in your main binary:
 * ```ignore
 * #[global_allocator]
 * static GLOBAL: gol_worker::Jemalloc = gol_worker::Jemalloc;
 * ```
 */

// Re-export jemalloc for easy use in binaries
pub use tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod executor;
pub mod grpc_server;
pub mod health;

pub use engine::{compute_strip, next_generation, next_state, run_turns};
pub use executor::{StripExecutor, StripOutput};
pub use grpc_server::WorkerGrpcServer;
pub use health::{setup_graceful_shutdown, HealthServer, HealthState, HealthStatus, StripPermit};
