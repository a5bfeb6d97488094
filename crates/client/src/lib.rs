/*
 * Distributed Game of Life - Client
 *
 * The client is responsible for:
 * 1. Submitting a job to the broker (or attaching to the one running)
 * 2. Reporting progress every tick interval
 * 3. Pausing, snapshotting, detaching or shutting down on key commands
 * 4. Saving snapshots and the final generation through a sink
 */

pub mod broker_client;
pub mod controller;
pub mod events;
pub mod sink;

pub use broker_client::{BrokerApi, BrokerClient};
pub use controller::{Controller, Outcome};
pub use events::{Command, Event, State};
pub use sink::{AliveSetSink, JsonFileSink, MemorySink, SnapshotFile};
