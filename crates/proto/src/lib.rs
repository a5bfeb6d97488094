/*
 * Protocol definitions for client <-> broker and broker <-> worker communication.
 *
 * This module contains:
 * - gRPC service definitions generated from proto/gol.proto
 * - Conversions between wire messages and the gol-common domain types
 */

pub mod convert;

// Include the generated gRPC code
pub mod generated {
    include!("generated/gol.v1.rs");
}

pub use convert::{
    alive_from_wire, alive_to_wire, error_from_status, grid_from_wire, status_from_error,
};

// Re-export gRPC service traits and types under a grpc namespace
pub mod grpc {
    pub use super::generated::*;
}
