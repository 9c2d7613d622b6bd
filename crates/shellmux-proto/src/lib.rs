//! shellmux Protocol Buffers
//!
//! Generated protobuf code for the shellmux gRPC API.
//!
//! This crate contains:
//! - `TerminalService` for session commands and the event subscription stream

#![allow(clippy::derive_partial_eq_without_eq)]

/// shellmux v1 API definitions.
///
/// All generated types and services are included here.
pub mod v1 {
    tonic::include_proto!("shellmux.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;
