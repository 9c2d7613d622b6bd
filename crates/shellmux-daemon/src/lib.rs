//! shellmux Daemon Library
//!
//! Core functionality for the shellmux daemon:
//! - Session registry owning shell subprocess lifecycle
//! - Event router fanning output and exit events out to subscribers
//! - gRPC server for client connections

pub mod registry;
pub mod router;
pub mod server;
