//! Event routing: subprocess stream notifications → tagged outbound events.
//!
//! The router converts per-session OS notifications into
//! [`shellmux_core::TerminalEvent`]s and publishes them through the
//! [`shellmux_core::EventSink`] injected at construction, guaranteeing
//! exactly one exit event per session.

mod pipeline;
mod sink;

pub use pipeline::{EventRouter, FAILED_SPAWN_EXIT_CODE};
pub use sink::BroadcastSink;
