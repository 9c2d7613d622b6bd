//! Session registry: subprocess lifecycle and identifier-addressed
//! operations.
//!
//! The registry is the single source of truth for "is this session alive."
//! It owns the id → process handle map and exposes the four session
//! commands; output and exit delivery belongs to [`crate::router`].

mod manager;
mod types;

pub use manager::SessionRegistry;
pub(crate) use types::{SessionState, SharedSessions};
