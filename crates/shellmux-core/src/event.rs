//! Terminal event model.
//!
//! Everything a session produces after spawn travels as a [`TerminalEvent`]:
//! output chunks from the two streams and the single terminal exit
//! notification. Events are pushed through an [`EventSink`], the capability
//! the daemon's router is constructed with. Production wires a
//! broadcast-backed sink into the gRPC layer; tests substitute an in-memory
//! collector.

/// Session identifier: the OS-assigned process id for successful spawns,
/// or a value from the synthetic failure range when process creation never
/// happened.
pub type SessionId = u32;

/// An output chunk or lifecycle notification, tagged with its session.
///
/// Per session, `Stdout` events preserve the arrival order of the stdout
/// stream and `Stderr` events that of the stderr stream; no ordering holds
/// between the two. `Exit` is emitted exactly once, after all output already
/// read from the process has been forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// A chunk read from the session's standard output.
    Stdout { session_id: SessionId, data: String },
    /// A chunk read from the session's standard error.
    Stderr { session_id: SessionId, data: String },
    /// The session's process exited with the given code.
    Exit { session_id: SessionId, code: i32 },
}

impl TerminalEvent {
    /// The session this event belongs to.
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::Stdout { session_id, .. }
            | Self::Stderr { session_id, .. }
            | Self::Exit { session_id, .. } => *session_id,
        }
    }

    /// Whether this is the terminal `Exit` notification.
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }
}

/// Outbound event channel capability.
///
/// `emit` must not block: it is called from the router's per-stream reader
/// tasks, and a slow consumer must never stall a session's output pump.
/// Implementations hand the event to a channel and return.
pub trait EventSink: Send + Sync {
    /// Publish one event. Delivery is fire-and-forget; there is no
    /// acknowledgment and no error path back to the session.
    fn emit(&self, event: TerminalEvent);
}
