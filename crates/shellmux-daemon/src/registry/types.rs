//! Session registry types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock, mpsc};

use shellmux_core::SessionId;

/// Live state for one running session.
///
/// The child process itself is owned by the router's exit task; the registry
/// entry holds the capabilities for reaching it (stdin feed, kill signal)
/// and exists exactly as long as the session counts as Running.
pub(crate) struct SessionState {
    /// Sender feeding the stdin writer task. `None` once `end` has
    /// half-closed the stream.
    pub stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
    /// Wakes the exit task to deliver a kill signal to the child.
    pub kill_signal: Arc<Notify>,
    /// Directory the shell was started in. Immutable for the session's
    /// lifetime.
    pub working_directory: PathBuf,
}

/// The id → session map shared between the registry and the router's exit
/// path, which evicts an entry in the same critical section that emits its
/// exit event.
pub(crate) type SharedSessions = Arc<RwLock<HashMap<SessionId, SessionState>>>;
