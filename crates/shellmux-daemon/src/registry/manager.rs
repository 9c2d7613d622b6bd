//! Shell session lifecycle manager.
//!
//! Spawns login-shell subprocesses, tracks them by session id, and forwards
//! caller input to their stdin. Output and exit delivery is the router's
//! job; the registry attaches its listeners at spawn time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Notify, RwLock, mpsc};
use tracing::{debug, error, info, warn};

use shellmux_core::SessionId;
use shellmux_core::config::ShellConfig;

use super::types::{SessionState, SharedSessions};
use crate::router::EventRouter;

/// First id handed out for spawns that never produced a process. Linux pids
/// stay below 2^22, so this range cannot collide with a live pid.
const FAILED_SPAWN_ID_BASE: u32 = 0x8000_0000;

/// Session registry: the id → live session map and the four
/// identifier-addressed operations.
///
/// None of the operations surface per-session errors to the caller: a stale
/// or unknown id is ignored, and a failed spawn still yields an id whose
/// failure arrives as an exit event. In this fire-and-forget model the only
/// trustworthy failure signal is the exit code.
pub struct SessionRegistry {
    sessions: SharedSessions,
    shell: ShellConfig,
    router: EventRouter,
    /// Allocator for ids of spawns that failed before a pid existed.
    failed_spawn_ids: AtomicU32,
}

impl SessionRegistry {
    /// Create a registry spawning sessions with the given shell invocation
    /// and routing their events through `router`.
    pub fn new(shell: ShellConfig, router: EventRouter) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            shell,
            router,
            failed_spawn_ids: AtomicU32::new(FAILED_SPAWN_ID_BASE),
        }
    }

    /// Spawn a new shell session rooted at `initial_directory` and return
    /// its id.
    ///
    /// Returns once the process has been created; the shell may not yet be
    /// ready to read input, and early writes queue in the stdin pipe.
    /// Process-creation failures (missing shell binary, invalid directory)
    /// are not surfaced here: the returned id receives an immediate exit
    /// event with a non-zero code instead.
    pub async fn spawn(&self, initial_directory: impl Into<PathBuf>) -> SessionId {
        let working_directory = initial_directory.into();

        let mut cmd = Command::new(&self.shell.program);
        cmd.args(&self.shell.args)
            .current_dir(&working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(
            shell = %self.shell.program.display(),
            dir = %working_directory.display(),
            "Spawning shell session"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let id = self.next_failed_spawn_id();
                warn!(
                    session_id = id,
                    error = %e,
                    "Shell spawn failed, reporting via exit event"
                );
                self.router.emit_failed_spawn(id);
                return id;
            }
        };

        // The pid is present until the child has been waited on, which only
        // the router's exit path does.
        let id = child.id().unwrap_or_else(|| self.next_failed_spawn_id());

        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(32);
        if let Some(stdin) = child.stdin.take() {
            spawn_stdin_writer(id, stdin, stdin_rx);
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let kill_signal = Arc::new(Notify::new());

        let state = SessionState {
            stdin_tx: Some(stdin_tx),
            kill_signal: Arc::clone(&kill_signal),
            working_directory,
        };
        self.sessions.write().await.insert(id, state);

        // Listeners attach after the map insert so the exit path always
        // finds the entry it must evict.
        self.router.attach(
            id,
            child,
            stdout,
            stderr,
            kill_signal,
            Arc::clone(&self.sessions),
        );

        id
    }

    /// Forward `data` verbatim to a session's stdin.
    ///
    /// No terminator is appended and nothing is buffered beyond the stdin
    /// pipe itself. Unknown and exited ids are ignored.
    pub async fn write(&self, id: SessionId, data: Vec<u8>) {
        let stdin_tx = {
            let sessions = self.sessions.read().await;
            sessions.get(&id).and_then(|s| s.stdin_tx.clone())
        };

        match stdin_tx {
            Some(tx) => {
                if tx.send(data).await.is_err() {
                    debug!(session_id = id, "Write raced session teardown, dropped");
                }
            }
            None => debug!(session_id = id, "Write for unknown or ended session ignored"),
        }
    }

    /// Half-close a session's stdin.
    ///
    /// Queued writes flush before the stream closes; the process keeps
    /// running and producing output until it exits on its own. Unknown and
    /// exited ids are ignored.
    pub async fn end(&self, id: SessionId) {
        let mut sessions = self.sessions.write().await;
        // Dropping the sender lets the writer task drain queued writes and
        // then close the pipe.
        if let Some(state) = sessions.get_mut(&id)
            && state.stdin_tx.take().is_some()
        {
            debug!(session_id = id, "Stdin half-closed");
        } else {
            debug!(session_id = id, "End for unknown or ended session ignored");
        }
    }

    /// Request termination of a session.
    ///
    /// Fire-and-forget: the exit event, emitted by the router once the
    /// process dies and its output streams drain, is the only completion
    /// signal. Unknown and exited ids are ignored.
    pub async fn kill(&self, id: SessionId) {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(state) => {
                debug!(session_id = id, "Kill requested");
                state.kill_signal.notify_one();
            }
            None => debug!(session_id = id, "Kill for unknown session ignored"),
        }
    }

    /// Whether a session is currently registered as Running.
    pub async fn is_running(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Number of currently running sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn next_failed_spawn_id(&self) -> SessionId {
        self.failed_spawn_ids.fetch_add(1, Ordering::Relaxed)
    }
}

/// Writer task owning a session's stdin pipe.
///
/// Lives until the channel closes (half-close via `end`, or session
/// teardown) or a write fails; dropping the pipe handle delivers EOF to the
/// shell.
fn spawn_stdin_writer(id: SessionId, mut stdin: ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if let Err(e) = stdin.write_all(&data).await {
                error!(session_id = id, error = %e, "Failed to write to stdin");
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!(session_id = id, error = %e, "Failed to flush stdin");
                break;
            }
        }
        debug!(session_id = id, "Stdin writer finished");
    });
}
