//! Event routing pipeline: subprocess streams → tagged outbound events.
//!
//! Data flow, per session:
//! ```text
//! child stdout ─┐
//!               ├─ chunk reader tasks ──→ EventSink::emit(Stdout / Stderr)
//! child stderr ─┘
//! child dies, readers at EOF → emit(Exit) + evict registry entry, atomically
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shellmux_core::{EventSink, SessionId, TerminalEvent};

use crate::registry::SharedSessions;

/// Exit code reported when process creation itself failed and there is no
/// real exit status to forward.
pub const FAILED_SPAWN_EXIT_CODE: i32 = 127;

const READ_BUF_SIZE: usize = 4096;

/// Routes a session's OS-level stream notifications into tagged events.
///
/// Three listeners are attached per session at spawn time: stdout, stderr,
/// and exit. Each stream's arrival order is preserved by its dedicated
/// reader task. The exit event is emitted only after both readers have hit
/// EOF and the child has been reaped, so no output already read from the
/// process can trail it.
pub struct EventRouter {
    sink: Arc<dyn EventSink>,
}

impl EventRouter {
    /// Create a router publishing through the given sink.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Wire the three listeners for a freshly spawned session.
    ///
    /// Takes ownership of the child: the exit path reaps it, emits the
    /// session's single exit event, and evicts the registry entry. The
    /// session must already be present in `sessions` when this is called.
    /// `kill_signal` wakes the exit path to deliver a termination signal.
    pub(crate) fn attach(
        &self,
        id: SessionId,
        mut child: Child,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        kill_signal: Arc<Notify>,
        sessions: SharedSessions,
    ) {
        let stdout_task = stdout
            .map(|s| spawn_stream_reader(id, s, StreamKind::Stdout, Arc::clone(&self.sink)));
        let stderr_task = stderr
            .map(|s| spawn_stream_reader(id, s, StreamKind::Stderr, Arc::clone(&self.sink)));

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            // Reap loop: wait for the child while honoring kill requests.
            // `Child::wait` is cancel-safe, so looping through the select is
            // fine however many kills arrive.
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    () = kill_signal.notified() => {
                        if let Err(e) = child.start_kill() {
                            debug!(session_id = id, error = %e, "Kill found process already gone");
                        }
                    }
                }
            };

            // Drain both streams to EOF before reporting the exit, so every
            // chunk already read from the process precedes its exit event.
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            let code = match status {
                Ok(status) => exit_code(&status),
                Err(e) => {
                    warn!(session_id = id, error = %e, "Failed to reap child");
                    -1
                }
            };

            // Eviction and emission share one critical section: no caller
            // can observe the exit event while the entry is still present,
            // nor find the entry gone before the event exists.
            let mut sessions = sessions.write().await;
            let state = sessions.remove(&id);
            sink.emit(TerminalEvent::Exit {
                session_id: id,
                code,
            });
            drop(sessions);

            match state {
                Some(state) => info!(
                    session_id = id,
                    code,
                    dir = %state.working_directory.display(),
                    "Session exited"
                ),
                None => warn!(session_id = id, "Exit path found no registry entry"),
            }
        });
    }

    /// Report a spawn that never produced a process.
    ///
    /// Emitted from a task so the event trails the spawn call's return,
    /// mirroring a real immediate process death.
    pub(crate) fn emit_failed_spawn(&self, id: SessionId) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            sink.emit(TerminalEvent::Exit {
                session_id: id,
                code: FAILED_SPAWN_EXIT_CODE,
            });
        });
    }
}

#[derive(Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn event(self, session_id: SessionId, data: String) -> TerminalEvent {
        match self {
            Self::Stdout => TerminalEvent::Stdout { session_id, data },
            Self::Stderr => TerminalEvent::Stderr { session_id, data },
        }
    }
}

/// Reader task pumping one stream into the sink, chunk by chunk.
fn spawn_stream_reader<R>(
    id: SessionId,
    mut stream: R,
    kind: StreamKind,
    sink: Arc<dyn EventSink>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUF_SIZE];
        let mut decoder = Utf8Carry::default();
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let data = decoder.decode(&buf[..n]);
                    if !data.is_empty() {
                        sink.emit(kind.event(id, data));
                    }
                }
                Err(e) => {
                    debug!(session_id = id, error = %e, "Stream read failed");
                    break;
                }
            }
        }
        if let Some(tail) = decoder.flush() {
            sink.emit(kind.event(id, tail));
        }
        debug!(session_id = id, "Stream reader finished");
    })
}

/// Incremental UTF-8 decoding that never splits a multi-byte character
/// across two events.
///
/// Bytes are forwarded otherwise untouched; only sequences that can never
/// become valid UTF-8 are replaced, since the wire format carries strings.
#[derive(Default)]
struct Utf8Carry {
    carry: Vec<u8>,
}

impl Utf8Carry {
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(s) => s.to_owned(),
            Err(e) if e.error_len().is_none() => {
                // Incomplete trailing sequence: hold it for the next chunk.
                self.carry = bytes.split_off(e.valid_up_to());
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            None
        } else {
            let tail = std::mem::take(&mut self.carry);
            Some(String::from_utf8_lossy(&tail).into_owned())
        }
    }
}

/// Map an exit status to the wire code: the process's own code, or
/// `128 + signal` for signal deaths on Unix.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn utf8_carry_holds_split_character() {
        let mut decoder = Utf8Carry::default();
        // "é" is 0xC3 0xA9; split it across two chunks.
        assert_eq!(decoder.decode(&[b'a', 0xC3]), "a");
        assert_eq!(decoder.decode(&[0xA9, b'b']), "éb");
        assert!(decoder.flush().is_none());
    }

    #[test]
    fn utf8_carry_replaces_invalid_sequences() {
        let mut decoder = Utf8Carry::default();
        let out = decoder.decode(&[b'x', 0xFF, b'y']);
        assert_eq!(out, "x\u{FFFD}y");
    }

    #[test]
    fn utf8_carry_flushes_dangling_tail() {
        let mut decoder = Utf8Carry::default();
        assert_eq!(decoder.decode(&[0xC3]), "");
        assert_eq!(decoder.flush(), Some("\u{FFFD}".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_maps_status_and_signals() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        // Wait-status encoding: exit code in the high byte, signal in the low.
        assert_eq!(exit_code(&ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(&ExitStatus::from_raw(0x100)), 1);
        assert_eq!(exit_code(&ExitStatus::from_raw(9)), 128 + 9);
    }

    #[test]
    fn stream_kind_tags_events() {
        let out = StreamKind::Stdout.event(3, "a".into());
        let err = StreamKind::Stderr.event(3, "b".into());
        assert!(matches!(out, TerminalEvent::Stdout { session_id: 3, .. }));
        assert!(matches!(err, TerminalEvent::Stderr { session_id: 3, .. }));
    }
}
