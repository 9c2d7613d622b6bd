#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity
#![cfg(unix)]

//! Integration tests for the session registry and event router.
//!
//! Exercises the full spawn → write → output → end/kill → exit flow against
//! real `/bin/sh` subprocesses, observing events through an in-memory sink.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use shellmux_core::config::ShellConfig;
use shellmux_core::{EventSink, SessionId, TerminalEvent};
use shellmux_daemon::registry::SessionRegistry;
use shellmux_daemon::router::{EventRouter, FAILED_SPAWN_EXIT_CODE};

/// Sink forwarding every event into an unbounded channel.
struct ChannelSink(mpsc::UnboundedSender<TerminalEvent>);

impl EventSink for ChannelSink {
    fn emit(&self, event: TerminalEvent) {
        let _ = self.0.send(event);
    }
}

type EventRx = mpsc::UnboundedReceiver<TerminalEvent>;

/// Registry spawning plain `/bin/sh` sessions; non-interactive keeps test
/// output free of prompt noise.
fn test_registry() -> (SessionRegistry, EventRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shell = ShellConfig {
        program: "/bin/sh".into(),
        args: Vec::new(),
    };
    let registry = SessionRegistry::new(shell, EventRouter::new(Arc::new(ChannelSink(tx))));
    (registry, rx)
}

async fn next_event(rx: &mut EventRx) -> TerminalEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Accumulate stdout text for `id` until it contains `needle`, skipping
/// stderr noise.
async fn stdout_until(rx: &mut EventRx, id: SessionId, needle: &str) -> String {
    let mut text = String::new();
    loop {
        match next_event(rx).await {
            TerminalEvent::Stdout { session_id, data } if session_id == id => {
                text.push_str(&data);
                if text.contains(needle) {
                    return text;
                }
            }
            TerminalEvent::Exit { .. } => {
                panic!("session exited before {needle:?} arrived, stdout so far: {text:?}")
            }
            _ => {}
        }
    }
}

async fn wait_for_exit(rx: &mut EventRx, id: SessionId) -> i32 {
    loop {
        if let TerminalEvent::Exit { session_id, code } = next_event(rx).await
            && session_id == id
        {
            return code;
        }
    }
}

/// Assert no further events arrive within a grace period.
async fn assert_quiet(rx: &mut EventRx) {
    let extra = timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(extra.is_err(), "unexpected trailing event: {extra:?}");
}

#[tokio::test]
async fn spawn_echo_roundtrip_and_clean_exit() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;
    assert!(registry.is_running(id).await);

    registry.write(id, b"echo hi\n".to_vec()).await;
    let out = stdout_until(&mut rx, id, "hi\n").await;
    assert!(out.contains("hi\n"));

    registry.end(id).await;
    assert_eq!(wait_for_exit(&mut rx, id).await, 0);
    assert!(!registry.is_running(id).await);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn write_is_passthrough_without_terminator() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;

    // The command only runs if the two fragments join without any
    // terminator inserted between them.
    registry.write(id, b"echo spl".to_vec()).await;
    registry.write(id, b"iced\n".to_vec()).await;
    let out = stdout_until(&mut rx, id, "spliced\n").await;
    assert!(out.contains("spliced\n"));

    registry.end(id).await;
    assert_eq!(wait_for_exit(&mut rx, id).await, 0);
}

#[tokio::test]
async fn stderr_routed_separately_from_stdout() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;
    registry
        .write(id, b"echo to-out; echo to-err >&2\n".to_vec())
        .await;

    let mut saw_stdout = false;
    let mut saw_stderr = false;
    while !(saw_stdout && saw_stderr) {
        match next_event(&mut rx).await {
            TerminalEvent::Stdout { session_id, data } => {
                assert_eq!(session_id, id);
                saw_stdout |= data.contains("to-out");
                assert!(!data.contains("to-err"), "stderr leaked into stdout: {data:?}");
            }
            TerminalEvent::Stderr { session_id, data } => {
                assert_eq!(session_id, id);
                saw_stderr |= data.contains("to-err");
            }
            TerminalEvent::Exit { .. } => panic!("session exited before both streams arrived"),
        }
    }

    registry.end(id).await;
    assert_eq!(wait_for_exit(&mut rx, id).await, 0);
}

#[tokio::test]
async fn stdout_order_preserved_across_stderr_interleaving() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;
    registry
        .write(
            id,
            b"for i in 1 2 3 4 5; do echo o$i; echo e$i >&2; done\n".to_vec(),
        )
        .await;

    let out = stdout_until(&mut rx, id, "o5\n").await;
    assert_eq!(out, "o1\no2\no3\no4\no5\n");

    registry.end(id).await;
    assert_eq!(wait_for_exit(&mut rx, id).await, 0);
}

#[tokio::test]
async fn exit_emitted_once_despite_repeated_kills() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;
    registry.kill(id).await;
    registry.kill(id).await;
    registry.kill(id).await;

    let code = wait_for_exit(&mut rx, id).await;
    assert_ne!(code, 0);
    assert!(!registry.is_running(id).await);
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn operations_on_unknown_id_are_noops() {
    let (registry, mut rx) = test_registry();

    registry.write(9999, b"echo boo\n".to_vec()).await;
    registry.end(9999).await;
    registry.kill(9999).await;

    assert_quiet(&mut rx).await;
    assert_eq!(registry.active_count().await, 0);
}

#[tokio::test]
async fn operations_after_exit_are_noops() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let id = registry.spawn(dir.path()).await;
    registry.end(id).await;
    assert_eq!(wait_for_exit(&mut rx, id).await, 0);

    registry.write(id, b"echo late\n".to_vec()).await;
    registry.end(id).await;
    registry.kill(id).await;
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn failed_spawn_reports_exit_event_only() {
    let (registry, mut rx) = test_registry();

    let id = registry.spawn("/does/not/exist/anywhere").await;
    assert!(!registry.is_running(id).await);

    let event = next_event(&mut rx).await;
    assert_eq!(
        event,
        TerminalEvent::Exit {
            session_id: id,
            code: FAILED_SPAWN_EXIT_CODE,
        }
    );
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn spawn_assigns_distinct_ids() {
    let (registry, mut rx) = test_registry();
    let dir = tempfile::tempdir().unwrap();

    let a = registry.spawn(dir.path()).await;
    let b = registry.spawn(dir.path()).await;
    assert_ne!(a, b);
    assert_eq!(registry.active_count().await, 2);

    registry.end(a).await;
    registry.end(b).await;

    let mut exited = HashSet::new();
    while exited.len() < 2 {
        if let TerminalEvent::Exit { session_id, code } = next_event(&mut rx).await {
            assert_eq!(code, 0);
            exited.insert(session_id);
        }
    }
    assert_eq!(exited, HashSet::from([a, b]));
    assert_eq!(registry.active_count().await, 0);
}
