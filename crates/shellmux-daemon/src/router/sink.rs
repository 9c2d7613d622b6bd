//! Broadcast-backed event sink for gRPC fan-out.

use tokio::sync::broadcast;
use tracing::trace;

use shellmux_core::{EventSink, TerminalEvent};

/// Fans events out to every attached subscriber.
///
/// Wraps a `tokio::sync::broadcast` channel: subscribers come and go
/// without registration, and events emitted while nobody listens are
/// dropped. A subscriber that falls behind by more than the buffer
/// capacity loses the oldest events and is told how many it missed.
pub struct BroadcastSink {
    tx: broadcast::Sender<TerminalEvent>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a subscriber receiving every event from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.tx.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: TerminalEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event dropped, no subscribers attached");
        }
    }
}
