//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use switchboard_core::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One live client channel.
///
/// Owned by its transport session; the registry and every room it joined
/// hold `Arc` references. Frames are pushed into a bounded queue drained by
/// the session's writer task.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    connected_at: Instant,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the sending half of its outbound queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Hand a frame to the writer without waiting.
    ///
    /// Returns `false` and counts a drop when the queue is full or the
    /// writer has gone away.
    pub fn send(&self, frame: Arc<str>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Frames dropped for this connection so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the writer side has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
