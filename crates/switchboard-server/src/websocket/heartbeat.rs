//! Liveness monitoring.
//!
//! The session writer sends a Ping every interval; every inbound frame
//! (Pong included) refreshes [`ClientConnection::mark_alive`]. This monitor
//! wakes on the same interval and gives up on the connection once it has
//! been silent for longer than the timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client was silent for longer than the timeout.
    TimedOut,
    /// The session ended first.
    Cancelled,
}

/// Watch `connection` until it times out or `cancel` fires.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.idle_for() > timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
