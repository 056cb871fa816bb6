//! Per-connection session loop.
//!
//! One session runs per upgraded socket. It registers with the hub, then
//! runs three things side by side:
//!
//! - the writer task drains the outbound queue and sends Pings
//! - the heartbeat task watches for silence
//! - the reader loop (this task) forwards frames to the hub in order
//!
//! Whichever finishes first ends the session, after which the connection is
//! unregistered from the hub and every room it joined.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::relay::{HubError, HubHandle, RouterError};

/// How long the writer gets to flush a Close frame after the session ends.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Close frame sent to a socket the hub would not register.
fn refusal_frame(err: &HubError) -> CloseFrame {
    match err {
        HubError::Rejected(RouterError::Registry(_)) => CloseFrame {
            code: close_code::AGAIN,
            reason: "connection limit reached".into(),
        },
        HubError::Stopped => CloseFrame {
            code: close_code::AWAY,
            reason: "server shutting down".into(),
        },
        HubError::Rejected(_) => CloseFrame {
            code: close_code::ERROR,
            reason: "connection refused".into(),
        },
    }
}

/// Drive one WebSocket connection until it closes.
pub async fn run_ws_session(
    socket: WebSocket,
    hub: HubHandle,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(config.send_queue_capacity);

    let connection = match hub.connect(tx).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e, "closing websocket without registering");
            let _ = ws_tx.send(Message::Close(Some(refusal_frame(&e)))).await;
            return;
        }
    };
    let conn_id = connection.id().clone();
    let session = shutdown.child_token();

    let writer_session = session.clone();
    let writer_shutdown = shutdown.clone();
    let ping_interval = config.heartbeat_interval;
    let mut writer = tokio::spawn(async move {
        let mut ping = time::interval(ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text((&*frame).into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                () = writer_session.cancelled() => {
                    if writer_shutdown.is_cancelled() {
                        let _ = ws_tx
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AWAY,
                                reason: "server shutting down".into(),
                            })))
                            .await;
                    }
                    break;
                }
            }
        }
    });

    let mut heartbeat = tokio::spawn(run_heartbeat(
        Arc::clone(&connection),
        config.heartbeat_interval,
        config.heartbeat_timeout,
        session.clone(),
    ));

    let reader = async {
        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "websocket read error");
                    return "read error";
                }
            };
            connection.mark_alive();

            let text = match msg {
                Message::Text(text) => text.as_str().to_owned(),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!(conn_id = %conn_id, "ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Message::Close(_) => return "client closed",
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if hub.dispatch(conn_id.clone(), text).await.is_err() {
                return "hub stopped";
            }
        }
        "stream ended"
    };

    let reason = tokio::select! {
        reason = reader => reason,
        _ = &mut writer => "writer closed",
        result = &mut heartbeat => match result {
            Ok(HeartbeatResult::TimedOut) => "heartbeat timeout",
            _ => "heartbeat stopped",
        },
        () = shutdown.cancelled() => "server shutdown",
    };

    session.cancel();
    hub.disconnect(conn_id.clone()).await;

    if !writer.is_finished() {
        let _ = time::timeout(CLOSE_GRACE, &mut writer).await;
    }
    writer.abort();
    heartbeat.abort();

    info!(
        conn_id = %conn_id,
        reason,
        dropped = connection.drop_count(),
        duration_secs = connection.age().as_secs(),
        "websocket session ended"
    );
}
