//! Hub task: sole owner of the [`EventRouter`].
//!
//! Sessions and HTTP handlers talk to the hub through a cloneable
//! [`HubHandle`]. Commands are applied one at a time in arrival order, so
//! the room table needs no lock and frames from one connection are routed
//! in the order they were read.

use std::sync::Arc;

use switchboard_core::{ConnectionId, InboundEvent};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::router::{Dispatch, EventRouter, RouterError};
use crate::config::ServerConfig;
use crate::websocket::connection::ClientConnection;

/// Hub call failures.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub task has exited.
    #[error("relay hub is not running")]
    Stopped,

    /// The router refused the command.
    #[error(transparent)]
    Rejected(#[from] RouterError),
}

/// Snapshot of relay size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Non-empty rooms.
    pub rooms: usize,
}

enum Command {
    Connect {
        sender: mpsc::Sender<Arc<str>>,
        reply: oneshot::Sender<Result<Arc<ClientConnection>, RouterError>>,
    },
    Disconnect {
        id: ConnectionId,
    },
    Inbound {
        id: ConnectionId,
        frame: String,
    },
    Publish {
        event: InboundEvent,
        reply: oneshot::Sender<Result<Dispatch, RouterError>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { .. } => f.write_str("Connect"),
            Self::Disconnect { id } => write!(f, "Disconnect({id})"),
            Self::Inbound { id, .. } => write!(f, "Inbound({id})"),
            Self::Publish { event, .. } => write!(f, "Publish({})", event.name()),
            Self::Stats { .. } => f.write_str("Stats"),
        }
    }
}

/// The hub task state.
pub struct Hub {
    router: EventRouter,
    rx: mpsc::Receiver<Command>,
}

impl Hub {
    /// Create the hub and its handle.
    pub fn new(config: &ServerConfig) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(config.command_queue_capacity);
        let hub = Self {
            router: EventRouter::new(config.max_connections),
            rx,
        };
        (hub, HubHandle { tx })
    }

    /// Process commands until `cancel` fires or every handle is dropped.
    ///
    /// On cancel the queue is closed to new commands and whatever was
    /// already queued is still applied, so pending replies are answered.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("relay hub started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Some(cmd) = self.rx.recv().await {
            self.apply(cmd);
            drained += 1;
        }
        info!(
            drained,
            connections = self.router.connection_count(),
            rooms = self.router.room_count(),
            "relay hub stopped"
        );
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { sender, reply } => {
                let result = self.router.connect(sender);
                if let Err(e) = &result {
                    warn!(error = %e, "connection refused");
                }
                let _ = reply.send(result);
            }
            Command::Disconnect { id } => {
                let _ = self.router.disconnect(&id);
            }
            Command::Inbound { id, frame } => match self.router.handle_frame(&id, &frame) {
                Ok(dispatch) => debug!(conn_id = %id, ?dispatch, "inbound event applied"),
                Err(e) => warn!(conn_id = %id, reason = e.reason(), error = %e, "inbound event rejected"),
            },
            Command::Publish { event, reply } => {
                let name = event.name();
                let result = self.router.route(None, event);
                match &result {
                    Ok(dispatch) => debug!(event = name, ?dispatch, "published"),
                    Err(e) => warn!(event = name, error = %e, "publish rejected"),
                }
                let _ = reply.send(result);
            }
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: self.router.connection_count(),
                    rooms: self.router.room_count(),
                });
            }
        }
    }
}

/// Cloneable sender side of the hub.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Register a connection whose frames go to `sender`.
    pub async fn connect(
        &self,
        sender: mpsc::Sender<Arc<str>>,
    ) -> Result<Arc<ClientConnection>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { sender, reply }).await?;
        Ok(rx.await.map_err(|_| HubError::Stopped)??)
    }

    /// Unregister `id`. A stopped hub has nothing left to clean up.
    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.send(Command::Disconnect { id }).await;
    }

    /// Queue a raw inbound frame from `id`.
    ///
    /// Waits for command-queue space, which applies backpressure to the
    /// reading session without reordering its frames.
    pub async fn dispatch(&self, id: ConnectionId, frame: String) -> Result<(), HubError> {
        self.send(Command::Inbound { id, frame }).await
    }

    /// Emit a server-side event; returns the recipient count.
    pub async fn publish(&self, event: InboundEvent) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish { event, reply }).await?;
        match rx.await.map_err(|_| HubError::Stopped)?? {
            Dispatch::Emitted { recipients, .. } => Ok(recipients),
            Dispatch::Joined { .. } => Ok(0),
        }
    }

    /// Current connection and room counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply }).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    async fn send(&self, cmd: Command) -> Result<(), HubError> {
        self.tx.send(cmd).await.map_err(|_| HubError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn spawn_hub(max_connections: usize) -> (HubHandle, CancellationToken) {
        let config = ServerConfig {
            max_connections,
            ..ServerConfig::default()
        };
        let (hub, handle) = Hub::new(&config);
        let cancel = CancellationToken::new();
        let _ = tokio::spawn(hub.run(cancel.clone()));
        (handle, cancel)
    }

    async fn next_json(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
        let frame = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn connect_join_and_publish() {
        let (hub, _cancel) = spawn_hub(8);
        let (tx, mut rx) = mpsc::channel(8);
        let conn = hub.connect(tx).await.unwrap();

        hub.dispatch(conn.id().clone(), r#"{"event":"join","data":"u42"}"#.into())
            .await
            .unwrap();
        let event = InboundEvent::parse(r#"{"event":"notify-user","data":{"userId":"u42","message":"hi"}}"#)
            .unwrap();
        assert_eq!(hub.publish(event).await.unwrap(), 1);
        assert_eq!(
            next_json(&mut rx).await,
            json!({"event": "notification", "data": {"message": "hi"}})
        );
    }

    #[tokio::test]
    async fn frames_from_one_connection_apply_in_order() {
        let (hub, _cancel) = spawn_hub(8);
        let (tx, mut rx) = mpsc::channel(64);
        let conn = hub.connect(tx).await.unwrap();

        hub.dispatch(conn.id().clone(), r#"{"event":"join-room","data":"r"}"#.into())
            .await
            .unwrap();
        for i in 0..20 {
            let frame = json!({"event": "message", "data": {"roomId": "r", "seq": i}});
            hub.dispatch(conn.id().clone(), frame.to_string()).await.unwrap();
        }
        for i in 0..20 {
            let value = next_json(&mut rx).await;
            assert_eq!(value["data"]["seq"], i);
        }
    }

    #[tokio::test]
    async fn disconnect_clears_rooms() {
        let (hub, _cancel) = spawn_hub(8);
        let (tx, _rx) = mpsc::channel(8);
        let conn = hub.connect(tx).await.unwrap();
        hub.dispatch(conn.id().clone(), r#"{"event":"join-role","data":"admin"}"#.into())
            .await
            .unwrap();
        assert_eq!(hub.stats().await.unwrap(), HubStats { connections: 1, rooms: 1 });

        hub.disconnect(conn.id().clone()).await;
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn connect_past_limit_rejected() {
        let (hub, _cancel) = spawn_hub(1);
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        let _first = hub.connect(tx1).await.unwrap();
        let err = hub.connect(tx2).await.unwrap_err();
        assert_matches!(err, HubError::Rejected(RouterError::Registry(_)));
    }

    #[tokio::test]
    async fn publish_join_rejected() {
        let (hub, _cancel) = spawn_hub(8);
        let err = hub
            .publish(InboundEvent::Join { user_id: "u1".into() })
            .await
            .unwrap_err();
        assert_matches!(err, HubError::Rejected(RouterError::JoinRequiresConnection(_)));
    }

    #[tokio::test]
    async fn cancelled_hub_answers_queued_commands() {
        let (hub, handle) = Hub::new(&ServerConfig::default());
        let queued = tokio::spawn({
            let handle = handle.clone();
            async move { handle.stats().await }
        });
        timeout(TIMEOUT, async {
            while handle.tx.capacity() == handle.tx.max_capacity() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        hub.run(cancel).await;

        assert_eq!(queued.await.unwrap().unwrap(), HubStats::default());
        assert_matches!(handle.stats().await, Err(HubError::Stopped));
    }

    #[tokio::test]
    async fn stopped_hub_reports_stopped() {
        let (hub, cancel) = spawn_hub(8);
        cancel.cancel();
        let result = timeout(TIMEOUT, async {
            loop {
                if let Err(e) = hub.stats().await {
                    return e;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_matches!(result, HubError::Stopped);
    }
}
