//! Event router: maps validated inbound events onto room operations.

use std::sync::Arc;

use metrics::counter;
use switchboard_core::{ConnectionId, EventError, InboundEvent, OutboundEvent, RoomKey};
use tokio::sync::mpsc;
use tracing::debug;

use super::multiplexer::RoomMultiplexer;
use super::registry::{ConnectionRegistry, RegistryError};
use crate::metrics::RELAY_EVENTS_REJECTED_TOTAL;
use crate::websocket::connection::ClientConnection;

/// Why an event was not applied.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Payload failed validation.
    #[error(transparent)]
    Event(#[from] EventError),

    /// The frame came from a connection that is no longer registered.
    #[error("unknown connection '{0}'")]
    UnknownConnection(ConnectionId),

    /// A join was published without an originating connection.
    #[error("'{0}' must be sent over a client connection")]
    JoinRequiresConnection(&'static str),

    /// Registration refused.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RouterError {
    /// Short label for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Event(EventError::Malformed(_)) => "malformed",
            Self::Event(EventError::UnknownEvent(_)) => "unknown_event",
            Self::Event(EventError::MissingField { .. }) => "missing_field",
            Self::Event(EventError::InvalidField { .. }) => "invalid_field",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::JoinRequiresConnection(_) => "join_without_connection",
            Self::Registry(_) => "capacity",
        }
    }
}

/// Effect of one routed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The sender subscribed to `room`.
    Joined {
        /// Room joined.
        room: RoomKey,
        /// `false` when the sender was already a member.
        newly_joined: bool,
    },
    /// An event was fanned out to `room`.
    Emitted {
        /// Target room.
        room: RoomKey,
        /// Members the frame was handed to.
        recipients: usize,
    },
}

/// Owns the registry and the room table and applies events to them.
#[derive(Debug)]
pub struct EventRouter {
    registry: ConnectionRegistry,
    rooms: RoomMultiplexer,
}

impl EventRouter {
    /// Create a router admitting at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            registry: ConnectionRegistry::new(max_connections),
            rooms: RoomMultiplexer::new(),
        }
    }

    /// Register a new connection around its outbound queue.
    pub fn connect(
        &mut self,
        tx: mpsc::Sender<Arc<str>>,
    ) -> Result<Arc<ClientConnection>, RouterError> {
        Ok(self.registry.register(tx)?)
    }

    /// Unregister `id` and drop all of its memberships.
    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        self.registry.unregister(id, &mut self.rooms)
    }

    /// Parse a raw frame from `id` and apply it.
    ///
    /// Rejected frames are counted and leave all state unchanged.
    pub fn handle_frame(&mut self, id: &ConnectionId, frame: &str) -> Result<Dispatch, RouterError> {
        let result = InboundEvent::parse(frame)
            .map_err(RouterError::from)
            .and_then(|event| self.route(Some(id), event));
        if let Err(e) = &result {
            counter!(RELAY_EVENTS_REJECTED_TOTAL, "reason" => e.reason()).increment(1);
        }
        result
    }

    /// Apply a validated event.
    ///
    /// `origin` is the sending connection; joins require one. Server-side
    /// publishes pass `None`.
    pub fn route(
        &mut self,
        origin: Option<&ConnectionId>,
        event: InboundEvent,
    ) -> Result<Dispatch, RouterError> {
        let name = event.name();
        if let Some(id) = origin {
            if !self.registry.contains(id) {
                return Err(RouterError::UnknownConnection(id.clone()));
            }
        }

        let (room, outbound) = match event {
            InboundEvent::Join { user_id } => return self.join(origin, name, RoomKey::user(user_id)),
            InboundEvent::JoinRole { role } => return self.join(origin, name, RoomKey::role(role)),
            InboundEvent::JoinRoom { room_id } => {
                return self.join(origin, name, RoomKey::discussion(room_id));
            }
            InboundEvent::Message(message) => (
                RoomKey::discussion(message.room_id()),
                OutboundEvent::Message(message.into_payload()),
            ),
            InboundEvent::Broadcast(broadcast) => (
                RoomKey::role(broadcast.role),
                OutboundEvent::Notification {
                    message: broadcast.message,
                },
            ),
            InboundEvent::NotifyUser(notification) => (
                RoomKey::user(notification.user_id),
                OutboundEvent::Notification {
                    message: notification.message,
                },
            ),
        };

        let recipients = self.rooms.emit(&room, &outbound);
        Ok(Dispatch::Emitted { room, recipients })
    }

    fn join(
        &mut self,
        origin: Option<&ConnectionId>,
        event: &'static str,
        room: RoomKey,
    ) -> Result<Dispatch, RouterError> {
        let Some(id) = origin else {
            return Err(RouterError::JoinRequiresConnection(event));
        };
        let connection = self
            .registry
            .get(id)
            .ok_or_else(|| RouterError::UnknownConnection(id.clone()))?;
        let newly_joined = self.rooms.join(connection, room.clone());
        debug!(conn_id = %id, %room, newly_joined, "joined room");
        Ok(Dispatch::Joined { room, newly_joined })
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Non-empty room count.
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    /// Read access to the room table.
    pub fn rooms(&self) -> &RoomMultiplexer {
        &self.rooms
    }
}
