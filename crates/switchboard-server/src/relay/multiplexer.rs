//! Room multiplexer: room key → member connections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use switchboard_core::{ConnectionId, OutboundEvent, RoomKey};
use tracing::{debug, warn};

use crate::metrics::{RELAY_DELIVERIES_TOTAL, RELAY_DROPS_TOTAL};
use crate::websocket::connection::ClientConnection;

/// Maps room keys to member connections, with a reverse index so a
/// connection can leave every room at once.
///
/// A room exists only while it has members; the last `leave_all` prunes it.
#[derive(Debug, Default)]
pub struct RoomMultiplexer {
    rooms: HashMap<RoomKey, HashMap<ConnectionId, Arc<ClientConnection>>>,
    memberships: HashMap<ConnectionId, HashSet<RoomKey>>,
}

impl RoomMultiplexer {
    /// Create an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `room`.
    ///
    /// Returns `false` if it was already a member (no change).
    pub fn join(&mut self, connection: &Arc<ClientConnection>, room: RoomKey) -> bool {
        let id = connection.id();
        let joined = self
            .memberships
            .entry(id.clone())
            .or_default()
            .insert(room.clone());
        if joined {
            let _ = self
                .rooms
                .entry(room)
                .or_default()
                .insert(id.clone(), Arc::clone(connection));
        }
        joined
    }

    /// Deliver `event` to every current member of `room`.
    ///
    /// The event is serialized once and handed to each member's queue
    /// without waiting. Returns how many members accepted the frame; an
    /// empty or unknown room yields `0`.
    pub fn emit(&self, room: &RoomKey, event: &OutboundEvent) -> usize {
        let Some(members) = self.rooms.get(room) else {
            debug!(%room, event = event.name(), "emit to empty room");
            return 0;
        };

        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(%room, event = event.name(), error = %e, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        for (conn_id, conn) in members {
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                counter!(RELAY_DROPS_TOTAL).increment(1);
                warn!(%conn_id, %room, event = event.name(), "send queue full or closed, frame dropped");
            }
        }
        counter!(RELAY_DELIVERIES_TOTAL, "event" => event.name()).increment(delivered as u64);
        debug!(%room, event = event.name(), recipients = delivered, "fan-out complete");
        delivered
    }

    /// Remove `id` from every room it joined.
    ///
    /// Returns the number of rooms left. Unknown ids are a no-op.
    pub fn leave_all(&mut self, id: &ConnectionId) -> usize {
        let Some(joined) = self.memberships.remove(id) else {
            return 0;
        };
        for room in &joined {
            if let Some(members) = self.rooms.get_mut(room) {
                let _ = members.remove(id);
                if members.is_empty() {
                    let _ = self.rooms.remove(room);
                }
            }
        }
        joined.len()
    }

    /// IDs of the current members of `room`.
    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `id` is a member of `room`.
    pub fn is_member(&self, id: &ConnectionId, room: &RoomKey) -> bool {
        self.memberships
            .get(id)
            .is_some_and(|rooms| rooms.contains(room))
    }

    /// Rooms `id` currently belongs to.
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomKey> {
        self.memberships
            .get(id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
