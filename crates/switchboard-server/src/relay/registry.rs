//! Connection registry.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use switchboard_core::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::multiplexer::RoomMultiplexer;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_REFUSED_TOTAL, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::websocket::connection::ClientConnection;

/// Registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The connection limit is reached.
    #[error("connection limit reached ({limit})")]
    CapacityReached {
        /// Configured limit.
        limit: usize,
    },
}

/// Live connections, keyed by ID.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry admitting at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Assign a fresh ID to a new connection and record it.
    pub fn register(
        &mut self,
        tx: mpsc::Sender<Arc<str>>,
    ) -> Result<Arc<ClientConnection>, RegistryError> {
        if self.connections.len() >= self.max_connections {
            counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
            return Err(RegistryError::CapacityReached {
                limit: self.max_connections,
            });
        }

        let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        let _ = self
            .connections
            .insert(connection.id().clone(), Arc::clone(&connection));

        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.connections.len() as f64);
        info!(conn_id = %connection.id(), active = self.connections.len(), "client connected");
        Ok(connection)
    }

    /// Forget `id` and remove it from every room.
    ///
    /// Idempotent: returns `false` if the connection was already gone.
    pub fn unregister(&mut self, id: &ConnectionId, rooms: &mut RoomMultiplexer) -> bool {
        let Some(connection) = self.connections.remove(id) else {
            debug!(conn_id = %id, "unregister for unknown connection");
            return false;
        };
        let left = rooms.leave_all(id);

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.connections.len() as f64);
        info!(
            conn_id = %id,
            rooms_left = left,
            dropped = connection.drop_count(),
            age_secs = connection.age().as_secs(),
            "client disconnected"
        );
        true
    }

    /// Look up a live connection.
    pub fn get(&self, id: &ConnectionId) -> Option<&Arc<ClientConnection>> {
        self.connections.get(id)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use switchboard_core::RoomKey;

    fn sender() -> mpsc::Sender<Arc<str>> {
        mpsc::channel(8).0
    }

    #[test]
    fn register_assigns_distinct_ids() {
        let mut registry = ConnectionRegistry::new(10);
        let a = registry.register(sender()).unwrap();
        let b = registry.register(sender()).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(registry.contains(a.id()));
        assert!(registry.contains(b.id()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_refuses_past_limit() {
        let mut registry = ConnectionRegistry::new(1);
        let _first = registry.register(sender()).unwrap();
        let err = registry.register(sender()).unwrap_err();
        assert_matches!(err, RegistryError::CapacityReached { limit: 1 });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_frees_slot_and_rooms() {
        let mut registry = ConnectionRegistry::new(1);
        let mut rooms = RoomMultiplexer::new();
        let conn = registry.register(sender()).unwrap();
        let _ = rooms.join(&conn, RoomKey::user("u42"));
        let _ = rooms.join(&conn, RoomKey::role("admin"));

        assert!(registry.unregister(conn.id(), &mut rooms));
        assert!(registry.is_empty());
        assert_eq!(rooms.room_count(), 0);
        assert!(registry.register(sender()).is_ok());
    }

    #[test]
    fn unregister_twice_is_noop() {
        let mut registry = ConnectionRegistry::new(4);
        let mut rooms = RoomMultiplexer::new();
        let conn = registry.register(sender()).unwrap();
        assert!(registry.unregister(conn.id(), &mut rooms));
        assert!(!registry.unregister(conn.id(), &mut rooms));
    }

    #[test]
    fn get_returns_registered_connection() {
        let mut registry = ConnectionRegistry::new(4);
        let conn = registry.register(sender()).unwrap();
        let found = registry.get(conn.id()).unwrap();
        assert!(Arc::ptr_eq(found, &conn));
        assert!(registry.get(&ConnectionId::from("missing")).is_none());
    }
}
