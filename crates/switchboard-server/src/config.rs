//! Runtime server configuration.

use std::time::Duration;

use switchboard_settings::ServerSettings;

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Commands buffered in front of the hub.
    pub command_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before a connection is dropped.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            send_queue_capacity: 256,
            command_queue_capacity: 1024,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            send_queue_capacity: s.send_queue_capacity.max(1),
            command_queue_capacity: s.command_queue_capacity.max(1),
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(s.heartbeat_timeout_ms.max(1)),
            max_message_size: s.max_message_size,
        }
    }
}
