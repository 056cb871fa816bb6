//! WebSocket connection state, heartbeat, and per-connection session loop.

pub mod connection;
pub mod heartbeat;
pub mod session;
