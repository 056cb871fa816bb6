//! # switchboard-server
//!
//! Axum HTTP + `WebSocket` relay.
//!
//! - [`relay`]: connection registry, room multiplexer, event router, and the
//!   hub task that owns them and processes every command in order
//! - [`websocket`]: per-connection lifecycle, outbound queue, heartbeat
//! - [`api`]: health, metrics, and HTTP publish endpoints
//! - [`server`]: router assembly, listener, graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod websocket;
