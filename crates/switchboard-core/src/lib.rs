//! # switchboard-core
//!
//! Foundation types shared by every Switchboard crate.
//!
//! - [`ids::ConnectionId`]: opaque identifier for one live client channel
//! - [`room::RoomKey`]: namespaced room key (`user:`, `role:`, `room:`)
//! - [`events`]: typed inbound/outbound wire events with payload validation
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod room;

pub use events::{
    Broadcast, ChatMessage, DirectNotification, EventError, InboundEvent, OutboundEvent,
};
pub use ids::ConnectionId;
pub use room::{Namespace, RoomKey};
