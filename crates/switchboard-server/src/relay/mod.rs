//! Room relay: who is connected, who is in which room, and what an inbound
//! event does.
//!
//! [`registry::ConnectionRegistry`] and [`multiplexer::RoomMultiplexer`] are
//! plain single-owner data structures. [`router::EventRouter`] composes them
//! and is owned by the [`hub::Hub`] task, which applies commands one at a
//! time. Nothing else can reach the room table.

pub mod hub;
pub mod multiplexer;
pub mod registry;
pub mod router;

pub use hub::{Hub, HubError, HubHandle, HubStats};
pub use multiplexer::RoomMultiplexer;
pub use registry::{ConnectionRegistry, RegistryError};
pub use router::{Dispatch, EventRouter, RouterError};
