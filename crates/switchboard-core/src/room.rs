//! Namespaced room keys.
//!
//! User ids, role names and discussion ids share one multiplexing table. The
//! namespace is part of the key, so `user:admin` and `role:admin` are
//! different rooms even though the raw identifiers are equal.

use std::fmt;

/// The three room namespaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Rooms keyed by user identifier (direct notifications).
    User,
    /// Rooms keyed by role name (broadcast notifications).
    Role,
    /// Rooms keyed by discussion identifier (chat fan-out).
    Discussion,
}

impl Namespace {
    /// Prefix used when rendering a key.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Role => "role",
            Self::Discussion => "room",
        }
    }
}

/// A room key: namespace plus raw identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey {
    namespace: Namespace,
    id: String,
}

impl RoomKey {
    /// Build a key in an explicit namespace.
    pub fn new(namespace: Namespace, id: impl Into<String>) -> Self {
        Self {
            namespace,
            id: id.into(),
        }
    }

    /// User room for `user_id`.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(Namespace::User, user_id)
    }

    /// Role room for `role`.
    pub fn role(role: impl Into<String>) -> Self {
        Self::new(Namespace::Role, role)
    }

    /// Discussion room for `room_id`.
    pub fn discussion(room_id: impl Into<String>) -> Self {
        Self::new(Namespace::Discussion, room_id)
    }

    /// Namespace of this key.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Raw identifier, without the namespace prefix.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.prefix(), self.id)
    }
}
