//! Wire events exchanged with clients.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//!
//! Inbound payloads are validated into [`InboundEvent`] before anything
//! touches the room table. A frame with a missing or mistyped field is
//! rejected with an [`EventError`] instead of being routed to an undefined
//! room.
//!
//! Outbound frames are built from [`OutboundEvent`], which serializes to the
//! same envelope shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Join the caller's user room.
pub const JOIN: &str = "join";
/// Join a role room.
pub const JOIN_ROLE: &str = "join-role";
/// Join a discussion room.
pub const JOIN_ROOM: &str = "join-room";
/// Chat message to a discussion room (inbound and outbound).
pub const MESSAGE: &str = "message";
/// Notification to every holder of a role.
pub const BROADCAST: &str = "broadcast";
/// Notification to a single user.
pub const NOTIFY_USER: &str = "notify-user";
/// Outbound notification event.
pub const NOTIFICATION: &str = "notification";

/// Longest accepted room identifier, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Why an inbound frame was rejected.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The frame is not a JSON envelope.
    #[error("malformed event frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The event name is not one the relay understands.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// A required field is absent or null.
    #[error("event '{event}' is missing required field '{field}'")]
    MissingField {
        /// Event name.
        event: &'static str,
        /// Field name (`data` for bare-string payloads).
        field: &'static str,
    },

    /// A field is present but has the wrong shape.
    #[error("event '{event}' field '{field}' must be {expected}")]
    InvalidField {
        /// Event name.
        event: &'static str,
        /// Field name.
        field: &'static str,
        /// Human description of the accepted shape.
        expected: &'static str,
    },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A validated inbound event.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    /// `join`: subscribe to a user room.
    Join {
        /// User identifier.
        user_id: String,
    },
    /// `join-role`: subscribe to a role room.
    JoinRole {
        /// Role name.
        role: String,
    },
    /// `join-room`: subscribe to a discussion room.
    JoinRoom {
        /// Discussion identifier.
        room_id: String,
    },
    /// `message`: chat message fanned out to a discussion room.
    Message(ChatMessage),
    /// `broadcast`: notification to a role room.
    Broadcast(Broadcast),
    /// `notify-user`: notification to a user room.
    NotifyUser(DirectNotification),
}

impl InboundEvent {
    /// Parse and validate a raw text frame.
    pub fn parse(frame: &str) -> Result<Self, EventError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        Self::from_parts(&envelope.event, envelope.data)
    }

    /// Validate an event given its name and payload separately.
    ///
    /// Used by the HTTP publish endpoints, whose body is the bare payload.
    pub fn from_parts(event: &str, data: Value) -> Result<Self, EventError> {
        match event {
            JOIN => Ok(Self::Join {
                user_id: identifier(JOIN, "data", Some(&data))?,
            }),
            JOIN_ROLE => Ok(Self::JoinRole {
                role: identifier(JOIN_ROLE, "data", Some(&data))?,
            }),
            JOIN_ROOM => Ok(Self::JoinRoom {
                room_id: identifier(JOIN_ROOM, "data", Some(&data))?,
            }),
            MESSAGE => ChatMessage::try_from(data).map(Self::Message),
            BROADCAST => Broadcast::try_from(data).map(Self::Broadcast),
            NOTIFY_USER => DirectNotification::try_from(data).map(Self::NotifyUser),
            other => Err(EventError::UnknownEvent(other.to_owned())),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => JOIN,
            Self::JoinRole { .. } => JOIN_ROLE,
            Self::JoinRoom { .. } => JOIN_ROOM,
            Self::Message(_) => MESSAGE,
            Self::Broadcast(_) => BROADCAST,
            Self::NotifyUser(_) => NOTIFY_USER,
        }
    }
}

/// Chat message payload: `{ roomId, ...content }`.
///
/// The full object (including `roomId`) is kept so it can be re-emitted
/// verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    room_id: String,
    payload: Map<String, Value>,
}

impl ChatMessage {
    /// Target discussion identifier.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Consume and return the full payload.
    pub fn into_payload(self) -> Map<String, Value> {
        self.payload
    }
}

impl TryFrom<Value> for ChatMessage {
    type Error = EventError;

    fn try_from(data: Value) -> Result<Self, Self::Error> {
        let payload = object(MESSAGE, data)?;
        let room_id = identifier(MESSAGE, "roomId", payload.get("roomId"))?;
        Ok(Self { room_id, payload })
    }
}

/// Role broadcast payload: `{ role, message }`.
#[derive(Clone, Debug, PartialEq)]
pub struct Broadcast {
    /// Target role name.
    pub role: String,
    /// Notification text.
    pub message: String,
}

impl TryFrom<Value> for Broadcast {
    type Error = EventError;

    fn try_from(data: Value) -> Result<Self, Self::Error> {
        let payload = object(BROADCAST, data)?;
        let role = identifier(BROADCAST, "role", payload.get("role"))?;
        let message = text(BROADCAST, "message", payload.get("message"))?;
        Ok(Self { role, message })
    }
}

/// Direct notification payload: `{ userId, message }`.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectNotification {
    /// Target user identifier.
    pub user_id: String,
    /// Notification text.
    pub message: String,
}

impl TryFrom<Value> for DirectNotification {
    type Error = EventError;

    fn try_from(data: Value) -> Result<Self, Self::Error> {
        let payload = object(NOTIFY_USER, data)?;
        let user_id = identifier(NOTIFY_USER, "userId", payload.get("userId"))?;
        let message = text(NOTIFY_USER, "message", payload.get("message"))?;
        Ok(Self { user_id, message })
    }
}

/// An event delivered to room members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Chat message, payload re-emitted verbatim.
    Message(Map<String, Value>),
    /// Notification carrying only the message text.
    Notification {
        /// Notification text.
        message: String,
    },
}

impl OutboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => MESSAGE,
            Self::Notification { .. } => NOTIFICATION,
        }
    }
}

// ── Payload helpers ─────────────────────────────────────────────────────────

fn object(event: &'static str, data: Value) -> Result<Map<String, Value>, EventError> {
    match data {
        Value::Object(map) => Ok(map),
        Value::Null => Err(EventError::MissingField {
            event,
            field: "data",
        }),
        _ => Err(EventError::InvalidField {
            event,
            field: "data",
            expected: "an object",
        }),
    }
}

fn identifier(
    event: &'static str,
    field: &'static str,
    value: Option<&Value>,
) -> Result<String, EventError> {
    match value {
        None | Some(Value::Null) => Err(EventError::MissingField { event, field }),
        Some(Value::String(s)) => {
            // Surrounding whitespace never distinguishes two rooms
            let id = s.trim();
            if id.is_empty() {
                Err(EventError::InvalidField {
                    event,
                    field,
                    expected: "a non-empty string",
                })
            } else if id.len() > MAX_IDENTIFIER_LENGTH {
                Err(EventError::InvalidField {
                    event,
                    field,
                    expected: "a string of at most 256 bytes",
                })
            } else {
                Ok(id.to_owned())
            }
        }
        Some(_) => Err(EventError::InvalidField {
            event,
            field,
            expected: "a string",
        }),
    }
}

fn text(
    event: &'static str,
    field: &'static str,
    value: Option<&Value>,
) -> Result<String, EventError> {
    match value {
        None | Some(Value::Null) => Err(EventError::MissingField { event, field }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(EventError::InvalidField {
            event,
            field,
            expected: "a string",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_join() {
        let event = InboundEvent::parse(r#"{"event":"join","data":"u42"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Join {
                user_id: "u42".into()
            }
        );
    }

    #[test]
    fn parse_join_role_and_room() {
        let role = InboundEvent::parse(r#"{"event":"join-role","data":"u2"}"#).unwrap();
        assert_eq!(role, InboundEvent::JoinRole { role: "u2".into() });
        let room = InboundEvent::parse(r#"{"event":"join-room","data":"room-7"}"#).unwrap();
        assert_eq!(
            room,
            InboundEvent::JoinRoom {
                room_id: "room-7".into()
            }
        );
    }

    #[test]
    fn parse_message_keeps_full_payload() {
        let frame = r#"{"event":"message","data":{"roomId":"room-7","content":"hello","sender":{"id":"u1"}}}"#;
        let InboundEvent::Message(msg) = InboundEvent::parse(frame).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(msg.room_id(), "room-7");
        assert_eq!(
            Value::Object(msg.into_payload()),
            json!({"roomId": "room-7", "content": "hello", "sender": {"id": "u1"}})
        );
    }

    #[test]
    fn parse_broadcast() {
        let frame = r#"{"event":"broadcast","data":{"role":"u2","message":"approve now"}}"#;
        let event = InboundEvent::parse(frame).unwrap();
        assert_eq!(
            event,
            InboundEvent::Broadcast(Broadcast {
                role: "u2".into(),
                message: "approve now".into(),
            })
        );
    }

    #[test]
    fn parse_notify_user() {
        let frame = r#"{"event":"notify-user","data":{"userId":"u42","message":"hi"}}"#;
        let event = InboundEvent::parse(frame).unwrap();
        assert_eq!(
            event,
            InboundEvent::NotifyUser(DirectNotification {
                user_id: "u42".into(),
                message: "hi".into(),
            })
        );
        assert_eq!(event.name(), NOTIFY_USER);
    }

    #[test]
    fn malformed_json_rejected() {
        assert_matches!(
            InboundEvent::parse("not json"),
            Err(EventError::Malformed(_))
        );
        assert_matches!(
            InboundEvent::parse(r#"{"data":"u1"}"#),
            Err(EventError::Malformed(_))
        );
    }

    #[test]
    fn unknown_event_rejected() {
        let err = InboundEvent::parse(r#"{"event":"leave","data":"u1"}"#).unwrap_err();
        assert_matches!(err, EventError::UnknownEvent(ref name) if name == "leave");
        assert_eq!(err.to_string(), "unknown event 'leave'");
    }

    #[test]
    fn join_without_data_rejected() {
        assert_matches!(
            InboundEvent::parse(r#"{"event":"join"}"#),
            Err(EventError::MissingField {
                event: "join",
                field: "data"
            })
        );
    }

    #[test]
    fn join_with_non_string_rejected() {
        assert_matches!(
            InboundEvent::parse(r#"{"event":"join","data":42}"#),
            Err(EventError::InvalidField {
                event: "join",
                field: "data",
                ..
            })
        );
    }

    #[test]
    fn empty_identifier_rejected() {
        assert_matches!(
            InboundEvent::parse(r#"{"event":"join-room","data":"  "}"#),
            Err(EventError::InvalidField {
                expected: "a non-empty string",
                ..
            })
        );
    }

    #[test]
    fn oversized_identifier_rejected() {
        let long = "x".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let err = InboundEvent::from_parts(JOIN_ROLE, json!(long)).unwrap_err();
        assert!(err.to_string().contains("at most 256 bytes"));

        let exact = "x".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(InboundEvent::from_parts(JOIN_ROLE, json!(exact)).is_ok());
    }

    #[test]
    fn message_without_room_id_rejected() {
        let err = InboundEvent::parse(r#"{"event":"message","data":{"content":"hello"}}"#)
            .unwrap_err();
        assert_matches!(
            err,
            EventError::MissingField {
                event: "message",
                field: "roomId"
            }
        );
        assert_eq!(
            err.to_string(),
            "event 'message' is missing required field 'roomId'"
        );
    }

    #[test]
    fn message_with_non_object_rejected() {
        assert_matches!(
            InboundEvent::from_parts(MESSAGE, json!(["room-7"])),
            Err(EventError::InvalidField {
                field: "data",
                expected: "an object",
                ..
            })
        );
    }

    #[test]
    fn broadcast_without_message_rejected() {
        assert_matches!(
            InboundEvent::from_parts(BROADCAST, json!({"role": "u2"})),
            Err(EventError::MissingField {
                event: "broadcast",
                field: "message"
            })
        );
        assert_matches!(
            InboundEvent::from_parts(BROADCAST, json!({"role": "u2", "message": null})),
            Err(EventError::MissingField { .. })
        );
    }

    #[test]
    fn notify_user_with_numeric_user_id_rejected() {
        assert_matches!(
            InboundEvent::from_parts(NOTIFY_USER, json!({"userId": 42, "message": "hi"})),
            Err(EventError::InvalidField {
                field: "userId",
                expected: "a string",
                ..
            })
        );
    }

    #[test]
    fn non_string_notification_message_rejected() {
        assert_matches!(
            InboundEvent::from_parts(BROADCAST, json!({"role": "u2", "message": 42})),
            Err(EventError::InvalidField {
                event: "broadcast",
                field: "message",
                expected: "a string",
            })
        );
        assert_matches!(
            InboundEvent::from_parts(NOTIFY_USER, json!({"userId": "u42", "message": [1, 2]})),
            Err(EventError::InvalidField {
                event: "notify-user",
                field: "message",
                expected: "a string",
            })
        );
        assert_matches!(
            InboundEvent::from_parts(
                NOTIFY_USER,
                json!({"userId": "u1", "message": {"title": "Fund approved"}}),
            ),
            Err(EventError::InvalidField { field: "message", .. })
        );
    }

    #[test]
    fn empty_notification_message_accepted() {
        let event = InboundEvent::from_parts(BROADCAST, json!({"role": "u2", "message": ""}))
            .unwrap();
        assert_matches!(event, InboundEvent::Broadcast(Broadcast { ref message, .. }) if message.is_empty());
    }

    #[test]
    fn identifier_surrounding_whitespace_trimmed() {
        let padded = InboundEvent::parse(r#"{"event":"join","data":" u42 "}"#).unwrap();
        let plain = InboundEvent::parse(r#"{"event":"join","data":"u42"}"#).unwrap();
        assert_eq!(padded, plain);

        let event = InboundEvent::from_parts(
            NOTIFY_USER,
            json!({"userId": "\tu42\n", "message": "hi"}),
        )
        .unwrap();
        assert_matches!(event, InboundEvent::NotifyUser(DirectNotification { ref user_id, .. }) if user_id == "u42");
    }

    #[test]
    fn outbound_notification_shape() {
        let event = OutboundEvent::Notification {
            message: "hi".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"event": "notification", "data": {"message": "hi"}})
        );
        assert_eq!(event.name(), NOTIFICATION);
    }

    #[test]
    fn outbound_message_shape() {
        let payload = json!({"roomId": "room-7", "content": "hello"});
        let Value::Object(map) = payload.clone() else {
            unreachable!()
        };
        let value = serde_json::to_value(OutboundEvent::Message(map)).unwrap();
        assert_eq!(value, json!({"event": "message", "data": payload}));
    }

    #[test]
    fn outbound_parses_back() {
        let text = r#"{"event":"notification","data":{"message":"approve now"}}"#;
        let event: OutboundEvent = serde_json::from_str(text).unwrap();
        assert_eq!(
            event,
            OutboundEvent::Notification {
                message: "approve now".into()
            }
        );
    }
}
