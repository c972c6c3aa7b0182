//! Chat message types.
//!
//! Two representations exist:
//!
//! - [`ChatMessage`] – the typed form.  One [`MessageBody`] variant per
//!   [`MessageKind`], each carrying exactly the fields its kind requires, so a
//!   missing field is a compile error rather than a runtime check.
//! - [`DynamicMessage`] – the JSON-shaped form (`{ type, timestamp, fields }`)
//!   used by callers that receive messages as JSON.  Converting it into a
//!   [`ChatMessage`] is where missing fields, wrong value kinds and out-of-range
//!   integers are detected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;
use crate::protocol::registry::{FieldSpec, MessageKind, ValueKind};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Tag byte plus the 8-byte timestamp.
pub const HEADER_SIZE: usize = 9;

/// Every field payload is preceded by a little-endian `u16` byte length.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Largest text payload a length prefix can describe.
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// Largest timestamp an IEEE-754 double (the browser's number type) holds
/// exactly: 2^53 − 1.
pub const MAX_SAFE_TIMESTAMP_MS: u64 = (1 << 53) - 1;

// ── Typed message bodies ──────────────────────────────────────────────────────

/// `userText` (0): freeform text typed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTextMessage {
    pub username: String,
    pub text: String,
}

/// Body shared by `systemUserJoinedRoom` (1), `systemUserLeftRoom` (2) and
/// `systemUserAddedToRoom` (3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEventMessage {
    pub username: String,
    pub room_id: String,
}

/// `systemUserRemovedFromRoom` (4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRemovedMessage {
    pub username: String,
    pub room_id: String,
    pub reason_msg: String,
}

/// `systemUserBanned` (5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBannedMessage {
    pub username: String,
    pub room_id: String,
    pub reason_msg: String,
    pub ban_length_in_mins: u8,
}

/// The kind-specific part of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    UserText(UserTextMessage),
    UserJoinedRoom(RoomEventMessage),
    UserLeftRoom(RoomEventMessage),
    UserAddedToRoom(RoomEventMessage),
    UserRemovedFromRoom(UserRemovedMessage),
    UserBanned(UserBannedMessage),
}

/// A borrowed field value, in the order the registry declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRef<'a> {
    Text(&'a str),
    SmallInt(u8),
}

impl FieldRef<'_> {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldRef::Text(_) => ValueKind::Text,
            FieldRef::SmallInt(_) => ValueKind::SmallInt,
        }
    }
}

impl MessageBody {
    /// Returns the message kind (and therefore the wire tag).
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::UserText(_) => MessageKind::UserText,
            MessageBody::UserJoinedRoom(_) => MessageKind::UserJoinedRoom,
            MessageBody::UserLeftRoom(_) => MessageKind::UserLeftRoom,
            MessageBody::UserAddedToRoom(_) => MessageKind::UserAddedToRoom,
            MessageBody::UserRemovedFromRoom(_) => MessageKind::UserRemovedFromRoom,
            MessageBody::UserBanned(_) => MessageKind::UserBanned,
        }
    }

    /// Returns the field values in registry (wire) order.
    pub fn fields(&self) -> Vec<FieldRef<'_>> {
        match self {
            MessageBody::UserText(m) => vec![FieldRef::Text(&m.username), FieldRef::Text(&m.text)],
            MessageBody::UserJoinedRoom(m)
            | MessageBody::UserLeftRoom(m)
            | MessageBody::UserAddedToRoom(m) => {
                vec![FieldRef::Text(&m.username), FieldRef::Text(&m.room_id)]
            }
            MessageBody::UserRemovedFromRoom(m) => vec![
                FieldRef::Text(&m.username),
                FieldRef::Text(&m.room_id),
                FieldRef::Text(&m.reason_msg),
            ],
            MessageBody::UserBanned(m) => vec![
                FieldRef::Text(&m.username),
                FieldRef::Text(&m.room_id),
                FieldRef::Text(&m.reason_msg),
                FieldRef::SmallInt(m.ban_length_in_mins),
            ],
        }
    }

    /// Builds a body of `kind` by pulling each field from `source` in
    /// registry order.
    ///
    /// Struct expressions evaluate their fields in the order written, so each
    /// constructor below lists fields exactly as the registry declares them.
    pub(crate) fn read_from<S: FieldSource>(
        kind: MessageKind,
        source: &mut S,
    ) -> Result<Self, ProtocolError> {
        let spec = kind.descriptor().fields;
        let body = match kind {
            MessageKind::UserText => MessageBody::UserText(UserTextMessage {
                username: source.text(kind, &spec[0])?,
                text: source.text(kind, &spec[1])?,
            }),
            MessageKind::UserJoinedRoom => {
                MessageBody::UserJoinedRoom(read_room_event(kind, spec, source)?)
            }
            MessageKind::UserLeftRoom => {
                MessageBody::UserLeftRoom(read_room_event(kind, spec, source)?)
            }
            MessageKind::UserAddedToRoom => {
                MessageBody::UserAddedToRoom(read_room_event(kind, spec, source)?)
            }
            MessageKind::UserRemovedFromRoom => {
                MessageBody::UserRemovedFromRoom(UserRemovedMessage {
                    username: source.text(kind, &spec[0])?,
                    room_id: source.text(kind, &spec[1])?,
                    reason_msg: source.text(kind, &spec[2])?,
                })
            }
            MessageKind::UserBanned => MessageBody::UserBanned(UserBannedMessage {
                username: source.text(kind, &spec[0])?,
                room_id: source.text(kind, &spec[1])?,
                reason_msg: source.text(kind, &spec[2])?,
                ban_length_in_mins: source.small_int(kind, &spec[3])?,
            }),
        };
        Ok(body)
    }
}

fn read_room_event<S: FieldSource>(
    kind: MessageKind,
    spec: &[FieldSpec],
    source: &mut S,
) -> Result<RoomEventMessage, ProtocolError> {
    Ok(RoomEventMessage {
        username: source.text(kind, &spec[0])?,
        room_id: source.text(kind, &spec[1])?,
    })
}

/// Something that can yield field values one registry field at a time.
///
/// Implemented by the wire decoder (reads the next length-prefixed payload)
/// and by [`DynamicMessage`] (looks the field up by name).
pub(crate) trait FieldSource {
    fn text(&mut self, kind: MessageKind, field: &FieldSpec) -> Result<String, ProtocolError>;
    fn small_int(&mut self, kind: MessageKind, field: &FieldSpec) -> Result<u8, ProtocolError>;
}

// ── Typed message ─────────────────────────────────────────────────────────────

/// A complete chat message: timestamp plus kind-specific body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub body: MessageBody,
}

impl ChatMessage {
    pub fn new(timestamp_ms: u64, body: MessageBody) -> Self {
        Self { timestamp_ms, body }
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

// ── Dynamic (JSON-shaped) message ─────────────────────────────────────────────

/// A field value as it appears in JSON: a number or a string.
///
/// Integers are kept as `i64` so that out-of-range values such as `256` or
/// `-1` survive deserialization and can be reported precisely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldValue::Int(_) => ValueKind::SmallInt,
            FieldValue::Text(_) => ValueKind::Text,
        }
    }
}

/// The JSON message shape: `{"type": "...", "timestamp": 0, "fields": {...}}`.
///
/// Nothing about the field map is checked until the message is converted into
/// a [`ChatMessage`] with [`TryFrom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicMessage {
    #[serde(rename = "type")]
    pub kind_name: String,
    pub timestamp: u64,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl FieldSource for DynamicMessage {
    fn text(&mut self, kind: MessageKind, field: &FieldSpec) -> Result<String, ProtocolError> {
        match self.fields.remove(field.name) {
            Some(FieldValue::Text(s)) => Ok(s),
            Some(other) => Err(ProtocolError::FieldKindMismatch {
                kind,
                field: field.name,
                expected: ValueKind::Text,
                found: other.value_kind(),
            }),
            None => Err(ProtocolError::MissingField { kind, field: field.name }),
        }
    }

    fn small_int(&mut self, kind: MessageKind, field: &FieldSpec) -> Result<u8, ProtocolError> {
        match self.fields.remove(field.name) {
            Some(FieldValue::Int(v)) => {
                u8::try_from(v).map_err(|_| ProtocolError::SmallIntOutOfRange {
                    field: field.name,
                    value: v,
                })
            }
            Some(other) => Err(ProtocolError::FieldKindMismatch {
                kind,
                field: field.name,
                expected: ValueKind::SmallInt,
                found: other.value_kind(),
            }),
            None => Err(ProtocolError::MissingField { kind, field: field.name }),
        }
    }
}

impl TryFrom<DynamicMessage> for ChatMessage {
    type Error = ProtocolError;

    /// Validates a dynamic message against the registry.  Fields not declared
    /// for the kind are ignored.
    fn try_from(mut msg: DynamicMessage) -> Result<Self, ProtocolError> {
        let kind = MessageKind::from_name(&msg.kind_name)
            .ok_or_else(|| ProtocolError::UnknownMessageName(msg.kind_name.clone()))?;
        let body = MessageBody::read_from(kind, &mut msg)?;
        Ok(ChatMessage::new(msg.timestamp, body))
    }
}

impl From<&ChatMessage> for DynamicMessage {
    fn from(msg: &ChatMessage) -> Self {
        let kind = msg.kind();
        let fields = kind
            .descriptor()
            .fields
            .iter()
            .zip(msg.body.fields())
            .map(|(spec, value)| {
                let value = match value {
                    FieldRef::Text(s) => FieldValue::Text(s.to_string()),
                    FieldRef::SmallInt(v) => FieldValue::Int(i64::from(v)),
                };
                (spec.name.to_string(), value)
            })
            .collect();
        DynamicMessage {
            kind_name: kind.name().to_string(),
            timestamp: msg.timestamp_ms,
            fields,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
