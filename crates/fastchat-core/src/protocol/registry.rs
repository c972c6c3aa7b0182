//! Static message type registry.
//!
//! Every message kind the codec understands is described by exactly one
//! [`KindDescriptor`] in [`REGISTRY`].  The descriptor at index `n` belongs to
//! the kind whose wire tag is `n`, so looking a kind up by tag is a bounds
//! check plus an array index.
//!
//! # Why the tag order matters
//!
//! The tag byte *is* the wire encoding of the kind.  Reordering the entries
//! below changes the meaning of every message already on the wire, so new
//! kinds may only ever be appended.
//!
//! # Field order
//!
//! Field names are never transmitted.  The position of a field in
//! [`KindDescriptor::fields`] is the only thing that tells the decoder which
//! bytes belong to which field.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Message kinds ─────────────────────────────────────────────────────────────

/// All chat message kinds.  The discriminant is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Freeform text typed by a user.
    #[serde(rename = "userText")]
    UserText = 0,
    /// Another user joined a room this client is in.
    #[serde(rename = "systemUserJoinedRoom")]
    UserJoinedRoom = 1,
    /// Another user left a room this client is in.
    #[serde(rename = "systemUserLeftRoom")]
    UserLeftRoom = 2,
    /// This user has been added to a room.
    #[serde(rename = "systemUserAddedToRoom")]
    UserAddedToRoom = 3,
    /// This user has been removed from a room, with a reason.
    #[serde(rename = "systemUserRemovedFromRoom")]
    UserRemovedFromRoom = 4,
    /// This user has been banned from the server, with a ban length.
    #[serde(rename = "systemUserBanned")]
    UserBanned = 5,
}

impl MessageKind {
    /// Every kind, in tag order.
    pub const ALL: [MessageKind; 6] = [
        MessageKind::UserText,
        MessageKind::UserJoinedRoom,
        MessageKind::UserLeftRoom,
        MessageKind::UserAddedToRoom,
        MessageKind::UserRemovedFromRoom,
        MessageKind::UserBanned,
    ];

    /// Returns the one-byte wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Returns this kind's registry entry.
    pub fn descriptor(self) -> &'static KindDescriptor {
        &REGISTRY[self as usize]
    }

    /// Returns the stable textual name used by the JSON message form.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Looks a kind up by its textual name (e.g. `"systemUserBanned"`).
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY.iter().find(|d| d.name == name).map(|d| d.kind)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(MessageKind::UserText),
            1 => Ok(MessageKind::UserJoinedRoom),
            2 => Ok(MessageKind::UserLeftRoom),
            3 => Ok(MessageKind::UserAddedToRoom),
            4 => Ok(MessageKind::UserRemovedFromRoom),
            5 => Ok(MessageKind::UserBanned),
            _ => Err(()),
        }
    }
}

// ── Field descriptors ─────────────────────────────────────────────────────────

/// The two value kinds a field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// UTF-8 text, 0–65535 bytes.
    Text,
    /// Unsigned integer, 0–255.
    SmallInt,
}

/// One (name, value kind) pair in a kind's field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as used by the JSON form (camelCase).
    pub name: &'static str,
    /// Value kind expected on the wire.
    pub kind: ValueKind,
}

/// Registry entry for one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    pub kind: MessageKind,
    pub name: &'static str,
    /// Fields in wire order.
    pub fields: &'static [FieldSpec],
}

pub const USERNAME: FieldSpec = FieldSpec { name: "username", kind: ValueKind::Text };
pub const TEXT: FieldSpec = FieldSpec { name: "text", kind: ValueKind::Text };
pub const ROOM_ID: FieldSpec = FieldSpec { name: "roomId", kind: ValueKind::Text };
pub const REASON_MSG: FieldSpec = FieldSpec { name: "reasonMsg", kind: ValueKind::Text };
pub const BAN_LENGTH_IN_MINS: FieldSpec = FieldSpec {
    name: "banLengthInMins",
    kind: ValueKind::SmallInt,
};

/// The registry.  Index `n` describes the kind with tag `n`.
pub static REGISTRY: [KindDescriptor; 6] = [
    KindDescriptor {
        kind: MessageKind::UserText,
        name: "userText",
        fields: &[USERNAME, TEXT],
    },
    KindDescriptor {
        kind: MessageKind::UserJoinedRoom,
        name: "systemUserJoinedRoom",
        fields: &[USERNAME, ROOM_ID],
    },
    KindDescriptor {
        kind: MessageKind::UserLeftRoom,
        name: "systemUserLeftRoom",
        fields: &[USERNAME, ROOM_ID],
    },
    KindDescriptor {
        kind: MessageKind::UserAddedToRoom,
        name: "systemUserAddedToRoom",
        fields: &[USERNAME, ROOM_ID],
    },
    KindDescriptor {
        kind: MessageKind::UserRemovedFromRoom,
        name: "systemUserRemovedFromRoom",
        fields: &[USERNAME, ROOM_ID, REASON_MSG],
    },
    KindDescriptor {
        kind: MessageKind::UserBanned,
        name: "systemUserBanned",
        fields: &[USERNAME, ROOM_ID, REASON_MSG, BAN_LENGTH_IN_MINS],
    },
];

// ── Lookups ───────────────────────────────────────────────────────────────────

/// Returns the descriptor for a wire tag.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownMessageType`] if `tag` has no entry.
pub fn descriptor_for_tag(tag: u8) -> Result<&'static KindDescriptor, ProtocolError> {
    REGISTRY
        .get(tag as usize)
        .ok_or(ProtocolError::UnknownMessageType(tag))
}

/// Returns the wire tag for a kind name.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownMessageName`] if no kind has that name.
pub fn tag_for_name(name: &str) -> Result<u8, ProtocolError> {
    MessageKind::from_name(name)
        .map(MessageKind::tag)
        .ok_or_else(|| ProtocolError::UnknownMessageName(name.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
