//! # fastchat-core
//!
//! Compact binary wire codec for fastchat messages, shared by the relay
//! server and any Rust client.
//!
//! The crate has no I/O, no async and no logging.  Every function is a pure
//! transformation, safe to call from any number of threads at once.
//!
//! # Wire format
//!
//! ```text
//! [tag:1][timestamp_ms:8 LE]([len:2 LE][payload:len])*
//! ```
//!
//! The tag selects an entry in the [`protocol::registry`], which lists the
//! fields that follow and whether each is UTF-8 text or a one-byte integer.
//! Field names are not transmitted; position alone identifies a field.
//!
//! # Example
//!
//! ```rust
//! use fastchat_core::{decode_message, encode_message, ChatMessage, MessageBody, MessageKind};
//! use fastchat_core::protocol::RoomEventMessage;
//!
//! let joined = ChatMessage::new(
//!     1_700_000_000_000,
//!     MessageBody::UserJoinedRoom(RoomEventMessage {
//!         username: "ana".to_string(),
//!         room_id: "general".to_string(),
//!     }),
//! );
//! let bytes = encode_message(&joined).unwrap();
//! assert_eq!(bytes[0], MessageKind::UserJoinedRoom.tag());
//! assert_eq!(decode_message(&bytes).unwrap().message, joined);
//! ```

pub mod protocol;

pub use protocol::codec::{
    decode_message, decode_message_with, encode_message, peek_kind, DecodePolicy, Decoded,
    ProtocolError,
};
pub use protocol::messages::{ChatMessage, DynamicMessage, MessageBody};
pub use protocol::registry::MessageKind;
