//! Protocol module containing the message registry, message types and the
//! binary codec.

pub mod codec;
pub mod messages;
pub mod registry;

pub use codec::{
    decode_message, decode_message_with, encode_dynamic, encode_message, encode_message_now,
    peek_kind, DecodePolicy, DecodeWarning, Decoded, ProtocolError,
};
pub use messages::*;
pub use registry::{
    descriptor_for_tag, tag_for_name, FieldSpec, KindDescriptor, MessageKind, ValueKind,
    REGISTRY,
};
