//! Binary codec for encoding and decoding fastchat messages.
//!
//! Wire format:
//! ```text
//! [tag:1][timestamp_ms:8]([len:2][payload:len])*
//! ```
//! Header size: 9 bytes.  All multi-byte integers are little-endian.  One
//! `[len][payload]` pair follows per field declared for the tag in the
//! [registry](crate::protocol::registry), in declaration order.  `Text`
//! payloads are UTF-8; `SmallInt` payloads are a single byte (the length
//! prefix is still written).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::{
    ChatMessage, DynamicMessage, FieldRef, FieldSource, MessageBody, HEADER_SIZE,
    LENGTH_PREFIX_SIZE, MAX_SAFE_TIMESTAMP_MS, MAX_TEXT_LEN,
};
use crate::protocol::registry::{descriptor_for_tag, FieldSpec, MessageKind, ValueKind};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The tag byte has no registry entry.
    #[error("unknown message type: tag {0}")]
    UnknownMessageType(u8),

    /// A JSON message named a type that is not in the registry.
    #[error("unknown message type: {0:?}")]
    UnknownMessageName(String),

    /// A field declared for the kind was absent.
    #[error("{kind:?} is missing field `{field}`")]
    MissingField { kind: MessageKind, field: &'static str },

    /// A field was present with the wrong value kind.
    #[error("{kind:?} field `{field}` must be {expected:?}, got {found:?}")]
    FieldKindMismatch {
        kind: MessageKind,
        field: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },

    /// A text payload does not fit the 16-bit length prefix.
    #[error("field `{field}` is {len} bytes, limit is {}", MAX_TEXT_LEN)]
    FieldTooLarge { field: &'static str, len: usize },

    /// A small integer was outside 0–255.
    #[error("field `{field}` value {value} is outside 0..=255")]
    SmallIntOutOfRange { field: &'static str, value: i64 },

    /// Fewer than the 9 header bytes were supplied.
    #[error("truncated header: need {} bytes, got {available}", HEADER_SIZE)]
    TruncatedHeader { available: usize },

    /// A field's 2-byte length prefix runs past the end of the buffer.
    #[error("truncated length for field `{field}` at offset {offset}: {available} bytes left")]
    TruncatedLength {
        field: &'static str,
        offset: usize,
        available: usize,
    },

    /// A field's payload runs past the end of the buffer.
    #[error("truncated payload for field `{field}`: declared {declared}, available {available}")]
    TruncatedPayload {
        field: &'static str,
        declared: usize,
        available: usize,
    },

    /// Bytes remain after the last declared field ([`DecodePolicy::Strict`] only).
    #[error("{extra} trailing bytes after last field")]
    TrailingBytes { extra: usize },

    /// A `SmallInt` payload whose length is not 1.  Always raised for length
    /// 0; other lengths only under [`DecodePolicy::Strict`].
    #[error("field `{field}` small int payload has length {len}")]
    SmallIntLength { field: &'static str, len: usize },
}

/// How tolerant the decoder is of framing slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Trailing bytes are ignored and a multi-byte `SmallInt` payload yields
    /// its first byte.
    #[default]
    Lenient,
    /// Every byte must belong to a declared field and `SmallInt` payloads must
    /// be exactly one byte.
    Strict,
}

/// Non-fatal conditions observed while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeWarning {
    /// The timestamp exceeds 2^53 − 1 and will lose precision in consumers
    /// that store it as a double.  The decoded value itself is exact.
    TimestampPrecisionLoss { timestamp_ms: u64 },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::TimestampPrecisionLoss { timestamp_ms } => write!(
                f,
                "timestamp {timestamp_ms} exceeds {MAX_SAFE_TIMESTAMP_MS}; precision may be lost"
            ),
        }
    }
}

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: ChatMessage,
    /// Offset one past the last declared field.  Less than the input length
    /// when lenient decoding skipped trailing bytes.
    pub bytes_read: usize,
    pub warnings: Vec<DecodeWarning>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ChatMessage`] into its wire bytes.
///
/// Every field is validated before the first byte is written, so an error
/// never leaves a partial buffer behind.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLarge`] if a text field exceeds 65535
/// bytes.
///
/// # Examples
///
/// ```rust
/// use fastchat_core::protocol::{decode_message, encode_message};
/// use fastchat_core::protocol::messages::{ChatMessage, MessageBody, UserTextMessage};
///
/// let msg = ChatMessage::new(
///     1000,
///     MessageBody::UserText(UserTextMessage {
///         username: "Jo".to_string(),
///         text: "Hi".to_string(),
///     }),
/// );
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes.len(), 17);
/// assert_eq!(decode_message(&bytes).unwrap().message, msg);
/// ```
pub fn encode_message(msg: &ChatMessage) -> Result<Vec<u8>, ProtocolError> {
    let kind = msg.kind();
    let specs = kind.descriptor().fields;
    let values = msg.body.fields();

    if let Some(spec) = specs.get(values.len()) {
        return Err(ProtocolError::MissingField { kind, field: spec.name });
    }

    let mut total = HEADER_SIZE;
    for (spec, value) in specs.iter().zip(&values) {
        total += LENGTH_PREFIX_SIZE + payload_len(kind, spec, value)?;
    }

    let mut buf = Vec::with_capacity(total);
    buf.push(kind.tag());
    buf.extend_from_slice(&msg.timestamp_ms.to_le_bytes());
    for value in &values {
        match value {
            FieldRef::Text(s) => write_length_prefixed(&mut buf, s.as_bytes()),
            FieldRef::SmallInt(v) => write_length_prefixed(&mut buf, &[*v]),
        }
    }
    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

/// Encodes `body` stamped with the current wall-clock time in milliseconds.
///
/// # Errors
///
/// Same as [`encode_message`].
pub fn encode_message_now(body: MessageBody) -> Result<Vec<u8>, ProtocolError> {
    encode_message(&ChatMessage::new(now_ms(), body))
}

/// Validates a JSON-shaped message against the registry and encodes it.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownMessageName`], `MissingField`,
/// `FieldKindMismatch`, `SmallIntOutOfRange` or `FieldTooLarge`.
pub fn encode_dynamic(msg: DynamicMessage) -> Result<Vec<u8>, ProtocolError> {
    encode_message(&ChatMessage::try_from(msg)?)
}

/// Reads only the tag byte.
///
/// Lets a relay forward `userText` frames without paying for a full decode.
///
/// # Errors
///
/// Returns [`ProtocolError::TruncatedHeader`] for an empty buffer and
/// [`ProtocolError::UnknownMessageType`] for an unregistered tag.
pub fn peek_kind(bytes: &[u8]) -> Result<MessageKind, ProtocolError> {
    let tag = *bytes
        .first()
        .ok_or(ProtocolError::TruncatedHeader { available: 0 })?;
    MessageKind::try_from(tag).map_err(|_| ProtocolError::UnknownMessageType(tag))
}

/// Decodes one message with [`DecodePolicy::Lenient`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<Decoded, ProtocolError> {
    decode_message_with(bytes, DecodePolicy::Lenient)
}

/// Decodes one message from `bytes` under the given policy.
///
/// Single pass: header, then one length-prefixed payload per declared field.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message_with(bytes: &[u8], policy: DecodePolicy) -> Result<Decoded, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::TruncatedHeader {
            available: bytes.len(),
        });
    }

    let kind = descriptor_for_tag(bytes[0])?.kind;
    let timestamp_ms = read_u64_le(bytes, 1).ok_or(ProtocolError::TruncatedHeader {
        available: bytes.len(),
    })?;

    let mut warnings = Vec::new();
    if timestamp_ms > MAX_SAFE_TIMESTAMP_MS {
        warnings.push(DecodeWarning::TimestampPrecisionLoss { timestamp_ms });
    }

    let mut reader = WireReader {
        bytes,
        cursor: HEADER_SIZE,
        policy,
    };
    let body = MessageBody::read_from(kind, &mut reader)?;

    if policy == DecodePolicy::Strict && reader.cursor < bytes.len() {
        return Err(ProtocolError::TrailingBytes {
            extra: bytes.len() - reader.cursor,
        });
    }

    Ok(Decoded {
        message: ChatMessage::new(timestamp_ms, body),
        bytes_read: reader.cursor,
        warnings,
    })
}

// ── Field reader ──────────────────────────────────────────────────────────────

/// Cursor over the field section of a message.  `cursor <= bytes.len()`.
struct WireReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    policy: DecodePolicy,
}

impl<'a> WireReader<'a> {
    fn next_payload(&mut self, field: &FieldSpec) -> Result<&'a [u8], ProtocolError> {
        let len = read_u16_le(self.bytes, self.cursor).ok_or(ProtocolError::TruncatedLength {
            field: field.name,
            offset: self.cursor,
            available: self.bytes.len() - self.cursor,
        })? as usize;

        let start = self.cursor + LENGTH_PREFIX_SIZE;
        let end = start + len;
        if end > self.bytes.len() {
            return Err(ProtocolError::TruncatedPayload {
                field: field.name,
                declared: len,
                available: self.bytes.len() - start,
            });
        }

        self.cursor = end;
        Ok(&self.bytes[start..end])
    }
}

impl FieldSource for WireReader<'_> {
    fn text(&mut self, _kind: MessageKind, field: &FieldSpec) -> Result<String, ProtocolError> {
        let payload = self.next_payload(field)?;
        Ok(String::from_utf8_lossy(payload).into_owned())
    }

    fn small_int(&mut self, _kind: MessageKind, field: &FieldSpec) -> Result<u8, ProtocolError> {
        let payload = self.next_payload(field)?;
        match (payload.first(), self.policy) {
            (Some(&v), DecodePolicy::Lenient) => Ok(v),
            (Some(&v), DecodePolicy::Strict) if payload.len() == 1 => Ok(v),
            _ => Err(ProtocolError::SmallIntLength {
                field: field.name,
                len: payload.len(),
            }),
        }
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn payload_len(
    kind: MessageKind,
    spec: &FieldSpec,
    value: &FieldRef<'_>,
) -> Result<usize, ProtocolError> {
    if spec.kind != value.value_kind() {
        return Err(ProtocolError::FieldKindMismatch {
            kind,
            field: spec.name,
            expected: spec.kind,
            found: value.value_kind(),
        });
    }
    match value {
        FieldRef::Text(s) if s.len() > MAX_TEXT_LEN => Err(ProtocolError::FieldTooLarge {
            field: spec.name,
            len: s.len(),
        }),
        FieldRef::Text(s) => Ok(s.len()),
        FieldRef::SmallInt(_) => Ok(1),
    }
}

/// Writes a 2-byte little-endian length followed by `payload`.
/// Callers have already checked `payload.len() <= MAX_TEXT_LEN`.
fn write_length_prefixed(buf: &mut Vec<u8>, payload: &[u8]) {
    debug_assert!(payload.len() <= MAX_TEXT_LEN);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
}

fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes = buf.get(offset..offset.checked_add(8)?)?;
    bytes.try_into().ok().map(u64::from_le_bytes)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;

    fn user_text(username: &str, text: &str) -> ChatMessage {
        ChatMessage::new(
            1000,
            MessageBody::UserText(UserTextMessage {
                username: username.to_string(),
                text: text.to_string(),
            }),
        )
    }

    fn banned(minutes: u8) -> ChatMessage {
        ChatMessage::new(
            42,
            MessageBody::UserBanned(UserBannedMessage {
                username: "troll".to_string(),
                room_id: "lobby".to_string(),
                reason_msg: "flooding".to_string(),
                ban_length_in_mins: minutes,
            }),
        )
    }

    fn round_trip(msg: &ChatMessage) -> ChatMessage {
        let encoded = encode_message(msg).expect("encode failed");
        let decoded = decode_message_with(&encoded, DecodePolicy::Strict).expect("decode failed");
        assert_eq!(decoded.bytes_read, encoded.len());
        assert!(decoded.warnings.is_empty());
        decoded.message
    }

    /// The canonical `userText` example: "Jo" says "Hi" at t=1000.
    const JO_HI: [u8; 17] = [
        0, 0xE8, 0x03, 0, 0, 0, 0, 0, 0, 2, 0, 0x4A, 0x6F, 2, 0, 0x48, 0x69,
    ];

    // ── Encoding ─────────────────────────────────────────────────────────────

    #[test]
    fn test_encode_user_text_exact_bytes() {
        assert_eq!(encode_message(&user_text("Jo", "Hi")).unwrap(), JO_HI);
    }

    #[test]
    fn test_encode_small_int_has_length_prefix_of_one() {
        let bytes = encode_message(&banned(255)).unwrap();
        // tag + ts + (2+5) + (2+5) + (2+8) + (2+1)
        assert_eq!(bytes.len(), 9 + 7 + 7 + 10 + 3);
        assert_eq!(&bytes[bytes.len() - 3..], &[1, 0, 255]);
    }

    #[test]
    fn test_encode_timestamp_is_little_endian() {
        let mut msg = user_text("", "");
        msg.timestamp_ms = 0x0102_0304_0506_0708;
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(&bytes[1..9], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_encode_length_prefix_counts_utf8_bytes() {
        let bytes = encode_message(&user_text("é", "🦀")).unwrap();
        assert_eq!(&bytes[9..11], &[2, 0]);
        assert_eq!(&bytes[13..15], &[4, 0]);
    }

    #[test]
    fn test_encode_text_at_limit_succeeds() {
        let msg = user_text("a", &"x".repeat(MAX_TEXT_LEN));
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(&bytes[12..14], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_text_over_limit_fails() {
        let msg = user_text("a", &"x".repeat(MAX_TEXT_LEN + 1));
        assert_eq!(
            encode_message(&msg),
            Err(ProtocolError::FieldTooLarge {
                field: "text",
                len: MAX_TEXT_LEN + 1
            })
        );
    }

    #[test]
    fn test_encode_dynamic_rejects_out_of_range_small_int() {
        let mut dynamic = DynamicMessage::from(&banned(1));
        dynamic
            .fields
            .insert("banLengthInMins".to_string(), FieldValue::Int(256));
        assert!(matches!(
            encode_dynamic(dynamic),
            Err(ProtocolError::SmallIntOutOfRange { value: 256, .. })
        ));
    }

    #[test]
    fn test_encode_dynamic_matches_typed_encoding() {
        let typed = banned(9);
        let dynamic = DynamicMessage::from(&typed);
        assert_eq!(encode_dynamic(dynamic), encode_message(&typed));
    }

    #[test]
    fn test_encode_message_now_stamps_recent_time() {
        let before = now_ms();
        let bytes = encode_message_now(user_text("a", "b").body).unwrap();
        let stamped = read_u64_le(&bytes, 1).unwrap();
        assert!(stamped >= before);
    }

    // ── Decoding ─────────────────────────────────────────────────────────────

    #[test]
    fn test_decode_user_text_exact_bytes() {
        let decoded = decode_message(&JO_HI).unwrap();
        assert_eq!(decoded.message, user_text("Jo", "Hi"));
        assert_eq!(decoded.bytes_read, JO_HI.len());
    }

    #[test]
    fn test_round_trip_every_kind() {
        let room = RoomEventMessage {
            username: "ana".to_string(),
            room_id: "general".to_string(),
        };
        let messages = [
            user_text("ana", "hello"),
            ChatMessage::new(1, MessageBody::UserJoinedRoom(room.clone())),
            ChatMessage::new(2, MessageBody::UserLeftRoom(room.clone())),
            ChatMessage::new(3, MessageBody::UserAddedToRoom(room)),
            ChatMessage::new(
                4,
                MessageBody::UserRemovedFromRoom(UserRemovedMessage {
                    username: "ana".to_string(),
                    room_id: "general".to_string(),
                    reason_msg: "idle".to_string(),
                }),
            ),
            banned(0),
        ];
        for msg in &messages {
            assert_eq!(&round_trip(msg), msg);
        }
    }

    #[test]
    fn test_decode_empty_bytes_returns_truncated_header() {
        assert_eq!(
            decode_message(&[]),
            Err(ProtocolError::TruncatedHeader { available: 0 })
        );
    }

    #[test]
    fn test_decode_eight_bytes_returns_truncated_header() {
        assert_eq!(
            decode_message(&JO_HI[..8]),
            Err(ProtocolError::TruncatedHeader { available: 8 })
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        let mut bytes = JO_HI;
        bytes[0] = 6;
        assert_eq!(decode_message(&bytes), Err(ProtocolError::UnknownMessageType(6)));
    }

    #[test]
    fn test_decode_header_only_returns_truncated_length() {
        assert!(matches!(
            decode_message(&JO_HI[..9]),
            Err(ProtocolError::TruncatedLength {
                field: "username",
                offset: 9,
                available: 0
            })
        ));
    }

    #[test]
    fn test_decode_half_length_prefix_returns_truncated_length() {
        assert!(matches!(
            decode_message(&JO_HI[..14]),
            Err(ProtocolError::TruncatedLength {
                field: "text",
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_short_payload_returns_truncated_payload() {
        assert_eq!(
            decode_message(&JO_HI[..16]),
            Err(ProtocolError::TruncatedPayload {
                field: "text",
                declared: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_decode_huge_declared_length_returns_truncated_payload() {
        let mut bytes = JO_HI.to_vec();
        bytes[9] = 0xFF;
        bytes[10] = 0xFF;
        assert!(matches!(
            decode_message(&bytes),
            Err(ProtocolError::TruncatedPayload {
                field: "username",
                declared: 65535,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_is_replaced() {
        let mut bytes = JO_HI;
        bytes[11] = 0xFF;
        let decoded = decode_message(&bytes).unwrap();
        match decoded.message.body {
            MessageBody::UserText(m) => assert_eq!(m.username, "\u{FFFD}o"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_decode_large_timestamp_warns_but_succeeds() {
        let mut bytes = JO_HI;
        bytes[1..9].copy_from_slice(&(MAX_SAFE_TIMESTAMP_MS + 1).to_le_bytes());
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.message.timestamp_ms, MAX_SAFE_TIMESTAMP_MS + 1);
        assert_eq!(
            decoded.warnings,
            vec![DecodeWarning::TimestampPrecisionLoss {
                timestamp_ms: MAX_SAFE_TIMESTAMP_MS + 1
            }]
        );
    }

    #[test]
    fn test_decode_max_safe_timestamp_has_no_warning() {
        let mut bytes = JO_HI;
        bytes[1..9].copy_from_slice(&MAX_SAFE_TIMESTAMP_MS.to_le_bytes());
        assert!(decode_message(&bytes).unwrap().warnings.is_empty());
    }

    // ── Leniency ─────────────────────────────────────────────────────────────

    #[test]
    fn test_lenient_ignores_trailing_bytes() {
        let mut bytes = JO_HI.to_vec();
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.message, user_text("Jo", "Hi"));
        assert_eq!(decoded.bytes_read, JO_HI.len());
    }

    #[test]
    fn test_strict_rejects_trailing_bytes() {
        let mut bytes = JO_HI.to_vec();
        bytes.push(0);
        assert_eq!(
            decode_message_with(&bytes, DecodePolicy::Strict),
            Err(ProtocolError::TrailingBytes { extra: 1 })
        );
    }

    fn banned_with_wide_small_int() -> Vec<u8> {
        let mut bytes = encode_message(&banned(7)).unwrap();
        let len_at = bytes.len() - 3;
        bytes[len_at] = 2;
        bytes.push(0x99);
        bytes
    }

    #[test]
    fn test_lenient_small_int_uses_first_byte() {
        let decoded = decode_message(&banned_with_wide_small_int()).unwrap();
        assert_eq!(decoded.message, banned(7));
    }

    #[test]
    fn test_strict_rejects_wide_small_int() {
        assert_eq!(
            decode_message_with(&banned_with_wide_small_int(), DecodePolicy::Strict),
            Err(ProtocolError::SmallIntLength {
                field: "banLengthInMins",
                len: 2
            })
        );
    }

    #[test]
    fn test_empty_small_int_rejected_under_both_policies() {
        let mut bytes = encode_message(&banned(7)).unwrap();
        bytes.truncate(bytes.len() - 1);
        let len_at = bytes.len() - 2;
        bytes[len_at] = 0;
        for policy in [DecodePolicy::Lenient, DecodePolicy::Strict] {
            assert_eq!(
                decode_message_with(&bytes, policy),
                Err(ProtocolError::SmallIntLength {
                    field: "banLengthInMins",
                    len: 0
                })
            );
        }
    }

    // ── Peek ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_peek_kind_reads_only_tag() {
        assert_eq!(peek_kind(&[0]), Ok(MessageKind::UserText));
        assert_eq!(peek_kind(&[5, 1, 2]), Ok(MessageKind::UserBanned));
        assert_eq!(peek_kind(&[9]), Err(ProtocolError::UnknownMessageType(9)));
        assert_eq!(
            peek_kind(&[]),
            Err(ProtocolError::TruncatedHeader { available: 0 })
        );
    }

    #[test]
    fn test_read_helpers_reject_short_buffers() {
        assert_eq!(read_u16_le(&[1], 0), None);
        assert_eq!(read_u16_le(&[1, 2], 0), Some(0x0201));
        assert_eq!(read_u64_le(&[0; 7], 0), None);
        assert_eq!(read_u16_le(&[0; 4], usize::MAX), None);
    }
}
