//! Per-frame relay decisions.
//!
//! Given one inbound WebSocket frame, decide what (if anything) is fanned out
//! to the sender's group.  Nothing here touches a socket, so every rule is
//! unit-tested directly.
//!
//! | Frame                     | Action                                          |
//! |---------------------------|-------------------------------------------------|
//! | Binary, tag `userText`    | Forward verbatim, no decode                     |
//! | Binary, any other tag     | Decode under the configured policy, then forward verbatim |
//! | Text, JSON enabled        | Parse JSON, validate, encode, forward encoded bytes |
//! | Text, JSON disabled       | Reject                                          |
//!
//! A rejected frame means the sender is misbehaving; the session layer closes
//! the connection.

use fastchat_core::protocol::{encode_dynamic, DecodeWarning};
use fastchat_core::{
    decode_message_with, peek_kind, DecodePolicy, DynamicMessage, MessageKind, ProtocolError,
};
use thiserror::Error;

use crate::domain::ServerConfig;

/// Why a frame was refused.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The binary frame (or the message a JSON frame described) is malformed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The text frame is not a JSON chat message.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// The server only accepts binary frames.
    #[error("text frames are disabled on this server")]
    TextDisabled,
}

/// Settings the relay rules depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayRules {
    pub decode_policy: DecodePolicy,
    pub accept_json: bool,
}

impl From<&ServerConfig> for RelayRules {
    fn from(config: &ServerConfig) -> Self {
        Self {
            decode_policy: config.decode_policy,
            accept_json: config.accept_json,
        }
    }
}

/// A frame that may be fanned out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub kind: MessageKind,
    /// Wire bytes to publish.
    pub bytes: Vec<u8>,
    /// `true` when the frame went out without being decoded.
    pub verbatim: bool,
    pub warnings: Vec<DecodeWarning>,
}

/// Applies the binary-frame rules.  Takes ownership so verbatim frames are
/// forwarded without a copy.
///
/// # Errors
///
/// Returns [`RelayError::Protocol`] when the frame cannot be classified or
/// decoded.
pub fn relay_binary(frame: Vec<u8>, rules: RelayRules) -> Result<Accepted, RelayError> {
    let kind = peek_kind(&frame)?;
    if kind == MessageKind::UserText {
        return Ok(Accepted {
            kind,
            bytes: frame,
            verbatim: true,
            warnings: Vec::new(),
        });
    }

    let decoded = decode_message_with(&frame, rules.decode_policy)?;
    Ok(Accepted {
        kind,
        bytes: frame,
        verbatim: false,
        warnings: decoded.warnings,
    })
}

/// Applies the text-frame rules.
///
/// # Errors
///
/// Returns [`RelayError::TextDisabled`] when JSON is off,
/// [`RelayError::Json`] for unparseable text and [`RelayError::Protocol`]
/// when the JSON does not describe a valid message.
pub fn relay_text(frame: &str, rules: RelayRules) -> Result<Accepted, RelayError> {
    if !rules.accept_json {
        return Err(RelayError::TextDisabled);
    }
    let dynamic: DynamicMessage = serde_json::from_str(frame)?;
    let bytes = encode_dynamic(dynamic)?;
    let kind = peek_kind(&bytes)?;
    Ok(Accepted {
        kind,
        bytes,
        verbatim: false,
        warnings: Vec::new(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
