//! Application layer for fastchat-server.
//!
//! Decides, frame by frame, what a connected client is allowed to publish.
//! It knows nothing about sockets or tasks; the infrastructure layer feeds it
//! frames and fans out whatever it accepts.
//!
//! # Responsibilities
//!
//! - Forwarding `userText` frames untouched
//! - Validating system messages before they reach other clients
//! - Re-encoding JSON text frames into the binary form
//! - Defining the `RelayError` type for rejected frames

pub mod relay;

pub use relay::{relay_binary, relay_text, Accepted, RelayError, RelayRules};
