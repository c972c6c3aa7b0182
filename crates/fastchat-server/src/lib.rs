//! fastchat-server library crate.
//!
//! A WebSocket relay for fastchat.  Every connection is subscribed to a named
//! group; binary frames a client sends are validated with the
//! `fastchat-core` codec and the original bytes are fanned out to the other
//! members of the group.
//!
//! ```text
//! Browser (binary or JSON over WebSocket)
//!         ↕
//! [fastchat-server]
//!   ├── domain/           ServerConfig
//!   ├── application/      Relay decision: forward, re-encode or reject
//!   └── infrastructure/
//!         ├── hub/        Named-group broadcast fan-out
//!         └── ws_server/  WebSocket accept loop (tokio-tungstenite)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no networking and no async.
//! - `application` depends on `domain` and `fastchat-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: per-frame relay decisions.
pub mod application;

/// Infrastructure layer: group fan-out and the WebSocket server.
pub mod infrastructure;
