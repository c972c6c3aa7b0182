//! Infrastructure layer for fastchat-server.
//!
//! Handles all I/O: the TCP listener, WebSocket upgrades, per-session tasks
//! and the in-process group hub that fans frames out between sessions.
//!
//! # What does NOT belong here?
//!
//! - Deciding whether a frame may be relayed (that is the application layer)
//! - Configuration parsing (that is the domain layer and `main.rs`)

pub mod hub;
pub mod ws_server;

pub use hub::{Hub, Published};
pub use ws_server::{bind, run_server, serve};
