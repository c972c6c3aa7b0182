//! Domain layer for fastchat-server.
//!
//! The relay configuration and its loader.  Message types live in
//! `fastchat-core` because the browser and any native client share them.

pub mod config;

pub use config::{ConfigError, ServerConfig};
