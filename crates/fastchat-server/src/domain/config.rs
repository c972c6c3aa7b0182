//! Relay server configuration.
//!
//! [`ServerConfig`] can be read from a TOML file and then overridden from the
//! command line (see `main.rs`).  Every field has a serde default, so an
//! empty file, a partial file, or no file at all all produce a working
//! configuration.
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 3000
//! default_group = "main"
//! decode_policy = "strict"
//! channel_capacity = 1024
//! accept_json = true
//! log_level = "debug"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use fastchat_core::DecodePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` and `port` do not form a socket address.
    #[error("invalid bind address '{address}:{port}'")]
    InvalidAddress { address: String, port: u16 },

    /// A broadcast channel needs room for at least one message.
    #[error("channel_capacity must be at least 1")]
    ZeroCapacity,
}

/// All runtime settings for the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind.  `"0.0.0.0"` accepts connections on every
    /// interface.
    pub bind_address: String,
    /// TCP port for the WebSocket listener.  `0` asks the OS for a free port.
    pub port: u16,
    /// Group every new connection is subscribed to.
    pub default_group: String,
    /// How strictly inbound binary frames are validated.
    pub decode_policy: DecodePolicy,
    /// Per-group broadcast buffer.  Subscribers that fall further behind
    /// than this skip the messages they missed.
    pub channel_capacity: usize,
    /// Accept JSON text frames and re-encode them to binary before fan-out.
    pub accept_json: bool,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            default_group: "main".to_string(),
            decode_policy: DecodePolicy::Lenient,
            channel_capacity: 1024,
            accept_json: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown value
    /// types, and [`ConfigError::ZeroCapacity`] for a zero channel capacity.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`ServerConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if `channel_capacity` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Combines `bind_address` and `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP
    /// address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                address: self.bind_address.clone(),
                port: self.port,
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
