//! fastchat relay server: entry point.
//!
//! Accepts WebSocket connections, subscribes each one to a chat group and
//! relays binary fastchat messages between the members of that group.
//!
//! # Usage
//!
//! ```text
//! fastchat-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>    TOML configuration file
//!   --bind   <ADDR>    IP address to bind
//!   --port   <PORT>    WebSocket listener port
//!   --group  <NAME>    Group every connection joins
//!   --strict           Reject trailing bytes and oversized small ints
//!   --no-json          Refuse JSON text frames
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                 |
//! |-------------------|-----------------------------|
//! | `FASTCHAT_CONFIG` | Path to the TOML file       |
//! | `FASTCHAT_BIND`   | IP address to bind          |
//! | `FASTCHAT_PORT`   | WebSocket listener port     |
//! | `FASTCHAT_GROUP`  | Default group               |
//! | `RUST_LOG`        | Log filter (beats the file) |
//!
//! Precedence, highest first: CLI flag, environment variable, config file,
//! built-in default.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fastchat_core::DecodePolicy;
use fastchat_server::domain::ServerConfig;
use fastchat_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// fastchat WebSocket relay.
#[derive(Debug, Parser)]
#[command(
    name = "fastchat-server",
    about = "WebSocket relay for fastchat binary messages",
    version
)]
struct Cli {
    /// TOML configuration file.  Missing fields use built-in defaults.
    #[arg(long, env = "FASTCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind, e.g. `127.0.0.1` for local-only access.
    #[arg(long, env = "FASTCHAT_BIND")]
    bind: Option<String>,

    /// TCP port for the WebSocket listener.
    #[arg(long, env = "FASTCHAT_PORT")]
    port: Option<u16>,

    /// Group every new connection is subscribed to.
    #[arg(long, env = "FASTCHAT_GROUP")]
    group: Option<String>,

    /// Decode system messages strictly.
    #[arg(long)]
    strict: bool,

    /// Only accept binary frames.
    #[arg(long)]
    no_json: bool,
}

impl Cli {
    /// Loads the config file (if any) and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration is invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(group) = self.group {
            config.default_group = group;
        }
        if self.strict {
            config.decode_policy = DecodePolicy::Strict;
        }
        if self.no_json {
            config.accept_json = false;
        }

        config.validate()?;
        config.socket_addr()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_server_config()?;

    // `RUST_LOG` wins; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "fastchat relay starting on {}:{}",
        config.bind_address, config.port
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("fastchat relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
