//! WebSocket server: accept loop and per-session task management.
//!
//! Every accepted connection is upgraded to a WebSocket, given a random
//! session id and subscribed to the configured default group.  Two tasks
//! then run per session:
//!
//! - **Hub → client**: receives frames published to the group and writes
//!   them as binary WebSocket frames, skipping the session's own frames.
//! - **Client → hub**: reads frames, runs them through
//!   [`crate::application::relay`] and publishes what it accepts.  The first
//!   rejected frame closes the connection with a policy-violation close code.
//!
//! The session ends when either task ends.  Shutdown is driven by a shared
//! `AtomicBool` polled by the accept loop (see `main.rs`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{relay_binary, relay_text, RelayRules};
use crate::domain::ServerConfig;
use crate::infrastructure::hub::Hub;

/// How long one `accept()` may block before the shutdown flag is re-checked.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the listener described by `config`.
///
/// # Errors
///
/// Returns an error if the address is invalid or the port cannot be bound.
pub async fn bind(config: &ServerConfig) -> anyhow::Result<TcpListener> {
    let addr = config.socket_addr()?;
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Binds, then serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener cannot
/// be bound.
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    config.validate()?;
    let listener = bind(&config).await?;
    let hub = Arc::new(Hub::new(config.channel_capacity));
    serve(listener, Arc::new(config), hub, running).await
}

/// Accepts connections on `listener` until `running` is set to `false`.
///
/// Taking an already-bound listener and an external [`Hub`] lets callers
/// bind port 0 and observe group membership.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "fastchat relay listening on {local_addr} (group={}, policy={:?}, json={})",
        config.default_group, config.decode_policy, config.accept_json
    );

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, cfg, hub).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep accepting.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

async fn handle_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
) {
    match run_session(raw_stream, peer_addr, config, Arc::clone(&hub)).await {
        Ok(session_id) => info!("session {session_id} ({peer_addr}) closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
    let pruned = hub.prune_idle();
    if pruned > 0 {
        debug!("pruned {pruned} idle group(s)");
    }
}

/// Runs one session to completion and returns its id.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<ServerConfig>,
    hub: Arc<Hub>,
) -> anyhow::Result<Uuid> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let session_id = Uuid::new_v4();
    let group = config.default_group.clone();
    let rules = RelayRules::from(config.as_ref());
    let mut hub_rx = hub.subscribe(&group);
    info!("session {session_id} ({peer_addr}) joined group '{group}'");

    let (ws_tx, mut ws_rx) = ws_stream.split();
    // Shared so the inbound task can send a Close frame on rejection.
    let ws_tx = Arc::new(tokio::sync::Mutex::new(ws_tx));

    // ── Task A: hub → client ──────────────────────────────────────────────────
    let ws_tx_out = Arc::clone(&ws_tx);
    let mut outbound_task = tokio::spawn(async move {
        loop {
            match hub_rx.recv().await {
                Ok(published) => {
                    if published.from == session_id {
                        continue;
                    }
                    let mut sink = ws_tx_out.lock().await;
                    if sink
                        .send(WsMessage::Binary(published.bytes.to_vec()))
                        .await
                        .is_err()
                    {
                        debug!("session {session_id}: send failed (client disconnected)");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("session {session_id}: too slow, skipped {skipped} message(s)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ── Task B: client → hub ──────────────────────────────────────────────────
    let ws_tx_in = Arc::clone(&ws_tx);
    let hub_in = Arc::clone(&hub);
    let mut inbound_task = tokio::spawn(async move {
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {session_id}: WebSocket closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {session_id}: WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("session {session_id}: stream ended");
                    break;
                }
            };

            let verdict = match ws_msg {
                WsMessage::Binary(frame) => relay_binary(frame, rules),
                WsMessage::Text(text) => relay_text(&text, rules),
                WsMessage::Close(_) => {
                    debug!("session {session_id}: Close frame received");
                    break;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            };

            match verdict {
                Ok(accepted) => {
                    for warning in &accepted.warnings {
                        warn!("session {session_id}: {warning}");
                    }
                    let delivered = hub_in.publish(&group, session_id, Arc::from(accepted.bytes));
                    debug!(
                        "session {session_id}: {} relayed to {} receiver(s){}",
                        accepted.kind.name(),
                        delivered.saturating_sub(1),
                        if accepted.verbatim { " (verbatim)" } else { "" }
                    );
                }
                Err(e) => {
                    warn!("session {session_id}: rejected frame: {e}");
                    let close = WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Policy,
                        reason: "malformed message".into(),
                    }));
                    let mut sink = ws_tx_in.lock().await;
                    if let Err(e) = sink.send(close).await {
                        debug!("session {session_id}: failed to send Close: {e}");
                    }
                    break;
                }
            }
        }
    });

    // Whichever side finishes first ends the session.  The other task is
    // aborted and awaited so its hub receiver is gone before pruning.
    tokio::select! {
        _ = &mut outbound_task => {
            debug!("session {session_id}: hub→client task ended");
            inbound_task.abort();
            let _ = inbound_task.await;
        }
        _ = &mut inbound_task => {
            debug!("session {session_id}: client→hub task ended");
            outbound_task.abort();
            let _ = outbound_task.await;
        }
    }

    Ok(session_id)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_port_zero_picks_free_port() {
        // Arrange
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };

        // Act
        let listener = bind(&config).await.unwrap();

        // Assert
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_address() {
        let config = ServerConfig {
            bind_address: "not.an.ip".to_string(),
            ..ServerConfig::default()
        };
        assert!(bind(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_serve_returns_when_flag_cleared() {
        // Arrange: flag already false, so the loop exits on its first check.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let running = Arc::new(AtomicBool::new(false));

        // Act
        let result = serve(
            listener,
            Arc::new(ServerConfig::default()),
            Arc::new(Hub::new(4)),
            running,
        )
        .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_server_rejects_zero_capacity() {
        let config = ServerConfig {
            channel_capacity: 0,
            ..ServerConfig::default()
        };
        let result = run_server(config, Arc::new(AtomicBool::new(false))).await;
        assert!(result.is_err());
    }
}
