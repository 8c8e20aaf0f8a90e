//! # ringline-server
//!
//! Signaling relay server for the Ringline network.
//!
//! This binary provides:
//! - **Connection registry & presence**: every live WebSocket per logical
//!   user, with online/offline broadcasts across devices
//! - **Room manager**: ephemeral membership for video-call rooms and chat
//!   channels
//! - **Signaling relay**: verbatim forwarding of WebRTC offer/answer/ICE
//!   payloads to the target user's connections
//! - **Call lifecycle coordinator**: ring, cancel, decline, accept, end,
//!   with group fan-out, ring timeouts and call-log side effects
//! - **Block-aware fan-out gate** consulted before any relay

mod api;
mod auth;
mod blocklist;
mod calls;
mod config;
mod error;
mod persist;
mod registry;
mod relay;
mod rooms;
mod socket;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use ringline_store::{BlockStore, CallLogStore, MemoryStore, PresenceStore, SqliteStore};

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ringline_server=debug")),
        )
        .init();

    info!("Starting Ringline signaling server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        addr = %config.http_addr,
        ring_timeout_secs = config.ring_timeout.as_secs(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Open the storage collaborators
    // -----------------------------------------------------------------------
    let (call_log, block_store, presence_store): (
        Arc<dyn CallLogStore>,
        Arc<dyn BlockStore>,
        Arc<dyn PresenceStore>,
    ) = match &config.database_path {
        Some(path) => {
            let store = Arc::new(SqliteStore::open_at(path)?);
            (store.clone(), store.clone(), store)
        }
        None => {
            info!("No database path configured, call log will not survive restarts");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store.clone(), store)
        }
    };

    // -----------------------------------------------------------------------
    // 4. Wire the services and serve until shutdown
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let state = AppState::build(config, call_log, block_store, presence_store);

    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
