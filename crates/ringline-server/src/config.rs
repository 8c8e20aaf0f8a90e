//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ringline_shared::constants::RING_TIMEOUT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database. Empty selects the
    /// in-memory store (nothing survives a restart).
    /// Env: `DATABASE_PATH`
    /// Default: `./ringline.db`
    pub database_path: Option<PathBuf>,

    /// Ed25519 public key of the identity provider (hex-encoded, 64 chars).
    /// Env: `AUTH_PUBKEY`
    /// Default: all-zeros (development only; rejects every token).
    pub auth_pubkey: [u8; 32],

    /// How long a call rings before the caller side gives up.
    /// Env: `RING_TIMEOUT_SECS`
    /// Default: 10 seconds.
    pub ring_timeout: Duration,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Ringline Node"`
    pub instance_name: String,

    /// Maximum number of concurrent connections (0 = unlimited).
    /// Env: `MAX_CONNECTIONS`
    /// Default: `0`
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: Some(PathBuf::from("./ringline.db")),
            auth_pubkey: [0u8; 32],
            ring_timeout: RING_TIMEOUT,
            instance_name: "Ringline Node".to_string(),
            max_connections: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if path.is_empty() {
                config.database_path = None;
            } else {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(hex_key) = std::env::var("AUTH_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.auth_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid AUTH_PUBKEY, using default (dev-only, rejects all tokens)"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("RING_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 {
                    config.ring_timeout = Duration::from_secs(secs);
                }
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("MAX_CONNECTIONS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_connections = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_str: &str) -> Result<[u8; 32], String> {
    let hex_str = hex_str.trim();
    let bytes = hex::decode(hex_str).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
