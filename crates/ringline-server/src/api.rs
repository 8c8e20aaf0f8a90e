//! HTTP surface: health/info endpoints and the WebSocket upgrade.
//!
//! Authentication happens here, before the upgrade completes: a missing
//! or invalid token refuses the connection with 401 and no server-side
//! state is created.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::Method,
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use ringline_shared::constants::PROTOCOL_VERSION;
use ringline_shared::error::AuthError;
use ringline_shared::types::ChatId;
use ringline_store::{BlockStore, CallLogStore, CallRecord, PresenceStore};

use crate::auth::Authenticator;
use crate::blocklist::BlockGate;
use crate::calls::CallCoordinator;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use crate::relay::SignalingRelay;
use crate::rooms::RoomManager;
use crate::socket;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub authenticator: Authenticator,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub relay: Arc<SignalingRelay>,
    pub calls: Arc<CallCoordinator>,
    pub blocks: Arc<BlockGate>,
    pub call_log: Arc<dyn CallLogStore>,
    pub presence_store: Arc<dyn PresenceStore>,
}

impl AppState {
    /// Wire every service together over the given storage collaborators.
    pub fn build(
        config: ServerConfig,
        call_log: Arc<dyn CallLogStore>,
        block_store: Arc<dyn BlockStore>,
        presence_store: Arc<dyn PresenceStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let relay = Arc::new(SignalingRelay::new(registry.clone()));
        let calls = Arc::new(CallCoordinator::new(
            registry.clone(),
            call_log.clone(),
            config.ring_timeout,
        ));
        let blocks = Arc::new(BlockGate::new(block_store));
        let authenticator = Authenticator::new(config.auth_pubkey);

        Self {
            config: Arc::new(config),
            authenticator,
            registry,
            rooms,
            relay,
            calls,
            blocks,
            call_log,
            presence_store,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/calls/:chat_id", get(call_history))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until it fails or the process shuts down.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct InfoResponse {
    instance_name: String,
    protocol: &'static str,
    connections: usize,
    online_users: usize,
    active_rooms: usize,
}

async fn server_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        instance_name: state.config.instance_name.clone(),
        protocol: PROTOCOL_VERSION,
        connections: state.registry.connection_count().await,
        online_users: state.registry.online_user_count().await,
        active_rooms: state.rooms.room_count().await,
    })
}

#[derive(Deserialize)]
struct TokenParams {
    token: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let token = params.token.ok_or(AuthError::Missing)?;
    let ctx = state.authenticator.authenticate(&token)?;

    let max = state.config.max_connections;
    if max > 0 && state.registry.connection_count().await >= max {
        return Err(ServerError::AtCapacity);
    }

    Ok(ws.on_upgrade(move |socket| socket::handle_socket(state, ctx, socket)))
}

/// Call history for one conversation, newest first. Only records the
/// authenticated user participated in are visible.
async fn call_history(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<TokenParams>,
) -> Result<Json<Vec<CallRecord>>, ServerError> {
    let token = params.token.ok_or(AuthError::Missing)?;
    let ctx = state.authenticator.authenticate(&token)?;

    let chat_id = ChatId(chat_id);
    let call_log = state.call_log.clone();
    let lookup = chat_id.clone();
    let records = tokio::task::spawn_blocking(move || call_log.recent_for_chat(&lookup, 50))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    if records.is_empty() {
        return Err(ServerError::NotFound(format!(
            "No call history for chat {chat_id}"
        )));
    }

    let visible: Vec<CallRecord> = records
        .into_iter()
        .filter(|r| r.caller == ctx.user_id || r.recipient == ctx.user_id)
        .collect();

    if visible.is_empty() {
        return Err(ServerError::AccessDenied(
            "Not a participant in this conversation".to_string(),
        ));
    }

    Ok(Json(visible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use ringline_shared::auth::create_auth_token;
    use ringline_shared::types::{CallType, RoomId, UserId};
    use ringline_store::{CallOutcome, MemoryStore};

    fn state_with_auth() -> (AppState, Arc<MemoryStore>, SigningKey) {
        let provider_key = SigningKey::generate(&mut OsRng);
        let config = ServerConfig {
            auth_pubkey: provider_key.verifying_key().to_bytes(),
            ..ServerConfig::default()
        };

        let store = Arc::new(MemoryStore::new());
        let state = AppState::build(config, store.clone(), store.clone(), store.clone());
        (state, store, provider_key)
    }

    fn token_for(key: &SigningKey, user: &str) -> String {
        create_auth_token(
            UserId::new(user),
            user.to_string(),
            Utc::now() + Duration::hours(1),
            key,
        )
        .encode()
        .unwrap()
    }

    fn record(chat: &str, caller: &str, recipient: &str) -> CallRecord {
        CallRecord::new(
            RoomId::new("r1"),
            ChatId(chat.to_string()),
            UserId::new(caller),
            UserId::new(recipient),
            CallType::Video,
            CallOutcome::Missed,
        )
    }

    #[tokio::test]
    async fn test_call_history_for_participant() {
        let (state, store, key) = state_with_auth();
        store.append(&record("c1", "u-alice", "u-bob")).unwrap();

        let result = call_history(
            State(state),
            Path("c1".to_string()),
            Query(TokenParams {
                token: Some(token_for(&key, "u-bob")),
            }),
        )
        .await
        .unwrap();

        assert_eq!(result.0.len(), 1);
        assert_eq!(result.0[0].caller, UserId::new("u-alice"));
    }

    #[tokio::test]
    async fn test_call_history_unknown_chat_is_not_found() {
        let (state, _store, key) = state_with_auth();

        let err = call_history(
            State(state),
            Path("c-missing".to_string()),
            Query(TokenParams {
                token: Some(token_for(&key, "u-bob")),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_call_history_hidden_from_outsiders() {
        let (state, store, key) = state_with_auth();
        store.append(&record("c1", "u-alice", "u-bob")).unwrap();

        let err = call_history(
            State(state),
            Path("c1".to_string()),
            Query(TokenParams {
                token: Some(token_for(&key, "u-eve")),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_call_history_requires_token() {
        let (state, _store, _key) = state_with_auth();

        let err = call_history(
            State(state),
            Path("c1".to_string()),
            Query(TokenParams { token: None }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServerError::Auth(AuthError::Missing)));
    }
}
