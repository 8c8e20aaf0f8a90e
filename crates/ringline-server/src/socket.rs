//! Per-connection event loop and dispatch.
//!
//! Each authenticated WebSocket gets an outbound mpsc buffer drained by a
//! writer task, while this task reads frames and dispatches them. A
//! malformed or out-of-order frame is logged and skipped; nothing a
//! single client sends can take the relay down for other connections.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ringline_shared::constants::OUTBOUND_BUFFER;
use ringline_shared::protocol::{ClientEvent, Profile, ServerEvent};
use ringline_shared::types::{
    ChatId, ConnectionId, MediaPreference, ParticipantInfo, RoomId, UserId,
};

use crate::api::AppState;
use crate::auth::AuthContext;
use crate::persist::spawn_write;
use crate::registry::PresenceTransition;
use crate::rooms::Departure;

/// Chat channels share the room manager with video rooms under a
/// distinct id namespace.
fn chat_room_id(chat_id: &ChatId) -> RoomId {
    RoomId::new(format!("chat:{}", chat_id.0))
}

/// Drive one authenticated connection until the transport closes.
pub async fn handle_socket(state: AppState, ctx: AuthContext, socket: WebSocket) {
    let connection_id = ConnectionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    let transition = state
        .registry
        .register(ctx.user_id.clone(), connection_id, outbound_tx)
        .await;

    info!(
        user = %ctx.user_id.short(),
        connection = %connection_id,
        "Connection established"
    );

    if transition == PresenceTransition::CameOnline {
        announce_presence(&state, &ctx.user_id, true).await;
    }

    let (mut sink, mut stream) = socket.split();

    // Writer task: drain the outbound buffer into the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: parse and dispatch until the transport closes.
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(
                    connection = %connection_id,
                    error = %e,
                    "Transport error, closing connection"
                );
                break;
            }
        };

        match message {
            Message::Text(text) => match ClientEvent::from_json(&text) {
                Ok(event) => dispatch(&state, &ctx, connection_id, event).await,
                Err(e) => {
                    debug!(
                        connection = %connection_id,
                        error = %e,
                        "Dropping malformed frame"
                    );
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the transport layer.
            _ => {}
        }
    }

    cleanup(&state, &ctx, connection_id).await;
    writer.abort();

    info!(
        user = %ctx.user_id.short(),
        connection = %connection_id,
        "Connection closed"
    );
}

/// Route one client event to the owning component.
pub(crate) async fn dispatch(
    state: &AppState,
    ctx: &AuthContext,
    connection_id: ConnectionId,
    event: ClientEvent,
) {
    let user_id = &ctx.user_id;

    match event {
        ClientEvent::JoinVideoRoom { room_id, profile } => {
            join_room(state, user_id, connection_id, room_id, profile).await;
        }

        ClientEvent::LeaveVideoRoom {
            room_id,
            duration_secs,
            ..
        } => {
            // A hang-up carries the call summary with it.
            if let Some(duration) = duration_secs {
                state.calls.end(user_id, &room_id, duration).await;
            }
            if let Some(departure) = state.rooms.leave(&room_id, connection_id).await {
                emit_departure(state, &room_id, &departure).await;
            }
        }

        ClientEvent::WebrtcOffer {
            description,
            target_user_id,
            room_id,
        } => {
            let event = ServerEvent::WebrtcOffer {
                from_user_id: user_id.clone(),
                room_id,
                description,
            };
            state.relay.relay_to_user(user_id, &target_user_id, event).await;
        }

        ClientEvent::WebrtcAnswer {
            description,
            target_user_id,
            room_id,
        } => {
            let event = ServerEvent::WebrtcAnswer {
                from_user_id: user_id.clone(),
                room_id,
                description,
            };
            state.relay.relay_to_user(user_id, &target_user_id, event).await;
        }

        ClientEvent::WebrtcIceCandidate {
            candidate,
            target_user_id,
            room_id,
        } => {
            let event = ServerEvent::WebrtcIceCandidate {
                from_user_id: user_id.clone(),
                room_id,
                candidate,
            };
            state.relay.relay_to_user(user_id, &target_user_id, event).await;
        }

        ClientEvent::IncomingCall {
            recipients,
            room_id,
            chat_id,
            call_type,
            profile,
        } => {
            initiate_call(
                state,
                user_id,
                connection_id,
                recipients,
                room_id,
                chat_id,
                call_type,
                profile,
            )
            .await;
        }

        ClientEvent::CancelCall { room_id, .. } => {
            state.calls.cancel(user_id, &room_id).await;
        }

        ClientEvent::CallDecline { room_id, .. } => {
            state.calls.decline(user_id, &room_id).await;
        }

        ClientEvent::CallEnded {
            room_id,
            duration_secs,
            ..
        } => {
            state.calls.end(user_id, &room_id, duration_secs).await;
        }

        ClientEvent::UpdateMediaPreference {
            room_id,
            preference,
        } => {
            broadcast_preference(state, user_id, connection_id, room_id, preference).await;
        }

        ClientEvent::ChatMessage {
            chat_id,
            target_user_id,
            message_id,
            body,
        } => {
            if state.blocks.is_blocked(user_id, &target_user_id).await {
                deny(state, connection_id, "This conversation is unavailable").await;
                return;
            }

            let event = ServerEvent::ChatMessage {
                chat_id,
                from_user_id: user_id.clone(),
                message_id,
                body,
                sent_at: Utc::now(),
            };
            state
                .relay
                .relay_to_user(user_id, &target_user_id, event)
                .await;
        }

        ClientEvent::JoinChat { chat_id } => {
            let profile = Profile {
                display_name: ctx.display_name.clone(),
                photo_url: None,
            };
            join_room(state, user_id, connection_id, chat_room_id(&chat_id), profile).await;
        }

        ClientEvent::LeaveChat { chat_id } => {
            let room_id = chat_room_id(&chat_id);
            if let Some(departure) = state.rooms.leave(&room_id, connection_id).await {
                emit_departure(state, &room_id, &departure).await;
            }
        }

        ClientEvent::BlockUser { target_user_id } => {
            state.blocks.block(user_id, &target_user_id).await;
        }

        ClientEvent::UnblockUser { target_user_id } => {
            state.blocks.unblock(user_id, &target_user_id).await;
        }
    }
}

async fn join_room(
    state: &AppState,
    user_id: &UserId,
    connection_id: ConnectionId,
    room_id: RoomId,
    profile: Profile,
) {
    let participant = ParticipantInfo {
        user_id: user_id.clone(),
        display_name: profile.display_name,
        photo_url: profile.photo_url,
    };

    let others = state
        .rooms
        .join(room_id.clone(), connection_id, participant.clone())
        .await;

    // Late-join sync: the joiner gets the current snapshot.
    state
        .registry
        .send_to_connection(
            connection_id,
            ServerEvent::RoomParticipants {
                room_id: room_id.clone(),
                participants: others.iter().map(|(_, info)| info.clone()).collect(),
            },
        )
        .await;

    // Everyone already present learns about the joiner.
    let joined = ServerEvent::ParticipantJoined {
        room_id: room_id.clone(),
        participant,
    };
    for (other_id, _) in &others {
        state.registry.send_to_connection(*other_id, joined.clone()).await;
    }

    // A ringing recipient entering the room accepts the call.
    state.calls.on_participant_joined(&room_id, user_id).await;
}

#[allow(clippy::too_many_arguments)]
async fn initiate_call(
    state: &AppState,
    user_id: &UserId,
    connection_id: ConnectionId,
    recipients: Vec<UserId>,
    room_id: RoomId,
    chat_id: ChatId,
    call_type: ringline_shared::types::CallType,
    profile: Profile,
) {
    // The gate is consulted per recipient: a private call to a blocked
    // party is rejected outright, a group call just skips them.
    let mut allowed = Vec::new();
    for recipient in recipients {
        if state.blocks.is_blocked(user_id, &recipient).await {
            debug!(
                caller = %user_id.short(),
                recipient = %recipient.short(),
                "Skipping blocked call recipient"
            );
        } else {
            allowed.push(recipient);
        }
    }

    if allowed.is_empty() {
        deny(state, connection_id, "You cannot call this user").await;
        return;
    }

    state
        .calls
        .initiate(user_id.clone(), profile, allowed, room_id, chat_id, call_type)
        .await;
}

async fn broadcast_preference(
    state: &AppState,
    user_id: &UserId,
    connection_id: ConnectionId,
    room_id: RoomId,
    preference: MediaPreference,
) {
    if !state.rooms.user_present(&room_id, user_id).await {
        debug!(
            room = %room_id,
            user = %user_id.short(),
            "Dropping media preference from a non-member"
        );
        return;
    }

    let event = ServerEvent::MediaPreferenceChanged {
        room_id: room_id.clone(),
        user_id: user_id.clone(),
        preference,
    };

    for (other_id, _) in state.rooms.members(&room_id).await {
        if other_id != connection_id {
            state.registry.send_to_connection(other_id, event.clone()).await;
        }
    }
}

/// Notify the remaining members and drop the call session when the room
/// emptied.
async fn emit_departure(state: &AppState, room_id: &RoomId, departure: &Departure) {
    let left = ServerEvent::ParticipantLeft {
        room_id: room_id.clone(),
        user_id: departure.participant.user_id.clone(),
    };
    for remaining in &departure.remaining {
        state.registry.send_to_connection(*remaining, left.clone()).await;
    }

    if departure.room_deleted {
        state.calls.on_room_destroyed(room_id).await;
    }
}

async fn deny(state: &AppState, connection_id: ConnectionId, reason: &str) {
    state
        .registry
        .send_to_connection(
            connection_id,
            ServerEvent::AccessDenied {
                reason: reason.to_string(),
            },
        )
        .await;
}

/// Transport closed: sweep rooms, then presence.
async fn cleanup(state: &AppState, ctx: &AuthContext, connection_id: ConnectionId) {
    for (room_id, departure) in state.rooms.leave_all(connection_id).await {
        emit_departure(state, &room_id, &departure).await;
    }

    if let Some((user_id, transition)) = state.registry.unregister(connection_id).await {
        if transition == PresenceTransition::WentOffline {
            state.blocks.evict(&user_id).await;
            announce_presence(state, &user_id, false).await;
        }
    }
}

/// Broadcast the presence flip and persist it in the background.
async fn announce_presence(state: &AppState, user_id: &UserId, online: bool) {
    let last_active_at = Utc::now();

    state
        .registry
        .broadcast(&ServerEvent::PresenceChanged {
            user_id: user_id.clone(),
            online,
            last_active_at,
        })
        .await;

    let presence_store = state.presence_store.clone();
    let user = user_id.clone();
    spawn_write("persist-presence", move || {
        presence_store.write(&user, online, last_active_at)
    });
}
