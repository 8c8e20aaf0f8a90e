//! Call lifecycle coordination.
//!
//! One [`CallSession`] per room id, driven through an explicit state
//! machine: `Ringing -> {Accepted, Declined, Cancelled, TimedOut} ->
//! Ended`. Exactly one terminal transition fires per session; anything
//! arriving in a state that does not permit it is logged and dropped,
//! because simultaneous hang-ups and similar signaling races are
//! expected, not errors.
//!
//! The ring timer is owned by the session and aborted (not merely
//! ignored) the instant the call is accepted, declined or cancelled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ringline_shared::protocol::{Profile, ServerEvent};
use ringline_shared::types::{CallMode, CallType, ChatId, RoomId, UserId};
use ringline_store::{CallLogStore, CallOutcome, CallRecord};

use crate::persist::spawn_write;
use crate::registry::ConnectionRegistry;

/// Where a call session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Accepted,
    Declined,
    Cancelled,
    TimedOut,
    Ended,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CallState::Ringing | CallState::Accepted)
    }
}

struct CallSession {
    caller: UserId,
    recipients: Vec<UserId>,
    /// Recipients still ringing (not yet declined).
    pending: HashSet<UserId>,
    chat_id: ChatId,
    call_type: CallType,
    mode: CallMode,
    state: CallState,
    ring_timer: Option<JoinHandle<()>>,
}

impl CallSession {
    fn abort_timer(&mut self) {
        if let Some(timer) = self.ring_timer.take() {
            timer.abort();
        }
    }
}

/// Owns every live call session and its ring timer.
pub struct CallCoordinator {
    registry: Arc<ConnectionRegistry>,
    call_log: Arc<dyn CallLogStore>,
    ring_timeout: Duration,
    sessions: RwLock<HashMap<RoomId, CallSession>>,
}

impl CallCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        call_log: Arc<dyn CallLogStore>,
        ring_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            call_log,
            ring_timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Idle -> Ringing. Rings every recipient independently and arms the
    /// ring timer. Returns `false` if the room already has a live call.
    pub async fn initiate(
        self: &Arc<Self>,
        caller: UserId,
        caller_profile: Profile,
        recipients: Vec<UserId>,
        room_id: RoomId,
        chat_id: ChatId,
        call_type: CallType,
    ) -> bool {
        if recipients.is_empty() {
            warn!(room = %room_id, "Dropping call initiation with no recipients");
            return false;
        }

        let mode = if recipients.len() > 1 {
            CallMode::Group
        } else {
            CallMode::Private
        };

        {
            let mut sessions = self.sessions.write().await;

            if let Some(existing) = sessions.get(&room_id) {
                if !existing.state.is_terminal() {
                    warn!(
                        room = %room_id,
                        state = ?existing.state,
                        "Dropping call initiation for a room with a live call"
                    );
                    return false;
                }
            }

            // Arm the ring timer. It behaves exactly like a caller cancel
            // when it fires first.
            let coordinator = Arc::clone(self);
            let timer_room = room_id.clone();
            let timeout = self.ring_timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                coordinator.handle_ring_timeout(&timer_room).await;
            });

            sessions.insert(
                room_id.clone(),
                CallSession {
                    caller: caller.clone(),
                    recipients: recipients.clone(),
                    pending: recipients.iter().cloned().collect(),
                    chat_id: chat_id.clone(),
                    call_type,
                    mode,
                    state: CallState::Ringing,
                    ring_timer: Some(timer),
                },
            );
        }

        info!(
            room = %room_id,
            caller = %caller.short(),
            recipients = recipients.len(),
            mode = ?mode,
            "Call ringing"
        );

        let ring = ServerEvent::IncomingCall {
            from_user_id: caller.clone(),
            caller: caller_profile,
            room_id: room_id.clone(),
            chat_id,
            call_type,
            mode,
        };
        for recipient in &recipients {
            if self.registry.send_to_user(recipient, &ring).await == 0 {
                debug!(
                    room = %room_id,
                    recipient = %recipient.short(),
                    "Recipient offline, ring dropped (timeout will record the miss)"
                );
            }
        }
        true
    }

    /// Ringing -> Cancelled, caller side. Rejected once any recipient
    /// has joined (the call is already live) or after a terminal state.
    pub async fn cancel(&self, caller: &UserId, room_id: &RoomId) {
        self.cancel_like(caller, room_id, CallState::Cancelled).await;
    }

    async fn handle_ring_timeout(&self, room_id: &RoomId) {
        // The caller owns the timer, so the transition is attributed to
        // the caller side.
        let caller = {
            let sessions = self.sessions.read().await;
            match sessions.get(room_id) {
                Some(session) => session.caller.clone(),
                None => return,
            }
        };
        self.cancel_like(&caller, room_id, CallState::TimedOut).await;
    }

    /// Shared Ringing -> {Cancelled, TimedOut} path: both record missed
    /// calls and notify both parties identically.
    async fn cancel_like(&self, caller: &UserId, room_id: &RoomId, target_state: CallState) {
        let effects = {
            let mut sessions = self.sessions.write().await;

            let Some(session) = sessions.get_mut(room_id) else {
                debug!(room = %room_id, "Dropping cancel for unknown call");
                return;
            };

            if session.state != CallState::Ringing {
                debug!(
                    room = %room_id,
                    state = ?session.state,
                    "Dropping cancel in invalid state"
                );
                return;
            }
            if &session.caller != caller {
                warn!(
                    room = %room_id,
                    from = %caller.short(),
                    "Dropping cancel from a non-caller"
                );
                return;
            }

            session.abort_timer();
            session.state = target_state;

            (
                session.caller.clone(),
                session.pending.iter().cloned().collect::<Vec<_>>(),
                session.chat_id.clone(),
                session.call_type,
            )
        };
        let (session_caller, pending, chat_id, call_type) = effects;

        info!(
            room = %room_id,
            state = ?target_state,
            "Call cancelled before pickup"
        );

        let cancelled = ServerEvent::CallCancelled {
            room_id: room_id.clone(),
            chat_id: chat_id.clone(),
        };
        let refresh = ServerEvent::SidebarRefresh {
            chat_id: chat_id.clone(),
        };

        // Close the ring screen on every recipient device, then nudge
        // both parties to refresh their conversation list.
        for recipient in &pending {
            self.registry.send_to_user(recipient, &cancelled).await;
            self.registry.send_to_user(recipient, &refresh).await;
        }
        self.registry.send_to_user(&session_caller, &cancelled).await;
        self.registry.send_to_user(&session_caller, &refresh).await;

        let call_log = Arc::clone(&self.call_log);
        let room_id = room_id.clone();
        spawn_write("append-missed-call", move || {
            for recipient in &pending {
                call_log.append(&CallRecord::new(
                    room_id.clone(),
                    chat_id.clone(),
                    session_caller.clone(),
                    recipient.clone(),
                    call_type,
                    CallOutcome::Missed,
                ))?;
            }
            Ok(())
        });
    }

    /// Ringing -> Declined, recipient side. For a group call only the
    /// last outstanding decline terminates the session.
    pub async fn decline(&self, recipient: &UserId, room_id: &RoomId) {
        let effects = {
            let mut sessions = self.sessions.write().await;

            let Some(session) = sessions.get_mut(room_id) else {
                debug!(room = %room_id, "Dropping decline for unknown call");
                return;
            };

            if session.state != CallState::Ringing {
                debug!(
                    room = %room_id,
                    state = ?session.state,
                    "Dropping decline in invalid state"
                );
                return;
            }
            if !session.pending.remove(recipient) {
                debug!(
                    room = %room_id,
                    from = %recipient.short(),
                    "Dropping decline from a non-pending recipient"
                );
                return;
            }

            if session.pending.is_empty() {
                session.abort_timer();
                session.state = CallState::Declined;
            }

            (
                session.caller.clone(),
                session.chat_id.clone(),
                session.call_type,
            )
        };
        let (caller, chat_id, call_type) = effects;

        info!(
            room = %room_id,
            recipient = %recipient.short(),
            "Call declined"
        );

        // The caller is notified specifically; no broadcast.
        let declined = ServerEvent::CallDeclined {
            room_id: room_id.clone(),
            chat_id: chat_id.clone(),
            by_user_id: recipient.clone(),
        };
        self.registry.send_to_user(&caller, &declined).await;

        let refresh = ServerEvent::SidebarRefresh {
            chat_id: chat_id.clone(),
        };
        self.registry.send_to_user(&caller, &refresh).await;
        self.registry.send_to_user(recipient, &refresh).await;

        let call_log = Arc::clone(&self.call_log);
        let room_id = room_id.clone();
        let recipient = recipient.clone();
        spawn_write("append-declined-call", move || {
            call_log.append(&CallRecord::new(
                room_id,
                chat_id,
                caller,
                recipient,
                call_type,
                CallOutcome::Declined,
            ))
        });
    }

    /// A recipient joining the call room implicitly accepts: Ringing ->
    /// Accepted, timer aborted.
    pub async fn on_participant_joined(&self, room_id: &RoomId, user_id: &UserId) {
        let mut sessions = self.sessions.write().await;

        let Some(session) = sessions.get_mut(room_id) else {
            return;
        };
        if session.state != CallState::Ringing {
            return;
        }
        if !session.recipients.contains(user_id) {
            // The caller entering their own room does not accept the call.
            return;
        }

        session.abort_timer();
        session.state = CallState::Accepted;

        info!(
            room = %room_id,
            recipient = %user_id.short(),
            mode = ?session.mode,
            "Call accepted"
        );
    }

    /// Accepted -> Ended. Idempotent: the duration is recorded by the
    /// first hang-up only; the mirror event from the other side is a
    /// no-op.
    pub async fn end(&self, by: &UserId, room_id: &RoomId, duration_secs: u64) {
        let effects = {
            let mut sessions = self.sessions.write().await;

            let Some(session) = sessions.get_mut(room_id) else {
                debug!(room = %room_id, "Dropping end for unknown call");
                return;
            };

            if session.state != CallState::Accepted {
                debug!(
                    room = %room_id,
                    state = ?session.state,
                    "Dropping end in invalid state"
                );
                return;
            }
            let participant =
                session.caller == *by || session.recipients.contains(by);
            if !participant {
                warn!(
                    room = %room_id,
                    from = %by.short(),
                    "Dropping end from a non-participant"
                );
                return;
            }

            session.state = CallState::Ended;

            (
                session.caller.clone(),
                session.recipients.clone(),
                session.chat_id.clone(),
                session.call_type,
            )
        };
        let (caller, recipients, chat_id, call_type) = effects;

        info!(
            room = %room_id,
            by = %by.short(),
            duration_secs,
            "Call ended"
        );

        let ended = ServerEvent::CallEnded {
            room_id: room_id.clone(),
            chat_id: chat_id.clone(),
            duration_secs,
        };
        if &caller != by {
            self.registry.send_to_user(&caller, &ended).await;
        }
        for recipient in &recipients {
            if recipient != by {
                self.registry.send_to_user(recipient, &ended).await;
            }
        }

        let call_log = Arc::clone(&self.call_log);
        let room_id = room_id.clone();
        spawn_write("append-call-summary", move || {
            for recipient in &recipients {
                call_log.append(&CallRecord::new(
                    room_id.clone(),
                    chat_id.clone(),
                    caller.clone(),
                    recipient.clone(),
                    call_type,
                    CallOutcome::Completed { duration_secs },
                ))?;
            }
            Ok(())
        });
    }

    /// The room emptied out; drop the session (and any still-armed
    /// timer) with it.
    pub async fn on_room_destroyed(&self, room_id: &RoomId) {
        let mut sessions = self.sessions.write().await;
        if let Some(mut session) = sessions.remove(room_id) {
            session.abort_timer();
            debug!(room = %room_id, state = ?session.state, "Dropped call session");
        }
    }

    /// Current state for a room, if a session exists.
    pub async fn state_of(&self, room_id: &RoomId) -> Option<CallState> {
        self.sessions.read().await.get(room_id).map(|s| s.state)
    }
}
