//! Ephemeral room membership for video calls and chat channels.
//!
//! Rooms are created lazily on first join and deleted when the last
//! participant leaves. A reverse index from connection to rooms exists so
//! that a closing transport can be swept out of every room it joined.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{debug, info};

use ringline_shared::types::{ConnectionId, ParticipantInfo, RoomId, UserId};

/// What [`RoomManager::leave`] removed.
#[derive(Debug, Clone)]
pub struct Departure {
    pub participant: ParticipantInfo,
    /// Everyone still in the room, to receive "participant left".
    pub remaining: Vec<ConnectionId>,
    pub room_deleted: bool,
}

#[derive(Default)]
struct RoomsInner {
    rooms: HashMap<RoomId, HashMap<ConnectionId, ParticipantInfo>>,
    membership: HashMap<ConnectionId, HashSet<RoomId>>,
}

/// Tracks which connections are in which rooms.
#[derive(Default)]
pub struct RoomManager {
    inner: RwLock<RoomsInner>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) a participant entry.
    ///
    /// Returns the snapshot of every *other* participant so the joiner
    /// can sync late. A stale entry for the same connection is replaced,
    /// never duplicated.
    pub async fn join(
        &self,
        room_id: RoomId,
        connection_id: ConnectionId,
        participant: ParticipantInfo,
    ) -> Vec<(ConnectionId, ParticipantInfo)> {
        let mut inner = self.inner.write().await;

        let room = inner.rooms.entry(room_id.clone()).or_default();
        room.insert(connection_id, participant.clone());

        let others: Vec<(ConnectionId, ParticipantInfo)> = room
            .iter()
            .filter(|(id, _)| **id != connection_id)
            .map(|(id, info)| (*id, info.clone()))
            .collect();

        inner
            .membership
            .entry(connection_id)
            .or_default()
            .insert(room_id.clone());

        info!(
            room = %room_id,
            user = %participant.user_id.short(),
            participants = others.len() + 1,
            "Participant joined room"
        );

        others
    }

    /// Remove a participant. Leaving a room the connection never joined
    /// is a no-op, not an error.
    pub async fn leave(&self, room_id: &RoomId, connection_id: ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.write().await;
        Self::leave_locked(&mut inner, room_id, connection_id)
    }

    /// Sweep a closing connection out of every room it joined.
    pub async fn leave_all(&self, connection_id: ConnectionId) -> Vec<(RoomId, Departure)> {
        let mut inner = self.inner.write().await;

        let rooms: Vec<RoomId> = inner
            .membership
            .get(&connection_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut departures = Vec::new();
        for room_id in rooms {
            if let Some(departure) = Self::leave_locked(&mut inner, &room_id, connection_id) {
                departures.push((room_id, departure));
            }
        }
        departures
    }

    fn leave_locked(
        inner: &mut RoomsInner,
        room_id: &RoomId,
        connection_id: ConnectionId,
    ) -> Option<Departure> {
        if let Some(set) = inner.membership.get_mut(&connection_id) {
            set.remove(room_id);
            if set.is_empty() {
                inner.membership.remove(&connection_id);
            }
        }

        let room = inner.rooms.get_mut(room_id)?;
        let participant = room.remove(&connection_id)?;
        let remaining: Vec<ConnectionId> = room.keys().copied().collect();

        let room_deleted = room.is_empty();
        if room_deleted {
            inner.rooms.remove(room_id);
            info!(room = %room_id, "Removed empty room");
        }

        debug!(
            room = %room_id,
            user = %participant.user_id.short(),
            remaining = remaining.len(),
            "Participant left room"
        );

        Some(Departure {
            participant,
            remaining,
            room_deleted,
        })
    }

    /// Current participant entries for a room.
    pub async fn members(&self, room_id: &RoomId) -> Vec<(ConnectionId, ParticipantInfo)> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.iter().map(|(id, info)| (*id, info.clone())).collect())
            .unwrap_or_default()
    }

    /// Whether any connection of the user is in the room.
    pub async fn user_present(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .is_some_and(|room| room.values().any(|info| &info.user_id == user_id))
    }

    /// Number of live rooms (video and chat alike).
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
