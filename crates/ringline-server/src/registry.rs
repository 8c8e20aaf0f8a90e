//! Connection registry and presence tracking.
//!
//! Maintains the map from logical users to their live WebSocket
//! connections. A user may hold several connections at once
//! (multi-device); presence flips online on the first and offline on the
//! last. The registry also owns the outbound send primitives every other
//! component relays through.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use ringline_shared::protocol::ServerEvent;
use ringline_shared::types::{ConnectionId, UserId};

/// Sender half of one connection's outbound event buffer.
pub type OutboundSender = mpsc::Sender<ServerEvent>;

/// What a registration or unregistration did to the user's aggregate
/// presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// First live connection for this user.
    CameOnline,
    /// Last live connection closed.
    WentOffline,
    /// The user already had (or still has) other connections.
    Unchanged,
}

struct ConnectionHandle {
    user_id: UserId,
    tx: OutboundSender,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
}

/// Tracks every live connection per logical user.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authenticated connection.
    pub async fn register(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        tx: OutboundSender,
    ) -> PresenceTransition {
        let mut inner = self.inner.write().await;

        inner.connections.insert(
            connection_id,
            ConnectionHandle {
                user_id: user_id.clone(),
                tx,
            },
        );

        let connections = inner.users.entry(user_id.clone()).or_default();
        connections.insert(connection_id);
        let first = connections.len() == 1;

        debug!(
            user = %user_id.short(),
            connection = %connection_id,
            devices = connections.len(),
            "Registered connection"
        );

        if first {
            PresenceTransition::CameOnline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// Remove a connection on transport close.
    ///
    /// Returns the owning user and whether this was their last live
    /// connection; `None` if the connection was never registered.
    pub async fn unregister(
        &self,
        connection_id: ConnectionId,
    ) -> Option<(UserId, PresenceTransition)> {
        let mut inner = self.inner.write().await;

        let handle = inner.connections.remove(&connection_id)?;
        let user_id = handle.user_id;

        let remaining = match inner.users.get_mut(&user_id) {
            Some(set) => {
                set.remove(&connection_id);
                set.len()
            }
            None => 0,
        };
        if remaining == 0 {
            inner.users.remove(&user_id);
        }

        debug!(
            user = %user_id.short(),
            connection = %connection_id,
            remaining,
            "Unregistered connection"
        );

        let transition = if remaining == 0 {
            PresenceTransition::WentOffline
        } else {
            PresenceTransition::Unchanged
        };
        Some((user_id, transition))
    }

    /// Send to one specific connection. Slow consumers drop the frame.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) {
        let inner = self.inner.read().await;
        if let Some(handle) = inner.connections.get(&connection_id) {
            if handle.tx.try_send(event).is_err() {
                debug!(
                    connection = %connection_id,
                    "Dropping frame for slow connection"
                );
            }
        }
    }

    /// Fan an event out to every connection the user owns.
    ///
    /// Returns how many connections the event was handed to; zero means
    /// the target is offline and the frame was dropped (fire-and-forget).
    pub async fn send_to_user(&self, user_id: &UserId, event: &ServerEvent) -> usize {
        let inner = self.inner.read().await;

        let Some(connection_ids) = inner.users.get(user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in connection_ids {
            if let Some(handle) = inner.connections.get(connection_id) {
                if handle.tx.try_send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    debug!(
                        user = %user_id.short(),
                        connection = %connection_id,
                        "Dropping frame for slow connection"
                    );
                }
            }
        }
        delivered
    }

    /// Send to every live connection (presence notifications).
    pub async fn broadcast(&self, event: &ServerEvent) {
        let inner = self.inner.read().await;
        for (connection_id, handle) in &inner.connections {
            if handle.tx.try_send(event.clone()).is_err() {
                debug!(
                    connection = %connection_id,
                    "Dropping broadcast frame for slow connection"
                );
            }
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        let inner = self.inner.read().await;
        inner.users.contains_key(user_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn online_user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_shared::constants::OUTBOUND_BUFFER;
    use ringline_shared::types::RoomId;

    fn channel() -> (OutboundSender, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(OUTBOUND_BUFFER)
    }

    fn left_event() -> ServerEvent {
        ServerEvent::ParticipantLeft {
            room_id: RoomId::new("r1"),
            user_id: UserId::new("u-x"),
        }
    }

    #[tokio::test]
    async fn test_first_connection_comes_online() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let transition = registry
            .register(UserId::new("u-alice"), ConnectionId::new(), tx)
            .await;
        assert_eq!(transition, PresenceTransition::CameOnline);
        assert!(registry.is_online(&UserId::new("u-alice")).await);
    }

    #[tokio::test]
    async fn test_multi_device_presence() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("u-alice");
        let (phone, desk) = (ConnectionId::new(), ConnectionId::new());

        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        assert_eq!(
            registry.register(alice.clone(), phone, tx1).await,
            PresenceTransition::CameOnline
        );
        assert_eq!(
            registry.register(alice.clone(), desk, tx2).await,
            PresenceTransition::Unchanged
        );

        // Closing one device keeps the user online.
        let (user, transition) = registry.unregister(phone).await.unwrap();
        assert_eq!(user, alice);
        assert_eq!(transition, PresenceTransition::Unchanged);
        assert!(registry.is_online(&alice).await);

        // Closing the last one flips offline.
        let (_, transition) = registry.unregister(desk).await.unwrap();
        assert_eq!(transition, PresenceTransition::WentOffline);
        assert!(!registry.is_online(&alice).await);
    }

    #[tokio::test]
    async fn test_unregister_unknown_connection_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.unregister(ConnectionId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_device() {
        let registry = ConnectionRegistry::new();
        let alice = UserId::new("u-alice");

        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        registry.register(alice.clone(), ConnectionId::new(), tx1).await;
        registry.register(alice.clone(), ConnectionId::new(), tx2).await;

        let delivered = registry.send_to_user(&alice, &left_event()).await;
        assert_eq!(delivered, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_offline_user_is_a_miss() {
        let registry = ConnectionRegistry::new();
        let delivered = registry
            .send_to_user(&UserId::new("u-ghost"), &left_event())
            .await;
        assert_eq!(delivered, 0);
    }
}
