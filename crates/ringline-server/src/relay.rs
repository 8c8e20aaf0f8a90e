//! Signaling relay.
//!
//! Pure fan-out by identity: forwards offer/answer/candidate payloads to
//! every connection the target user owns, verbatim and already tagged
//! with the sender. No semantic interpretation of SDP or candidates
//! happens here. A target with zero live connections is a delivery miss:
//! the frame is dropped and the call lifecycle's ring timeout remains the
//! user-visible correctness mechanism.

use std::sync::Arc;

use tracing::debug;

use ringline_shared::protocol::ServerEvent;
use ringline_shared::types::UserId;

use crate::registry::ConnectionRegistry;

pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forward an event to all of the target's connections.
    ///
    /// Returns `false` on a delivery miss (target offline). Never an
    /// error: the protocol is fire-and-forget.
    pub async fn relay_to_user(
        &self,
        from: &UserId,
        target: &UserId,
        event: ServerEvent,
    ) -> bool {
        let delivered = self.registry.send_to_user(target, &event).await;

        if delivered == 0 {
            debug!(
                from = %from.short(),
                target = %target.short(),
                "Delivery miss, dropping signaling message"
            );
            return false;
        }

        debug!(
            from = %from.short(),
            target = %target.short(),
            connections = delivered,
            "Relayed signaling message"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_shared::constants::OUTBOUND_BUFFER;
    use ringline_shared::types::{ConnectionId, RoomId, SdpType, SessionDescription};
    use tokio::sync::mpsc;

    fn offer(from: &str) -> ServerEvent {
        ServerEvent::WebrtcOffer {
            from_user_id: UserId::new(from),
            room_id: RoomId::new("r1"),
            description: SessionDescription {
                kind: SdpType::Offer,
                sdp: "v=0".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_relay_reaches_all_target_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        let bob = UserId::new("u-bob");

        let (tx1, mut rx1) = mpsc::channel(OUTBOUND_BUFFER);
        let (tx2, mut rx2) = mpsc::channel(OUTBOUND_BUFFER);
        registry.register(bob.clone(), ConnectionId::new(), tx1).await;
        registry.register(bob.clone(), ConnectionId::new(), tx2).await;

        let delivered = relay
            .relay_to_user(&UserId::new("u-alice"), &bob, offer("u-alice"))
            .await;

        assert!(delivered);
        assert!(matches!(
            rx1.try_recv().unwrap(),
            ServerEvent::WebrtcOffer { .. }
        ));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            ServerEvent::WebrtcOffer { .. }
        ));
    }

    #[tokio::test]
    async fn test_relay_to_offline_user_is_dropped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = SignalingRelay::new(registry);

        let delivered = relay
            .relay_to_user(
                &UserId::new("u-alice"),
                &UserId::new("u-ghost"),
                offer("u-alice"),
            )
            .await;

        assert!(!delivered);
    }
}
