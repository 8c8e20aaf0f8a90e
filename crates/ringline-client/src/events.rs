//! Event bus from the orchestrator to the embedding application.
//!
//! The orchestrator never calls into the media engine or the UI store
//! directly; it emits [`PeerEvent`]s on an unbounded channel and the
//! application reacts. This keeps peer-connection lifecycle ownership
//! entirely inside the orchestrator.

use ringline_shared::protocol::ClientEvent;
use ringline_shared::types::{
    IceCandidate, MediaPreference, RoomId, SessionDescription, UserId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// This side won the offerer election: the media engine must create
    /// an SDP offer for the remote peer and report it back through
    /// [`PeerOrchestrator::local_offer_ready`].
    ///
    /// [`PeerOrchestrator::local_offer_ready`]: crate::orchestrator::PeerOrchestrator::local_offer_ready
    CreateOffer { remote_user: UserId, room_id: RoomId },

    /// A remote offer was accepted: the media engine must apply it and
    /// create an answer.
    CreateAnswer {
        remote_user: UserId,
        room_id: RoomId,
        remote_description: SessionDescription,
    },

    /// A remote answer was accepted: the media engine must apply it.
    RemoteDescriptionSet {
        remote_user: UserId,
        description: SessionDescription,
    },

    /// Apply one ICE candidate. Emitted in original arrival order,
    /// always after the remote description is in place.
    ApplyCandidate {
        remote_user: UserId,
        candidate: IceCandidate,
    },

    /// A signaling frame must go out to the server.
    SendSignal(ClientEvent),

    /// The link reached a connected state.
    LinkEstablished { remote_user: UserId },

    /// The prior connection object for this remote is closed and must
    /// not be reused. Emitted before any replacement link exists.
    LinkClosed { remote_user: UserId },

    /// The remote toggled audio/video.
    RemotePreferenceChanged {
        remote_user: UserId,
        preference: MediaPreference,
    },
}
