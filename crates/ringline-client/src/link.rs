//! One peer link per remote participant.
//!
//! The link tracks the WebRTC signaling state for a single remote peer:
//! who offers, which descriptions have been applied, and every ICE
//! candidate that arrived before the remote description existed. A link
//! is never reused: once closed it stays closed and the orchestrator
//! creates a replacement.

use thiserror::Error;
use tracing::debug;

use ringline_shared::types::{
    IceCandidate, MediaPreference, RoomId, SessionDescription, UserId,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The operation is not permitted in the current signaling state.
    /// Expected under signaling races; callers log and drop.
    #[error("{op} invalid in signaling state {state:?}")]
    InvalidState {
        op: &'static str,
        state: SignalingState,
    },

    #[error("Link is closed")]
    Closed,
}

/// Which side creates the offer. Decided by [`elect_role`], identically
/// on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingRole {
    Offerer,
    Answerer,
}

/// Deterministic, symmetric offerer election: the participant whose id
/// sorts first creates the offer. Both sides compute this independently,
/// so glare cannot occur.
pub fn elect_role(local: &UserId, remote: &UserId) -> SignalingRole {
    if local < remote {
        SignalingRole::Offerer
    } else {
        SignalingRole::Answerer
    }
}

/// Mirror of the RTCPeerConnection signaling states this machine moves
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Coarse connection health of the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// What [`PeerLink::apply_remote_offer`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    /// The offer was applied; buffered candidates flush in this order.
    Applied { flushed: Vec<IceCandidate> },
    /// Identical session description already applied; ignore.
    Duplicate,
}

/// Where [`PeerLink::add_remote_candidate`] put the candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateDisposition {
    /// Remote description exists; apply immediately.
    Apply,
    /// No remote description yet; queued until one is set.
    Buffered,
}

pub struct PeerLink {
    remote_user: UserId,
    room_id: RoomId,
    role: SignalingRole,
    signaling: SignalingState,
    connection: PeerState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_candidates: Vec<IceCandidate>,
    /// Last known audio/video toggles of the remote.
    pub media: MediaPreference,
}

impl PeerLink {
    pub fn new(local_user: &UserId, remote_user: UserId, room_id: RoomId) -> Self {
        let role = elect_role(local_user, &remote_user);
        debug!(
            remote = %remote_user.short(),
            role = ?role,
            "Created peer link"
        );

        Self {
            remote_user,
            room_id,
            role,
            signaling: SignalingState::Stable,
            connection: PeerState::New,
            local_description: None,
            remote_description: None,
            pending_candidates: Vec::new(),
            media: MediaPreference::default(),
        }
    }

    pub fn remote_user(&self) -> &UserId {
        &self.remote_user
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn role(&self) -> SignalingRole {
        self.role
    }

    pub fn signaling(&self) -> SignalingState {
        self.signaling
    }

    pub fn connection(&self) -> PeerState {
        self.connection
    }

    pub fn is_closed(&self) -> bool {
        self.signaling == SignalingState::Closed
    }

    /// A completed negotiation: back in `Stable` with a remote
    /// description applied. A further remote offer means a fresh cycle.
    pub fn is_negotiated(&self) -> bool {
        self.signaling == SignalingState::Stable && self.remote_description.is_some()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Record the locally created offer.
    pub fn set_local_offer(&mut self, description: SessionDescription) -> Result<(), LinkError> {
        self.guard_open("set_local_offer")?;
        if self.signaling != SignalingState::Stable {
            return Err(LinkError::InvalidState {
                op: "set_local_offer",
                state: self.signaling,
            });
        }

        self.local_description = Some(description);
        self.signaling = SignalingState::HaveLocalOffer;
        self.connection = PeerState::Connecting;
        Ok(())
    }

    /// Record the locally created answer to a remote offer.
    pub fn set_local_answer(&mut self, description: SessionDescription) -> Result<(), LinkError> {
        self.guard_open("set_local_answer")?;
        if self.signaling != SignalingState::HaveRemoteOffer {
            return Err(LinkError::InvalidState {
                op: "set_local_answer",
                state: self.signaling,
            });
        }

        self.local_description = Some(description);
        self.signaling = SignalingState::Stable;
        Ok(())
    }

    /// Apply a remote offer.
    ///
    /// Accepted only in `Stable` or `HaveRemoteOffer`; an identical
    /// duplicate description is ignored. Returns the buffered candidates
    /// to apply, in original arrival order.
    pub fn apply_remote_offer(
        &mut self,
        description: SessionDescription,
    ) -> Result<OfferOutcome, LinkError> {
        self.guard_open("apply_remote_offer")?;

        if self.signaling == SignalingState::HaveRemoteOffer
            && self.remote_description.as_ref() == Some(&description)
        {
            debug!(remote = %self.remote_user.short(), "Ignoring duplicate offer");
            return Ok(OfferOutcome::Duplicate);
        }

        if !matches!(
            self.signaling,
            SignalingState::Stable | SignalingState::HaveRemoteOffer
        ) {
            return Err(LinkError::InvalidState {
                op: "apply_remote_offer",
                state: self.signaling,
            });
        }

        self.remote_description = Some(description);
        self.signaling = SignalingState::HaveRemoteOffer;
        self.connection = PeerState::Connecting;

        Ok(OfferOutcome::Applied {
            flushed: self.take_pending(),
        })
    }

    /// Apply a remote answer.
    ///
    /// Valid only while a local offer (or pranswer) is outstanding, and
    /// at most once: a second answer finds the machine back in `Stable`
    /// and is dropped by the caller.
    pub fn apply_remote_answer(
        &mut self,
        description: SessionDescription,
    ) -> Result<Vec<IceCandidate>, LinkError> {
        self.guard_open("apply_remote_answer")?;

        if !matches!(
            self.signaling,
            SignalingState::HaveLocalOffer | SignalingState::HaveLocalPranswer
        ) {
            return Err(LinkError::InvalidState {
                op: "apply_remote_answer",
                state: self.signaling,
            });
        }

        self.remote_description = Some(description);
        self.signaling = SignalingState::Stable;
        Ok(self.take_pending())
    }

    /// Accept a remote ICE candidate, buffering it while no remote
    /// description exists.
    pub fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<CandidateDisposition, LinkError> {
        self.guard_open("add_remote_candidate")?;

        if self.remote_description.is_some() {
            return Ok(CandidateDisposition::Apply);
        }

        self.pending_candidates.push(candidate);
        Ok(CandidateDisposition::Buffered)
    }

    /// Drain the pending queue in arrival order. Empty afterwards.
    fn take_pending(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    pub fn mark_connected(&mut self) {
        if self.signaling != SignalingState::Closed {
            self.connection = PeerState::Connected;
        }
    }

    pub fn mark_failed(&mut self) {
        if self.signaling != SignalingState::Closed {
            self.connection = PeerState::Failed;
        }
    }

    /// Terminal. Every later operation on this link is rejected; the
    /// orchestrator creates a fresh link for any new negotiation.
    pub fn close(&mut self) {
        self.signaling = SignalingState::Closed;
        self.connection = PeerState::Closed;
        self.pending_candidates.clear();
        debug!(remote = %self.remote_user.short(), "Closed peer link");
    }

    fn guard_open(&self, op: &'static str) -> Result<(), LinkError> {
        if self.signaling == SignalingState::Closed {
            debug!(remote = %self.remote_user.short(), op, "Operation on closed link");
            return Err(LinkError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_shared::types::SdpType;

    fn offer(sdp: &str) -> SessionDescription {
        SessionDescription {
            kind: SdpType::Offer,
            sdp: sdp.to_string(),
        }
    }

    fn answer(sdp: &str) -> SessionDescription {
        SessionDescription {
            kind: SdpType::Answer,
            sdp: sdp.to_string(),
        }
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }

    #[test]
    fn test_election_is_deterministic_and_symmetric() {
        let alice = UserId::new("u-alice");
        let bob = UserId::new("u-bob");

        // Exactly one side offers, and both compute the same result.
        assert_eq!(elect_role(&alice, &bob), SignalingRole::Offerer);
        assert_eq!(elect_role(&bob, &alice), SignalingRole::Answerer);
    }

    #[test]
    fn test_offerer_happy_path() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        assert_eq!(link.role(), SignalingRole::Offerer);

        link.set_local_offer(offer("local")).unwrap();
        assert_eq!(link.signaling(), SignalingState::HaveLocalOffer);

        let flushed = link.apply_remote_answer(answer("remote")).unwrap();
        assert!(flushed.is_empty());
        assert_eq!(link.signaling(), SignalingState::Stable);
    }

    #[test]
    fn test_answer_applied_only_once() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        link.set_local_offer(offer("local")).unwrap();
        link.apply_remote_answer(answer("remote")).unwrap();

        // The second answer finds Stable and is rejected.
        let err = link.apply_remote_answer(answer("remote")).unwrap_err();
        assert!(matches!(err, LinkError::InvalidState { .. }));
    }

    #[test]
    fn test_answer_without_local_offer_is_rejected() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        assert!(link.apply_remote_answer(answer("remote")).is_err());
    }

    #[test]
    fn test_early_candidates_flush_in_arrival_order() {
        let mut link = PeerLink::new(
            &UserId::new("u-bob"),
            UserId::new("u-alice"),
            RoomId::new("r1"),
        );
        assert_eq!(link.role(), SignalingRole::Answerer);

        for n in 0..3 {
            assert_eq!(
                link.add_remote_candidate(candidate(n)).unwrap(),
                CandidateDisposition::Buffered
            );
        }
        assert_eq!(link.pending_candidates(), 3);

        let outcome = link.apply_remote_offer(offer("remote")).unwrap();
        match outcome {
            OfferOutcome::Applied { flushed } => {
                let order: Vec<String> =
                    flushed.into_iter().map(|c| c.candidate).collect();
                assert_eq!(order, vec!["candidate:0", "candidate:1", "candidate:2"]);
            }
            other => panic!("Unexpected outcome: {other:?}"),
        }
        // The queue is discarded after the flush.
        assert_eq!(link.pending_candidates(), 0);

        // Later candidates apply immediately.
        assert_eq!(
            link.add_remote_candidate(candidate(9)).unwrap(),
            CandidateDisposition::Apply
        );
    }

    #[test]
    fn test_duplicate_offer_is_ignored() {
        let mut link = PeerLink::new(
            &UserId::new("u-bob"),
            UserId::new("u-alice"),
            RoomId::new("r1"),
        );

        assert!(matches!(
            link.apply_remote_offer(offer("remote")).unwrap(),
            OfferOutcome::Applied { .. }
        ));
        assert_eq!(
            link.apply_remote_offer(offer("remote")).unwrap(),
            OfferOutcome::Duplicate
        );
    }

    #[test]
    fn test_offer_during_local_offer_is_rejected() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        link.set_local_offer(offer("local")).unwrap();

        let err = link.apply_remote_offer(offer("remote")).unwrap_err();
        assert!(matches!(err, LinkError::InvalidState { .. }));
    }

    #[test]
    fn test_closed_link_rejects_everything() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        link.close();

        assert!(link.is_closed());
        assert_eq!(link.connection(), PeerState::Closed);
        assert_eq!(link.set_local_offer(offer("x")), Err(LinkError::Closed));
        assert_eq!(
            link.apply_remote_offer(offer("x")).unwrap_err(),
            LinkError::Closed
        );
        assert_eq!(
            link.add_remote_candidate(candidate(0)).unwrap_err(),
            LinkError::Closed
        );

        // Closing again stays closed.
        link.close();
        assert!(link.is_closed());
    }

    #[test]
    fn test_mark_connected_after_close_is_ignored() {
        let mut link = PeerLink::new(
            &UserId::new("u-alice"),
            UserId::new("u-bob"),
            RoomId::new("r1"),
        );
        link.close();
        link.mark_connected();
        assert_eq!(link.connection(), PeerState::Closed);
    }
}
