//! Per-room peer orchestration.
//!
//! Owns every [`PeerLink`] for the room the client is in. Inbound
//! signaling (forwarded by the server) and local media-engine results
//! both flow through here; the embedding application only ever reacts to
//! the emitted [`PeerEvent`]s.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use ringline_shared::protocol::{ClientEvent, ServerEvent};
use ringline_shared::types::{
    IceCandidate, MediaPreference, RoomId, SessionDescription, UserId,
};

use crate::events::PeerEvent;
use crate::link::{CandidateDisposition, OfferOutcome, PeerLink, SignalingRole};

pub struct PeerOrchestrator {
    local_user: UserId,
    links: HashMap<UserId, PeerLink>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerOrchestrator {
    /// Returns the orchestrator and the receiving end of its event bus.
    pub fn new(local_user: UserId) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                local_user,
                links: HashMap::new(),
                events,
            },
            rx,
        )
    }

    /// Feed one server event through the orchestrator. Events that do
    /// not concern peer connections (presence, chat, call lifecycle) are
    /// ignored here; the presentation layer consumes them separately.
    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::RoomParticipants {
                room_id,
                participants,
            } => {
                for participant in participants {
                    self.discover(room_id.clone(), participant.user_id);
                }
            }

            ServerEvent::ParticipantJoined {
                room_id,
                participant,
            } => {
                self.discover(room_id, participant.user_id);
            }

            ServerEvent::ParticipantLeft { user_id, .. } => {
                self.remove_link(&user_id);
            }

            ServerEvent::WebrtcOffer {
                from_user_id,
                room_id,
                description,
            } => {
                self.on_remote_offer(from_user_id, room_id, description);
            }

            ServerEvent::WebrtcAnswer {
                from_user_id,
                description,
                ..
            } => {
                self.on_remote_answer(from_user_id, description);
            }

            ServerEvent::WebrtcIceCandidate {
                from_user_id,
                room_id,
                candidate,
            } => {
                self.on_remote_candidate(from_user_id, room_id, candidate);
            }

            ServerEvent::MediaPreferenceChanged {
                user_id,
                preference,
                ..
            } => {
                self.on_remote_preference(user_id, preference);
            }

            _ => {}
        }
    }

    /// A remote participant is (newly) in the room: establish exactly
    /// one link. A prior link for the same remote is closed first;
    /// rejoin always negotiates from scratch.
    fn discover(&mut self, room_id: RoomId, remote_user: UserId) {
        if remote_user == self.local_user {
            return;
        }

        if let Some(mut stale) = self.links.remove(&remote_user) {
            debug!(
                remote = %remote_user.short(),
                "Replacing prior link for rejoining participant"
            );
            stale.close();
            self.emit(PeerEvent::LinkClosed {
                remote_user: remote_user.clone(),
            });
        }

        let link = PeerLink::new(&self.local_user, remote_user.clone(), room_id.clone());
        let offerer = link.role() == SignalingRole::Offerer;
        self.links.insert(remote_user.clone(), link);

        if offerer {
            self.emit(PeerEvent::CreateOffer {
                remote_user,
                room_id,
            });
        }
    }

    fn on_remote_offer(
        &mut self,
        from: UserId,
        room_id: RoomId,
        description: SessionDescription,
    ) {
        // A fresh offer after a completed negotiation (or onto a closed
        // link) starts a new cycle: the old connection is closed before
        // the replacement exists.
        let needs_replacement = self
            .links
            .get(&from)
            .is_some_and(|link| link.is_closed() || link.is_negotiated());
        if needs_replacement {
            self.remove_link(&from);
        }

        let link = self
            .links
            .entry(from.clone())
            .or_insert_with(|| PeerLink::new(&self.local_user, from.clone(), room_id.clone()));

        match link.apply_remote_offer(description.clone()) {
            Ok(OfferOutcome::Applied { flushed }) => {
                self.emit(PeerEvent::CreateAnswer {
                    remote_user: from.clone(),
                    room_id,
                    remote_description: description,
                });
                for candidate in flushed {
                    self.emit(PeerEvent::ApplyCandidate {
                        remote_user: from.clone(),
                        candidate,
                    });
                }
            }
            Ok(OfferOutcome::Duplicate) => {}
            Err(e) => {
                debug!(from = %from.short(), error = %e, "Dropping remote offer");
            }
        }
    }

    fn on_remote_answer(&mut self, from: UserId, description: SessionDescription) {
        let Some(link) = self.links.get_mut(&from) else {
            debug!(from = %from.short(), "Dropping answer for unknown peer");
            return;
        };

        match link.apply_remote_answer(description.clone()) {
            Ok(flushed) => {
                self.emit(PeerEvent::RemoteDescriptionSet {
                    remote_user: from.clone(),
                    description,
                });
                for candidate in flushed {
                    self.emit(PeerEvent::ApplyCandidate {
                        remote_user: from.clone(),
                        candidate,
                    });
                }
            }
            Err(e) => {
                debug!(from = %from.short(), error = %e, "Dropping remote answer");
            }
        }
    }

    fn on_remote_candidate(&mut self, from: UserId, room_id: RoomId, candidate: IceCandidate) {
        // Candidates can outrun the offer; a link is created eagerly so
        // the queue has somewhere to live.
        let link = self
            .links
            .entry(from.clone())
            .or_insert_with(|| PeerLink::new(&self.local_user, from.clone(), room_id));

        match link.add_remote_candidate(candidate.clone()) {
            Ok(CandidateDisposition::Apply) => {
                self.emit(PeerEvent::ApplyCandidate {
                    remote_user: from,
                    candidate,
                });
            }
            Ok(CandidateDisposition::Buffered) => {}
            Err(e) => {
                debug!(from = %from.short(), error = %e, "Dropping ICE candidate");
            }
        }
    }

    fn on_remote_preference(&mut self, remote_user: UserId, preference: MediaPreference) {
        if let Some(link) = self.links.get_mut(&remote_user) {
            link.media = preference;
            self.emit(PeerEvent::RemotePreferenceChanged {
                remote_user,
                preference,
            });
        }
    }

    /// The media engine finished creating the offer requested by
    /// [`PeerEvent::CreateOffer`].
    pub fn local_offer_ready(&mut self, remote_user: &UserId, description: SessionDescription) {
        let Some(link) = self.links.get_mut(remote_user) else {
            warn!(remote = %remote_user.short(), "Offer ready for unknown peer");
            return;
        };

        let room_id = link.room_id().clone();
        match link.set_local_offer(description.clone()) {
            Ok(()) => {
                self.emit(PeerEvent::SendSignal(ClientEvent::WebrtcOffer {
                    description,
                    target_user_id: remote_user.clone(),
                    room_id,
                }));
            }
            Err(e) => {
                debug!(remote = %remote_user.short(), error = %e, "Dropping local offer");
            }
        }
    }

    /// The media engine finished creating the answer requested by
    /// [`PeerEvent::CreateAnswer`].
    pub fn local_answer_ready(&mut self, remote_user: &UserId, description: SessionDescription) {
        let Some(link) = self.links.get_mut(remote_user) else {
            warn!(remote = %remote_user.short(), "Answer ready for unknown peer");
            return;
        };

        let room_id = link.room_id().clone();
        match link.set_local_answer(description.clone()) {
            Ok(()) => {
                self.emit(PeerEvent::SendSignal(ClientEvent::WebrtcAnswer {
                    description,
                    target_user_id: remote_user.clone(),
                    room_id,
                }));
            }
            Err(e) => {
                debug!(remote = %remote_user.short(), error = %e, "Dropping local answer");
            }
        }
    }

    /// A locally discovered ICE candidate to forward to the remote.
    pub fn local_candidate(&mut self, remote_user: &UserId, candidate: IceCandidate) {
        let Some(link) = self.links.get(remote_user) else {
            debug!(remote = %remote_user.short(), "Candidate for unknown peer");
            return;
        };
        if link.is_closed() {
            return;
        }

        self.emit(PeerEvent::SendSignal(ClientEvent::WebrtcIceCandidate {
            candidate,
            target_user_id: remote_user.clone(),
            room_id: link.room_id().clone(),
        }));
    }

    /// The media engine reports the connection is up.
    pub fn on_connection_established(&mut self, remote_user: &UserId) {
        if let Some(link) = self.links.get_mut(remote_user) {
            link.mark_connected();
            self.emit(PeerEvent::LinkEstablished {
                remote_user: remote_user.clone(),
            });
        }
    }

    /// The media engine reports the connection failed.
    pub fn on_connection_failed(&mut self, remote_user: &UserId) {
        if let Some(link) = self.links.get_mut(remote_user) {
            link.mark_failed();
        }
    }

    /// Close and drop the link for a departed participant.
    fn remove_link(&mut self, remote_user: &UserId) {
        if let Some(mut link) = self.links.remove(remote_user) {
            link.close();
            self.emit(PeerEvent::LinkClosed {
                remote_user: remote_user.clone(),
            });
        }
    }

    /// Leaving the room tears down every link.
    pub fn leave_room(&mut self) {
        let remotes: Vec<UserId> = self.links.keys().cloned().collect();
        for remote in remotes {
            self.remove_link(&remote);
        }
    }

    pub fn link(&self, remote_user: &UserId) -> Option<&PeerLink> {
        self.links.get(remote_user)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            debug!("Peer event receiver dropped");
        }
    }
}
