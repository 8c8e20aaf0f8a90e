use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{
    CallMode, CallType, ChatId, IceCandidate, MediaPreference, ParticipantInfo, RoomId,
    SessionDescription, UserId,
};

/// Profile data a client announces about itself when joining a room or
/// ringing someone. The server never looks it up; it is echoed to peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// Events a client sends to the server over its WebSocket.
///
/// Frames are JSON text messages, internally tagged so browser peers can
/// dispatch on `"type"` without a codec shim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join a video-call room, announcing profile data for the ring screen.
    JoinVideoRoom { room_id: RoomId, profile: Profile },

    /// Leave a video-call room. Carries the call summary when the leaver
    /// is the one hanging up a live call.
    LeaveVideoRoom {
        room_id: RoomId,
        chat_id: Option<ChatId>,
        duration_secs: Option<u64>,
        call_type: Option<CallType>,
    },

    /// Forward an SDP offer to one user. Opaque to the relay.
    WebrtcOffer {
        description: SessionDescription,
        target_user_id: UserId,
        room_id: RoomId,
    },

    /// Forward an SDP answer to one user. Opaque to the relay.
    WebrtcAnswer {
        description: SessionDescription,
        target_user_id: UserId,
        room_id: RoomId,
    },

    /// Forward an ICE candidate to one user. Opaque to the relay.
    WebrtcIceCandidate {
        candidate: IceCandidate,
        target_user_id: UserId,
        room_id: RoomId,
    },

    /// Ring one or more users. A single recipient is a private call,
    /// several are a group call rung independently.
    IncomingCall {
        recipients: Vec<UserId>,
        room_id: RoomId,
        chat_id: ChatId,
        call_type: CallType,
        profile: Profile,
    },

    /// Caller gives up before anyone picked up.
    CancelCall { room_id: RoomId, chat_id: ChatId },

    /// Recipient refuses a ringing call.
    CallDecline {
        room_id: RoomId,
        chat_id: ChatId,
        target_user_id: UserId,
    },

    /// Either side hangs up a live call.
    CallEnded {
        room_id: RoomId,
        chat_id: ChatId,
        target_user_id: UserId,
        duration_secs: u64,
    },

    /// Mute/unmute or camera toggle, broadcast to the room.
    UpdateMediaPreference {
        room_id: RoomId,
        preference: MediaPreference,
    },

    /// Relay a chat message to one user. Content is opaque.
    ChatMessage {
        chat_id: ChatId,
        target_user_id: UserId,
        message_id: Uuid,
        body: serde_json::Value,
    },

    /// Subscribe this connection to a chat channel.
    JoinChat { chat_id: ChatId },

    /// Unsubscribe this connection from a chat channel.
    LeaveChat { chat_id: ChatId },

    /// Block a user. Takes effect for the next relayed action.
    BlockUser { target_user_id: UserId },

    /// Lift a block.
    UnblockUser { target_user_id: UserId },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Late-join snapshot: everyone already in the room, sent to the joiner.
    RoomParticipants {
        room_id: RoomId,
        participants: Vec<ParticipantInfo>,
    },

    ParticipantJoined {
        room_id: RoomId,
        participant: ParticipantInfo,
    },

    ParticipantLeft { room_id: RoomId, user_id: UserId },

    WebrtcOffer {
        from_user_id: UserId,
        room_id: RoomId,
        description: SessionDescription,
    },

    WebrtcAnswer {
        from_user_id: UserId,
        room_id: RoomId,
        description: SessionDescription,
    },

    WebrtcIceCandidate {
        from_user_id: UserId,
        room_id: RoomId,
        candidate: IceCandidate,
    },

    IncomingCall {
        from_user_id: UserId,
        caller: Profile,
        room_id: RoomId,
        chat_id: ChatId,
        call_type: CallType,
        mode: CallMode,
    },

    /// Sent on caller cancel and on ring timeout alike.
    CallCancelled { room_id: RoomId, chat_id: ChatId },

    CallDeclined {
        room_id: RoomId,
        chat_id: ChatId,
        by_user_id: UserId,
    },

    CallEnded {
        room_id: RoomId,
        chat_id: ChatId,
        duration_secs: u64,
    },

    PresenceChanged {
        user_id: UserId,
        online: bool,
        last_active_at: DateTime<Utc>,
    },

    MediaPreferenceChanged {
        room_id: RoomId,
        user_id: UserId,
        preference: MediaPreference,
    },

    ChatMessage {
        chat_id: ChatId,
        from_user_id: UserId,
        message_id: Uuid,
        body: serde_json::Value,
        sent_at: DateTime<Utc>,
    },

    /// Nudge both parties to refresh their conversation list after a
    /// missed or declined call landed in the log.
    SidebarRefresh { chat_id: ChatId },

    /// The requested action was rejected by the block gate or a
    /// membership check.
    AccessDenied { reason: String },

    Error { message: String },
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SdpType, SessionDescription};

    #[test]
    fn test_client_event_roundtrip() {
        let event = ClientEvent::WebrtcOffer {
            description: SessionDescription {
                kind: SdpType::Offer,
                sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1".to_string(),
            },
            target_user_id: UserId::new("u-bob"),
            room_id: RoomId::new("r1"),
        };

        let json = event.to_json().unwrap();
        let restored = ClientEvent::from_json(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_names_are_kebab_case() {
        let event = ClientEvent::JoinVideoRoom {
            room_id: RoomId::new("r1"),
            profile: Profile {
                display_name: "Alice".to_string(),
                photo_url: None,
            },
        };

        let json = event.to_json().unwrap();
        assert!(json.contains(r#""type":"join-video-room""#));
    }

    #[test]
    fn test_ice_candidate_payload_is_verbatim() {
        let json = r#"{
            "type": "webrtc-ice-candidate",
            "candidate": {
                "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 54400 typ host",
                "sdp_mid": "0",
                "sdp_m_line_index": 0
            },
            "target_user_id": "u-bob",
            "room_id": "r1"
        }"#;

        let event = ClientEvent::from_json(json).unwrap();
        match event {
            ClientEvent::WebrtcIceCandidate { candidate, .. } => {
                assert!(candidate.candidate.starts_with("candidate:1"));
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
            }
            other => panic!("Unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(ClientEvent::from_json("{\"type\":\"no-such-event\"}").is_err());
        assert!(ClientEvent::from_json("not json at all").is_err());
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::IncomingCall {
            from_user_id: UserId::new("u-alice"),
            caller: Profile {
                display_name: "Alice".to_string(),
                photo_url: Some("https://example.com/a.png".to_string()),
            },
            room_id: RoomId::new("r1"),
            chat_id: ChatId("c1".to_string()),
            call_type: CallType::Video,
            mode: CallMode::Private,
        };

        let json = event.to_json().unwrap();
        assert!(json.contains(r#""type":"incoming-call""#));
        assert_eq!(ServerEvent::from_json(&json).unwrap(), event);
    }
}
