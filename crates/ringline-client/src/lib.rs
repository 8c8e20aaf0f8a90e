//! # ringline-client
//!
//! Client-side peer-connection orchestration for Ringline video rooms.
//!
//! For every other participant discovered in a room the orchestrator
//! maintains exactly one [`PeerLink`]: a signaling state machine with
//! deterministic offerer election and ordered buffering of early ICE
//! candidates. The actual media engine (RTCPeerConnection, tracks,
//! encoders) lives in the embedding application; the orchestrator drives
//! it through the [`PeerEvent`] bus and never touches media directly.
//!
//! [`PeerLink`]: link::PeerLink
//! [`PeerEvent`]: events::PeerEvent

pub mod events;
pub mod link;
pub mod orchestrator;

pub use events::PeerEvent;
pub use link::{LinkError, PeerLink, PeerState, SignalingRole, SignalingState};
pub use orchestrator::PeerOrchestrator;
