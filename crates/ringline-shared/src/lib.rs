//! # ringline-shared
//!
//! Wire protocol, domain identifiers and auth tokens shared between the
//! Ringline signaling server and client crates.
//!
//! This crate is deliberately free of async code and I/O so that both the
//! server and embedded clients can depend on it without dragging in a
//! runtime.

pub mod auth;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{AuthError, ProtocolError};
