use thiserror::Error;

/// Handshake authentication failures. These refuse the connection before
/// any server-side state exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential")]
    Missing,

    #[error("Credential expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed credential")]
    Malformed,
}

/// Wire-level failures. A malformed frame is dropped and logged; it never
/// tears down the connection or the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unsupported frame type")]
    Unsupported,
}
