use std::time::Duration;

/// Protocol version advertised on `/info`.
pub const PROTOCOL_VERSION: &str = "ringline/1.0.0";

/// How long a call rings before the caller side gives up.
pub const RING_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of each connection's outbound event buffer. A full buffer
/// means the consumer is too slow and frames are dropped.
pub const OUTBOUND_BUFFER: usize = 256;
