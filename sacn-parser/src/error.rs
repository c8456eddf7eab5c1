//! Error types for packet decoding

use thiserror::Error;

/// Errors that can occur while decoding a data packet.
///
/// These are structural errors only. Protocol markers are checked separately
/// by [`crate::is_data_packet`] and a packet failing that check is not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is shorter than a complete root layer
    #[error("Packet too short: {len} bytes (need at least {min})")]
    PacketTooShort { len: usize, min: usize },

    /// A fixed-position field lies beyond the end of the buffer
    #[error("Packet truncated: {field} at offset {offset} exceeds {len} byte buffer")]
    Truncated {
        field: &'static str,
        offset: usize,
        len: usize,
    },

    /// The declared payload length runs past the end of the buffer
    #[error("Payload overrun: declared {declared} bytes but only {available} available")]
    PayloadOverrun { declared: usize, available: usize },
}

/// Result type alias for decoding operations
pub type ParseResult<T> = Result<T, ParseError>;
