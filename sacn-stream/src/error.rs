//! Error types for the sacn-stream crate.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Errors raised by the multicast receiver.
///
/// All of these are fatal for the receive subsystem. Malformed or foreign
/// datagrams are not errors; they are counted in [`crate::ReceiverStats`].
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Socket creation, option or bind failure
    #[error("Failed to bind sACN socket on {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    /// Joining a universe's multicast group failed
    #[error("Failed to join multicast group {group} for universe {universe}: {source}")]
    JoinGroup {
        universe: u16,
        group: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// Leaving a universe's multicast group failed during shutdown
    #[error("Failed to leave multicast group {group} for universe {universe}: {source}")]
    LeaveGroup {
        universe: u16,
        group: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// The socket returned an unrecoverable read error
    #[error("Receive failed: {0}")]
    Receive(#[source] io::Error),

    /// `start` was called on a receiver that is already running
    #[error("Receiver already started")]
    AlreadyStarted,

    /// The receive loop did not stop cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Convenience type alias for Results using ReceiverError.
pub type Result<T> = std::result::Result<T, ReceiverError>;
