//! Error types for the bridge.

use std::io;
use std::path::PathBuf;

use neewer_transport::{DeviceId, TransportError};
use sacn_stream::ReceiverError;

/// Problems with the light configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A light entry failed validation; `index` is its position in `lights`
    #[error("Light #{index}: {message}")]
    InvalidLight { index: usize, message: String },

    #[error("Light #{index}: id {id} is already used by light #{first}")]
    DuplicateId {
        index: usize,
        first: usize,
        id: DeviceId,
    },
}

/// Errors raised while running the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sACN receiver error: {0}")]
    Receiver(#[from] ReceiverError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Light {0} is configured more than once")]
    DuplicateFixture(DeviceId),

    #[error("Bridge already started")]
    AlreadyStarted,
}

/// Convenience type alias for Results using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
