//! Error types for fixture operations.

use std::time::Duration;

use neewer_transport::{DeviceId, TransportError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixtureError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Discovery did not return exactly one matching service
    #[error("Expected exactly one service {uuid}, found {found}")]
    ServiceCount { uuid: Uuid, found: usize },

    /// Discovery did not return exactly one matching characteristic
    #[error("Expected exactly one characteristic {uuid}, found {found}")]
    CharacteristicCount { uuid: Uuid, found: usize },

    /// The whole connect sequence took longer than the connect timeout
    #[error("Connecting to {device} did not complete within {timeout:?}")]
    ConnectTimeout { device: DeviceId, timeout: Duration },
}

/// Convenience type alias for Results using FixtureError.
pub type Result<T> = std::result::Result<T, FixtureError>;
