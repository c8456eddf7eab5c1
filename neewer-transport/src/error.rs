//! Error types for the transport boundary.

use std::time::Duration;

use uuid::Uuid;

use crate::types::{DeviceId, LinkId};

/// Errors raised by a [`crate::Transport`] implementation or the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A device id string is not a 48-bit device address
    #[error("Invalid device id '{0}': expected six hex octets like AA:BB:CC:DD:EE:FF")]
    InvalidDeviceId(String),

    /// The host has no usable Bluetooth adapter
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// The device has not been seen by the adapter
    #[error("Device {0} not found")]
    DeviceNotFound(DeviceId),

    /// The link was never established or has been disconnected
    #[error("Unknown link {0}")]
    UnknownLink(LinkId),

    /// The characteristic is not present on the link
    #[error("Unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),

    /// Failure reported by the underlying Bluetooth stack
    #[error("Bluetooth error: {0}")]
    Backend(String),

    /// The worker did not answer within the call timeout
    #[error("Transport call timed out after {0:?}")]
    Timeout(Duration),

    /// The transport worker thread has stopped
    #[error("Transport worker unavailable")]
    WorkerUnavailable,
}

#[cfg(feature = "ble")]
impl From<btleplug::Error> for TransportError {
    fn from(error: btleplug::Error) -> Self {
        TransportError::Backend(error.to_string())
    }
}

/// Convenience type alias for Results using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;
