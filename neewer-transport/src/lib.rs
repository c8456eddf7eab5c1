//! # Neewer Transport
//!
//! The wireless boundary between the bridge and the lights: scanning,
//! connecting, GATT discovery, notifications, reads and unacknowledged writes.
//!
//! - [`Transport`] is the async trait the fixture lifecycle is written
//!   against.
//! - [`spawn_transport_worker`] runs a backend on a dedicated thread with its
//!   own runtime and returns a [`WorkerTransport`] handle whose calls are
//!   bounded by a timeout.
//! - `BleTransport` (feature `ble`) is the btleplug backend.
//! - `MockTransport` (feature `test-support`) is a scriptable in-memory
//!   backend for tests.

pub mod error;
pub mod transport;
pub mod types;
pub mod worker;

#[cfg(feature = "ble")]
pub mod ble;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use error::{Result, TransportError};
pub use transport::Transport;
pub use types::{Advertisement, CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle};
pub use worker::{spawn_transport_worker, WorkerTransport};

#[cfg(feature = "ble")]
pub use ble::BleTransport;
