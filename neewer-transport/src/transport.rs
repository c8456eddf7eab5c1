//! The transport trait the fixture lifecycle is written against.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Advertisement, CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle};

/// Wireless transport to the lights.
///
/// Implementations must be safe to call from many tasks at once. Delivery
/// into the `sink` channels must never block the transport: a full sink
/// drops the value.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start scanning, delivering every advertisement to `sink`.
    ///
    /// A second call replaces the previous sink.
    async fn start_scan(&self, sink: mpsc::Sender<Advertisement>) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Establish a link to `device`, returning a fresh link id.
    async fn connect(&self, device: &DeviceId) -> Result<LinkId>;

    /// Services on `link` matching `uuid`
    async fn discover_services(&self, link: LinkId, uuid: Uuid) -> Result<Vec<ServiceHandle>>;

    /// Characteristics of `service` matching `uuid`
    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<Vec<CharacteristicHandle>>;

    /// Enable notifications on `characteristic`, delivering them to `sink`
    /// until the link is disconnected.
    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        sink: mpsc::Sender<Notification>,
    ) -> Result<()>;

    async fn write_without_response(
        &self,
        characteristic: &CharacteristicHandle,
        data: &[u8],
    ) -> Result<()>;

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>>;

    /// Tear down `link`. Disconnecting an unknown link is not an error.
    async fn disconnect(&self, link: LinkId) -> Result<()>;
}
