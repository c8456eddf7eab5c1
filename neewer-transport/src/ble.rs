//! Bluetooth LE backend built on btleplug.
//!
//! Must be constructed on the runtime it will be driven from; in the bridge
//! that is the transport worker thread (see [`crate::spawn_transport_worker`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::transport::Transport;
use crate::types::{Advertisement, CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle};

/// btleplug-backed transport using the first adapter on the host
pub struct BleTransport {
    adapter: Adapter,
    links: Mutex<HashMap<LinkId, Peripheral>>,
    notification_tasks: Mutex<HashMap<LinkId, Vec<JoinHandle<()>>>>,
    scan_task: Mutex<Option<JoinHandle<()>>>,
    next_link: AtomicU64,
}

impl BleTransport {
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(info) => tracing::info!("Using Bluetooth adapter {}", info),
            Err(e) => tracing::debug!("Could not read adapter info: {}", e),
        }

        Ok(Self {
            adapter,
            links: Mutex::new(HashMap::new()),
            notification_tasks: Mutex::new(HashMap::new()),
            scan_task: Mutex::new(None),
            next_link: AtomicU64::new(1),
        })
    }

    async fn find_peripheral(&self, device: &DeviceId) -> Result<Peripheral> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| DeviceId::from_octets(peripheral.address().into_inner()) == *device)
            .ok_or_else(|| TransportError::DeviceNotFound(device.clone()))
    }

    fn peripheral(&self, link: LinkId) -> Result<Peripheral> {
        self.links
            .lock()
            .get(&link)
            .cloned()
            .ok_or(TransportError::UnknownLink(link))
    }

    fn characteristic(peripheral: &Peripheral, handle: &CharacteristicHandle) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == handle.uuid && c.service_uuid == handle.service)
            .ok_or(TransportError::UnknownCharacteristic(handle.uuid))
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn start_scan(&self, sink: mpsc::Sender<Advertisement>) -> Result<()> {
        let mut events = self.adapter.events().await?;
        let adapter = self.adapter.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                let advertisement = Advertisement {
                    id: DeviceId::from_octets(peripheral.address().into_inner()),
                    local_name: properties.as_ref().and_then(|p| p.local_name.clone()),
                    rssi: properties.and_then(|p| p.rssi),
                };

                match sink.try_send(advertisement) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) => {
                        tracing::trace!("Advertisement sink full, dropping {}", dropped.id);
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            tracing::debug!("Advertisement forwarding stopped");
        });

        if let Some(previous) = self.scan_task.lock().replace(task) {
            previous.abort();
        }

        self.adapter.start_scan(ScanFilter::default()).await?;
        tracing::debug!("Bluetooth scan started");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        if let Some(task) = self.scan_task.lock().take() {
            task.abort();
        }
        self.adapter.stop_scan().await?;
        tracing::debug!("Bluetooth scan stopped");
        Ok(())
    }

    async fn connect(&self, device: &DeviceId) -> Result<LinkId> {
        let peripheral = self.find_peripheral(device).await?;
        peripheral.connect().await?;

        let link = LinkId::new(self.next_link.fetch_add(1, Ordering::Relaxed));
        self.links.lock().insert(link, peripheral);
        tracing::debug!("Connected to {} as {}", device, link);
        Ok(link)
    }

    async fn discover_services(&self, link: LinkId, uuid: Uuid) -> Result<Vec<ServiceHandle>> {
        let peripheral = self.peripheral(link)?;
        peripheral.discover_services().await?;

        Ok(peripheral
            .services()
            .into_iter()
            .filter(|service| service.uuid == uuid)
            .map(|service| ServiceHandle {
                link,
                uuid: service.uuid,
            })
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<Vec<CharacteristicHandle>> {
        let peripheral = self.peripheral(service.link)?;

        Ok(peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service.uuid)
            .flat_map(|s| s.characteristics.into_iter())
            .filter(|c| c.uuid == uuid)
            .map(|c| CharacteristicHandle {
                link: service.link,
                service: c.service_uuid,
                uuid: c.uuid,
            })
            .collect())
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        sink: mpsc::Sender<Notification>,
    ) -> Result<()> {
        let peripheral = self.peripheral(characteristic.link)?;
        let target = Self::characteristic(&peripheral, characteristic)?;
        peripheral.subscribe(&target).await?;

        let mut notifications = peripheral.notifications().await?;
        let link = characteristic.link;
        let uuid = characteristic.uuid;

        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != uuid {
                    continue;
                }
                let notification = Notification {
                    link,
                    uuid,
                    value: notification.value,
                };
                if let Err(TrySendError::Closed(_)) = sink.try_send(notification) {
                    break;
                }
            }
        });

        self.notification_tasks
            .lock()
            .entry(link)
            .or_default()
            .push(task);
        Ok(())
    }

    async fn write_without_response(
        &self,
        characteristic: &CharacteristicHandle,
        data: &[u8],
    ) -> Result<()> {
        let peripheral = self.peripheral(characteristic.link)?;
        let target = Self::characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&target, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>> {
        let peripheral = self.peripheral(characteristic.link)?;
        let target = Self::characteristic(&peripheral, characteristic)?;
        Ok(peripheral.read(&target).await?)
    }

    async fn disconnect(&self, link: LinkId) -> Result<()> {
        let tasks = self.notification_tasks.lock().remove(&link);
        for task in tasks.into_iter().flatten() {
            task.abort();
        }

        let peripheral = self.links.lock().remove(&link);
        if let Some(peripheral) = peripheral {
            peripheral.disconnect().await?;
            tracing::debug!("Disconnected {}", link);
        }
        Ok(())
    }
}
