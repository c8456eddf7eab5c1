//! In-memory transport for tests.
//!
//! Records every call, lets tests script connect and discovery failures, and
//! injects advertisements and notifications as if a device had sent them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::transport::Transport;
use crate::types::{Advertisement, CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle};

/// A write observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device: DeviceId,
    pub link: LinkId,
    pub characteristic: Uuid,
    pub data: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    next_link: u64,
    links: HashMap<LinkId, DeviceId>,
    connects: Vec<DeviceId>,
    disconnects: Vec<LinkId>,
    writes: Vec<WriteRecord>,
    reads: usize,
    scan_sink: Option<mpsc::Sender<Advertisement>>,
    notification_sinks: HashMap<LinkId, mpsc::Sender<Notification>>,
    failing_connects: HashSet<DeviceId>,
    service_count: usize,
    characteristic_count: usize,
    fail_writes: bool,
    connect_delay: Option<Duration>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_link: 1,
            links: HashMap::new(),
            connects: Vec::new(),
            disconnects: Vec::new(),
            writes: Vec::new(),
            reads: 0,
            scan_sink: None,
            notification_sinks: HashMap::new(),
            failing_connects: HashSet::new(),
            service_count: 1,
            characteristic_count: 1,
            fail_writes: false,
            connect_delay: None,
        }
    }
}

/// Scriptable [`Transport`]; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect to `device` fail
    pub fn fail_connect(&self, device: &DeviceId) {
        self.state.lock().failing_connects.insert(device.clone());
    }

    pub fn allow_connect(&self, device: &DeviceId) {
        self.state.lock().failing_connects.remove(device);
    }

    /// Number of services returned per discovery (default 1)
    pub fn set_service_count(&self, count: usize) {
        self.state.lock().service_count = count;
    }

    /// Number of characteristics returned per discovery (default 1)
    pub fn set_characteristic_count(&self, count: usize) {
        self.state.lock().characteristic_count = count;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Delay every connect by `delay`
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().connect_delay = delay;
    }

    /// Deliver an advertisement to the current scan sink.
    ///
    /// Returns false when no scan is running or the sink is full.
    pub fn advertise(&self, advertisement: Advertisement) -> bool {
        let sink = self.state.lock().scan_sink.clone();
        sink.is_some_and(|sink| sink.try_send(advertisement).is_ok())
    }

    /// Advertise `device` with no name or signal strength
    pub fn advertise_device(&self, device: &DeviceId) -> bool {
        self.advertise(Advertisement {
            id: device.clone(),
            local_name: None,
            rssi: None,
        })
    }

    /// Push a notification on `link` as if the device had sent it.
    ///
    /// Returns false when nothing is subscribed on the link.
    pub fn notify(&self, link: LinkId, uuid: Uuid, value: &[u8]) -> bool {
        let sink = self.state.lock().notification_sinks.get(&link).cloned();
        sink.is_some_and(|sink| {
            sink.try_send(Notification {
                link,
                uuid,
                value: value.to_vec(),
            })
            .is_ok()
        })
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Payloads written to characteristic `uuid`, in order
    pub fn written_values(&self, uuid: Uuid) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|write| write.characteristic == uuid)
            .map(|write| write.data.clone())
            .collect()
    }

    /// Connect attempts, including failed ones
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects.len()
    }

    /// Links torn down by `disconnect`
    pub fn disconnects(&self) -> Vec<LinkId> {
        self.state.lock().disconnects.clone()
    }

    pub fn active_links(&self) -> Vec<LinkId> {
        self.state.lock().links.keys().copied().collect()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    pub fn is_scanning(&self) -> bool {
        self.state.lock().scan_sink.is_some()
    }

    fn device_for(&self, link: LinkId) -> Result<DeviceId> {
        self.state
            .lock()
            .links
            .get(&link)
            .cloned()
            .ok_or(TransportError::UnknownLink(link))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_scan(&self, sink: mpsc::Sender<Advertisement>) -> Result<()> {
        self.state.lock().scan_sink = Some(sink);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.state.lock().scan_sink = None;
        Ok(())
    }

    async fn connect(&self, device: &DeviceId) -> Result<LinkId> {
        let delay = {
            let mut state = self.state.lock();
            state.connects.push(device.clone());
            if state.failing_connects.contains(device) {
                return Err(TransportError::DeviceNotFound(device.clone()));
            }
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        let link = LinkId::new(state.next_link);
        state.next_link += 1;
        state.links.insert(link, device.clone());
        Ok(link)
    }

    async fn discover_services(&self, link: LinkId, uuid: Uuid) -> Result<Vec<ServiceHandle>> {
        self.device_for(link)?;
        let count = self.state.lock().service_count;
        Ok(vec![ServiceHandle { link, uuid }; count])
    }

    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<Vec<CharacteristicHandle>> {
        self.device_for(service.link)?;
        let count = self.state.lock().characteristic_count;
        let handle = CharacteristicHandle {
            link: service.link,
            service: service.uuid,
            uuid,
        };
        Ok(vec![handle; count])
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        sink: mpsc::Sender<Notification>,
    ) -> Result<()> {
        self.device_for(characteristic.link)?;
        self.state
            .lock()
            .notification_sinks
            .insert(characteristic.link, sink);
        Ok(())
    }

    async fn write_without_response(
        &self,
        characteristic: &CharacteristicHandle,
        data: &[u8],
    ) -> Result<()> {
        let device = self.device_for(characteristic.link)?;
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(TransportError::Backend("scripted write failure".to_string()));
        }
        state.writes.push(WriteRecord {
            device,
            link: characteristic.link,
            characteristic: characteristic.uuid,
            data: data.to_vec(),
        });
        Ok(())
    }

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>> {
        self.device_for(characteristic.link)?;
        self.state.lock().reads += 1;
        Ok(Vec::new())
    }

    async fn disconnect(&self, link: LinkId) -> Result<()> {
        let mut state = self.state.lock();
        if state.links.remove(&link).is_some() {
            state.notification_sinks.remove(&link);
            state.disconnects.push(link);
        }
        Ok(())
    }
}
