//! The bridge itself: fixtures indexed by light and universe, the tasks that
//! drive them, and the sACN receiver feeding them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use neewer_state::{
    cancelled, spawn_heartbeat_task, spawn_send_task, Fixture, FixtureConfig, LinkStatus,
};
use neewer_transport::{Advertisement, DeviceId};
use sacn_parser::DmxDataPacket;
use sacn_stream::{MulticastReceiver, PacketHandler, ReceiverStats};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};

/// Advertisements buffered between the transport and the discovery task
const ADVERTISEMENT_QUEUE_SIZE: usize = 64;

/// What one packet did to the fixtures of its universe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Fixtures whose three channels were present in the packet
    pub applied: usize,
    /// Of those, fixtures whose color actually changed
    pub changed: usize,
    /// Fixtures whose channels lay past the end of the payload
    pub out_of_range: usize,
}

/// Fixture lookup tables shared with the receive loop and discovery task
struct FixtureSet {
    by_id: HashMap<DeviceId, Arc<Fixture>>,
    by_universe: HashMap<u16, Vec<Arc<Fixture>>>,
}

impl FixtureSet {
    fn dispatch(&self, packet: &DmxDataPacket) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let Some(fixtures) = self.by_universe.get(&packet.universe) else {
            return outcome;
        };

        for fixture in fixtures {
            match packet.rgb_at(fixture.address()) {
                Some((r, g, b)) => {
                    outcome.applied += 1;
                    if fixture.apply_color(r, g, b) {
                        outcome.changed += 1;
                    }
                }
                None => {
                    outcome.out_of_range += 1;
                    tracing::debug!(
                        "Universe {} packet from {} has {} channels, too short for {} at address {}",
                        packet.universe,
                        packet.source_name,
                        packet.channels().len(),
                        fixture.id(),
                        fixture.address()
                    );
                }
            }
        }

        outcome
    }
}

impl PacketHandler for FixtureSet {
    fn handle_packet(&self, packet: DmxDataPacket) {
        self.dispatch(&packet);
    }
}

/// All configured lights and the machinery that keeps them in sync with
/// incoming sACN data.
///
/// Lifecycle: [`bind`](Self::bind) builds the fixtures, [`start`](Self::start)
/// joins the universes and spawns the per-light tasks, and
/// [`shutdown`](Self::shutdown) stops everything and drops every link.
/// [`run_until`](Self::run_until) wraps all three.
pub struct FixtureRegistry {
    fixtures: Arc<FixtureSet>,
    context: BridgeContext,
    receiver: Option<MulticastReceiver>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl FixtureRegistry {
    /// Create one fixture per configuration entry.
    ///
    /// Entries are expected to be validated already; a repeated light id is
    /// still rejected here.
    pub fn bind(configs: Vec<FixtureConfig>, context: BridgeContext) -> Result<Self> {
        let mut by_id: HashMap<DeviceId, Arc<Fixture>> = HashMap::with_capacity(configs.len());
        let mut by_universe: HashMap<u16, Vec<Arc<Fixture>>> = HashMap::new();

        for config in configs {
            if by_id.contains_key(&config.id) {
                return Err(BridgeError::DuplicateFixture(config.id));
            }
            let fixture = Arc::new(Fixture::new(
                config,
                Arc::clone(&context.transport),
                context.timing,
            ));
            by_universe
                .entry(fixture.universe())
                .or_default()
                .push(Arc::clone(&fixture));
            by_id.insert(fixture.id().clone(), fixture);
        }

        Ok(Self {
            fixtures: Arc::new(FixtureSet { by_id, by_universe }),
            context,
            receiver: None,
            tasks: Vec::new(),
            started: false,
        })
    }

    pub fn fixture(&self, id: &DeviceId) -> Option<Arc<Fixture>> {
        self.fixtures.by_id.get(id).cloned()
    }

    pub fn fixtures(&self) -> impl Iterator<Item = &Arc<Fixture>> {
        self.fixtures.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.fixtures.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.by_id.is_empty()
    }

    /// Sorted universes that have at least one fixture
    pub fn universes(&self) -> Vec<u16> {
        let mut universes: Vec<u16> = self.fixtures.by_universe.keys().copied().collect();
        universes.sort_unstable();
        universes
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Receive statistics, once started
    pub fn receiver_stats(&self) -> Option<Arc<ReceiverStats>> {
        self.receiver.as_ref().map(MulticastReceiver::stats)
    }

    /// Apply a packet to every fixture on its universe.
    ///
    /// Colors are recorded whether or not a light is connected; a light that
    /// connects later picks up the latest color.
    pub fn dispatch(&self, packet: &DmxDataPacket) -> DispatchOutcome {
        self.fixtures.dispatch(packet)
    }

    /// Join every configured universe and start the bridge.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(BridgeError::AlreadyStarted);
        }
        let receiver =
            MulticastReceiver::bind(&self.universes(), self.context.receiver.clone()).await?;
        self.start_with_receiver(receiver).await
    }

    /// Start the bridge on an already bound receiver.
    ///
    /// Spawns the send and heartbeat tasks of every fixture plus the
    /// discovery task, starts scanning, and hands `receiver` the fixtures as
    /// its packet handler. After a failure, call [`shutdown`](Self::shutdown)
    /// to release whatever did start.
    pub async fn start_with_receiver(&mut self, mut receiver: MulticastReceiver) -> Result<()> {
        if self.started {
            return Err(BridgeError::AlreadyStarted);
        }
        self.started = true;

        receiver.start(Arc::clone(&self.fixtures) as Arc<dyn PacketHandler>)?;
        tracing::info!(
            "Receiving sACN on {} for universes {:?}",
            receiver.local_addr(),
            receiver.universes()
        );
        self.receiver = Some(receiver);

        for fixture in self.fixtures.by_id.values() {
            self.tasks.push(spawn_send_task(
                Arc::clone(fixture),
                self.context.shutdown.subscribe(),
            ));
            self.tasks.push(spawn_heartbeat_task(
                Arc::clone(fixture),
                self.context.shutdown.subscribe(),
            ));
        }

        let (advertisement_tx, advertisement_rx) = mpsc::channel(ADVERTISEMENT_QUEUE_SIZE);
        self.tasks.push(spawn_discovery_task(
            Arc::clone(&self.fixtures),
            advertisement_rx,
            self.context.shutdown.subscribe(),
        ));
        self.context.transport.start_scan(advertisement_tx).await?;

        tracing::info!("Bridge started with {} light(s)", self.len());
        Ok(())
    }

    /// Start, run until `shutdown` resolves or the receiver fails, then shut
    /// down.
    ///
    /// A receiver failure is returned after shutdown completes; otherwise the
    /// shutdown result is.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            tracing::error!("Failed to start bridge: {}", e);
            if let Err(cleanup) = self.shutdown().await {
                tracing::warn!("Cleanup after failed start also failed: {}", cleanup);
            }
            return Err(e);
        }

        let fatal = tokio::select! {
            _ = shutdown => None,
            result = receiver_closed(self.receiver.as_mut()) => match result {
                Ok(()) => None,
                Err(e) => {
                    tracing::error!("sACN receiver stopped: {}", e);
                    Some(e)
                }
            },
        };

        let outcome = self.shutdown().await;
        match fatal {
            Some(e) => Err(e.into()),
            None => outcome,
        }
    }

    /// Stop every task, drop every link and leave the multicast groups.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down bridge");
        self.context.shutdown.trigger();

        if let Err(e) = self.context.transport.stop_scan().await {
            tracing::warn!("Failed to stop scanning: {}", e);
        }

        let deadline = Instant::now() + self.context.task_join_timeout;
        for mut task in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => tracing::warn!("Fixture task panicked: {}", e),
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!("Fixture task did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        for fixture in self.fixtures.by_id.values() {
            fixture.disconnect("bridge shutting down").await;
        }

        let outcome = match self.receiver.take() {
            Some(mut receiver) => receiver.shutdown().await.map_err(BridgeError::from),
            None => Ok(()),
        };

        tracing::info!("Bridge stopped");
        outcome
    }
}

async fn receiver_closed(receiver: Option<&mut MulticastReceiver>) -> sacn_stream::Result<()> {
    match receiver {
        Some(receiver) => receiver.closed().await,
        None => std::future::pending().await,
    }
}

/// Connect to configured lights as their advertisements arrive.
///
/// A light is only connected while it is disconnected, so repeated
/// advertisements during a connect attempt are ignored.
fn spawn_discovery_task(
    fixtures: Arc<FixtureSet>,
    mut advertisements: mpsc::Receiver<Advertisement>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut connects = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                Some(_) = connects.join_next(), if !connects.is_empty() => {}
                advertisement = advertisements.recv() => {
                    let Some(advertisement) = advertisement else {
                        tracing::debug!("Advertisement stream closed");
                        break;
                    };
                    let Some(fixture) = fixtures.by_id.get(&advertisement.id) else {
                        continue;
                    };
                    if fixture.link_status() != LinkStatus::Disconnected {
                        continue;
                    }

                    tracing::debug!(
                        "Saw {} (rssi {:?}), connecting",
                        advertisement.id,
                        advertisement.rssi
                    );
                    let fixture = Arc::clone(fixture);
                    connects.spawn(async move {
                        // Failures are logged by the fixture; the next
                        // advertisement retries.
                        let _ = fixture.connect().await;
                    });
                }
            }
        }

        // Aborted attempts put their fixtures back to Disconnected
        connects.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use neewer_state::{color_command, Hsv};
    use neewer_transport::mock::MockTransport;
    use neewer_transport::LinkId;
    use std::time::Duration;
    use sacn_parser::test_support::PacketBuilder;

    fn id(last: u8) -> DeviceId {
        DeviceId::from_octets([0xC4, 0x7C, 0x8D, 0x00, 0x00, last])
    }

    fn registry(configs: Vec<FixtureConfig>) -> (MockTransport, FixtureRegistry) {
        let mock = MockTransport::new();
        let registry =
            FixtureRegistry::bind(configs, BridgeContext::new(Arc::new(mock.clone()))).unwrap();
        (mock, registry)
    }

    fn packet(universe: u16, address: u16, values: &[u8]) -> DmxDataPacket {
        DmxDataPacket::from_bytes(
            &PacketBuilder::new()
                .universe(universe)
                .channels_at(address, values)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_fixture_rejected() {
        let mock = MockTransport::new();
        let result = FixtureRegistry::bind(
            vec![FixtureConfig::new(id(1), 1, 1), FixtureConfig::new(id(1), 2, 1)],
            BridgeContext::new(Arc::new(mock)),
        );
        assert!(matches!(result, Err(BridgeError::DuplicateFixture(_))));
    }

    #[test]
    fn test_universes_are_distinct_and_sorted() {
        let (_mock, registry) = registry(vec![
            FixtureConfig::new(id(1), 7, 1),
            FixtureConfig::new(id(2), 3, 1),
            FixtureConfig::new(id(3), 7, 4),
        ]);
        assert_eq!(registry.universes(), vec![3, 7]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_dispatch_applies_to_matching_universe_only() {
        let (_mock, registry) = registry(vec![
            FixtureConfig::new(id(1), 1, 1),
            FixtureConfig::new(id(2), 1, 4),
            FixtureConfig::new(id(3), 2, 1),
        ]);

        let outcome = registry.dispatch(&packet(1, 1, &[255, 0, 0, 0, 0, 255]));
        assert_eq!(
            outcome,
            DispatchOutcome {
                applied: 2,
                changed: 2,
                out_of_range: 0
            }
        );

        assert_eq!(registry.fixture(&id(1)).unwrap().color(), Hsv::new(0, 100, 100));
        assert_eq!(registry.fixture(&id(2)).unwrap().color(), Hsv::new(240, 100, 100));
        assert_eq!(registry.fixture(&id(3)).unwrap().color(), Hsv::default());
    }

    #[test]
    fn test_dispatch_to_unknown_universe_is_a_no_op() {
        let (_mock, registry) = registry(vec![FixtureConfig::new(id(1), 1, 1)]);
        assert_eq!(
            registry.dispatch(&packet(9, 1, &[255, 255, 255])),
            DispatchOutcome::default()
        );
    }

    #[test]
    fn test_short_packet_counts_out_of_range() {
        let (_mock, registry) = registry(vec![
            FixtureConfig::new(id(1), 1, 1),
            FixtureConfig::new(id(2), 1, 10),
        ]);

        // Start code plus 11 channels: address 10 needs channel 12
        let bytes = PacketBuilder::new()
            .universe(1)
            .payload(vec![0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0])
            .build();
        let outcome = registry.dispatch(&DmxDataPacket::from_bytes(&bytes).unwrap());

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.out_of_range, 1);
        assert_eq!(registry.fixture(&id(2)).unwrap().color(), Hsv::default());
    }

    #[test]
    fn test_repeated_packet_changes_nothing() {
        let (_mock, registry) = registry(vec![FixtureConfig::new(id(1), 1, 1)]);
        registry.dispatch(&packet(1, 1, &[10, 20, 30]));
        let outcome = registry.dispatch(&packet(1, 1, &[10, 20, 30]));
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.changed, 0);
    }

    #[tokio::test]
    async fn test_discovery_connects_configured_light_once() {
        let (mock, mut registry) = registry(vec![FixtureConfig::new(id(1), 1, 1)]);
        let receiver =
            MulticastReceiver::bind(&[], sacn_stream::ReceiverConfig::default().with_port(0))
                .await
                .unwrap();
        registry.start_with_receiver(receiver).await.unwrap();
        assert!(mock.is_scanning());

        assert!(mock.advertise_device(&id(9)));
        assert!(mock.advertise_device(&id(1)));
        let fixture = registry.fixture(&id(1)).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while fixture.link_status() != LinkStatus::Connected {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(mock.advertise_device(&id(1)));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(mock.connect_count(), 1);

        registry.shutdown().await.unwrap();
        assert!(!mock.is_scanning());
        assert_eq!(fixture.link_status(), LinkStatus::Disconnected);
        assert!(mock.active_links().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_light_reconnects_on_next_advertisement() {
        let (mock, mut registry) = registry(vec![FixtureConfig::new(id(1), 1, 1)]);
        let receiver =
            MulticastReceiver::bind(&[], sacn_stream::ReceiverConfig::default().with_port(0))
                .await
                .unwrap();
        registry.start_with_receiver(receiver).await.unwrap();
        let fixture = registry.fixture(&id(1)).unwrap();

        registry.dispatch(&packet(1, 1, &[0, 255, 0]));
        assert!(mock.advertise_device(&id(1)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        let first = fixture.link().unwrap().id;
        assert_eq!(first, LinkId::new(1));

        // No notifications: the heartbeat tick at 6s finds the light silent
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fixture.link_status(), LinkStatus::Disconnected);
        assert_eq!(mock.disconnects(), vec![first]);

        assert!(mock.advertise_device(&id(1)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = fixture.link().unwrap().id;
        assert_eq!(second, LinkId::new(2));

        let resent: Vec<Vec<u8>> = mock
            .writes()
            .into_iter()
            .filter(|write| write.link == second && write.data.get(1) == Some(&0x86))
            .map(|write| write.data)
            .collect();
        assert_eq!(resent, vec![color_command(Hsv::new(120, 100, 100)).to_vec()]);

        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (_mock, mut registry) = registry(vec![]);
        let receiver =
            MulticastReceiver::bind(&[], sacn_stream::ReceiverConfig::default().with_port(0))
                .await
                .unwrap();
        registry.start_with_receiver(receiver).await.unwrap();
        assert!(matches!(
            registry.start().await,
            Err(BridgeError::AlreadyStarted)
        ));
        registry.shutdown().await.unwrap();
    }
}
