//! One light: its color, its link and the connect/send/heartbeat steps.
//!
//! All mutable state lives in a [`FixtureState`] behind a mutex. Critical
//! sections are short and never span a transport call: each operation reads
//! or swaps what it needs under the lock, releases it, then talks to the
//! transport.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!      ▲                          │                  │
//!      └────────── failure ───────┘                  │
//!      └──────── disconnect() / heartbeat timeout ───┘
//! ```

use std::sync::Arc;

use neewer_transport::{
    CharacteristicHandle, DeviceId, LinkId, Notification, ServiceHandle, Transport,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::color::{rgb_to_hsv, Hsv};
use crate::command::{
    color_command, HEARTBEAT_COMMAND, NEEWER_SERVICE_UUID, READ_CHARACTERISTIC_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
use crate::config::FixtureConfig;
use crate::error::{FixtureError, Result};
use crate::timing::FixtureTiming;

/// Capacity of the per-fixture notification channel
const NOTIFICATION_QUEUE_SIZE: usize = 16;

/// An established connection: the link and both characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub write: CharacteristicHandle,
    pub read: CharacteristicHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Connecting,
    Connected(Link),
}

/// Connection status as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of one heartbeat step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Not connected; nothing to do
    Idle,
    /// Heartbeat written
    Sent,
    /// The light went quiet for too long and the link was dropped
    TimedOut,
}

#[derive(Debug)]
struct FixtureState {
    color: Hsv,
    dirty: bool,
    last_send: Option<Instant>,
    last_heartbeat_reply: Option<Instant>,
    link: LinkState,
}

impl Default for FixtureState {
    fn default() -> Self {
        Self {
            color: Hsv::default(),
            dirty: true,
            last_send: None,
            last_heartbeat_reply: None,
            link: LinkState::Disconnected,
        }
    }
}

/// Point-in-time copy of a fixture's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSnapshot {
    pub id: DeviceId,
    pub color: Hsv,
    pub dirty: bool,
    pub status: LinkStatus,
    pub last_send: Option<Instant>,
    pub last_heartbeat_reply: Option<Instant>,
}

pub struct Fixture {
    config: FixtureConfig,
    timing: FixtureTiming,
    transport: Arc<dyn Transport>,
    state: Mutex<FixtureState>,
    notification_tx: mpsc::Sender<Notification>,
    notification_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
}

impl Fixture {
    pub fn new(config: FixtureConfig, transport: Arc<dyn Transport>, timing: FixtureTiming) -> Self {
        let (notification_tx, notification_rx) = mpsc::channel(NOTIFICATION_QUEUE_SIZE);
        Self {
            config,
            timing,
            transport,
            state: Mutex::new(FixtureState::default()),
            notification_tx,
            notification_rx: Mutex::new(Some(notification_rx)),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.config.id
    }

    pub fn universe(&self) -> u16 {
        self.config.universe
    }

    pub fn address(&self) -> u16 {
        self.config.address
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn timing(&self) -> &FixtureTiming {
        &self.timing
    }

    /// Take the receiving end of the notification channel.
    ///
    /// Notifications from every link this fixture subscribes to arrive
    /// here; the heartbeat task owns it. Returns `None` after the first call.
    pub fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>> {
        self.notification_rx.lock().take()
    }

    /// Store a new color, marking the fixture dirty if it changed.
    ///
    /// Works in every link state so the color is ready when a link comes up.
    /// Returns whether the stored color changed.
    pub fn apply_color(&self, r: u8, g: u8, b: u8) -> bool {
        let color = rgb_to_hsv(r, g, b);
        let mut state = self.state.lock();
        if state.color == color {
            return false;
        }
        state.color = color;
        state.dirty = true;
        true
    }

    pub fn color(&self) -> Hsv {
        self.state.lock().color
    }

    pub fn link_status(&self) -> LinkStatus {
        match self.state.lock().link {
            LinkState::Disconnected => LinkStatus::Disconnected,
            LinkState::Connecting => LinkStatus::Connecting,
            LinkState::Connected(_) => LinkStatus::Connected,
        }
    }

    /// The current link, if connected
    pub fn link(&self) -> Option<Link> {
        match &self.state.lock().link {
            LinkState::Connected(link) => Some(link.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> FixtureSnapshot {
        let state = self.state.lock();
        FixtureSnapshot {
            id: self.config.id.clone(),
            color: state.color,
            dirty: state.dirty,
            status: match state.link {
                LinkState::Disconnected => LinkStatus::Disconnected,
                LinkState::Connecting => LinkStatus::Connecting,
                LinkState::Connected(_) => LinkStatus::Connected,
            },
            last_send: state.last_send,
            last_heartbeat_reply: state.last_heartbeat_reply,
        }
    }

    /// Move Disconnected -> Connecting; false if any other state.
    fn begin_connect(&self) -> bool {
        let mut state = self.state.lock();
        if state.link != LinkState::Disconnected {
            return false;
        }
        state.link = LinkState::Connecting;
        true
    }

    /// Connect if currently disconnected.
    ///
    /// Returns `Ok(false)` without touching the transport when another
    /// attempt is in progress or a link is already up. On failure any
    /// partially established link is torn down and the fixture returns to
    /// Disconnected, ready for the next attempt. The same holds when the
    /// returned future is dropped part way through.
    pub async fn connect(&self) -> Result<bool> {
        if !self.begin_connect() {
            return Ok(false);
        }
        tracing::info!("Connecting to {}", self.config.id);

        let mut attempt = ConnectAttempt {
            fixture: self,
            partial: None,
            settled: false,
        };
        let outcome = tokio::time::timeout(
            self.timing.connect_timeout,
            self.establish_link(&mut attempt.partial),
        )
        .await;

        let error = match outcome {
            Ok(Ok(link)) => {
                let link_id = link.id;
                {
                    let mut state = self.state.lock();
                    state.link = LinkState::Connected(link);
                    state.last_heartbeat_reply = Some(Instant::now());
                    // A fresh link gets the current color on the next send tick
                    state.dirty = true;
                }
                attempt.settled = true;
                tracing::info!("Connected to {} ({})", self.config.id, link_id);
                return Ok(true);
            }
            Ok(Err(e)) => e,
            Err(_) => FixtureError::ConnectTimeout {
                device: self.config.id.clone(),
                timeout: self.timing.connect_timeout,
            },
        };

        if let Some(link) = attempt.partial.take() {
            if let Err(e) = self.transport.disconnect(link).await {
                tracing::debug!("Cleanup disconnect of {} failed: {}", link, e);
            }
        }
        self.state.lock().link = LinkState::Disconnected;
        attempt.settled = true;
        tracing::warn!("Failed to connect to {}: {}", self.config.id, error);
        Err(error)
    }

    async fn establish_link(&self, partial: &mut Option<LinkId>) -> Result<Link> {
        let link = self.transport.connect(&self.config.id).await?;
        *partial = Some(link);

        let services = self
            .transport
            .discover_services(link, NEEWER_SERVICE_UUID)
            .await?;
        let service = exactly_one(services).map_err(|found| FixtureError::ServiceCount {
            uuid: NEEWER_SERVICE_UUID,
            found,
        })?;

        let write = self
            .discover_characteristic(&service, WRITE_CHARACTERISTIC_UUID)
            .await?;
        let read = self
            .discover_characteristic(&service, READ_CHARACTERISTIC_UUID)
            .await?;

        self.transport
            .subscribe(&read, self.notification_tx.clone())
            .await?;

        Ok(Link {
            id: link,
            write,
            read,
        })
    }

    async fn discover_characteristic(
        &self,
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Result<CharacteristicHandle> {
        let found = self
            .transport
            .discover_characteristics(service, uuid)
            .await?;
        exactly_one(found).map_err(|found| FixtureError::CharacteristicCount { uuid, found })
    }

    /// One send step.
    ///
    /// Writes the color command when connected and either the color is dirty,
    /// nothing was sent yet, or the last send is older than the forced
    /// refresh interval. Returns whether a command was written. A failed
    /// write marks the fixture dirty again.
    pub async fn send_tick(&self, now: Instant) -> Result<bool> {
        let (command, write) = {
            let mut state = self.state.lock();
            let write = match &state.link {
                LinkState::Connected(link) => link.write.clone(),
                _ => return Ok(false),
            };
            let stale = state.last_send.map_or(true, |last| {
                now.saturating_duration_since(last) > self.timing.forced_refresh_interval
            });
            if !state.dirty && !stale {
                return Ok(false);
            }
            state.dirty = false;
            state.last_send = Some(now);
            (color_command(state.color), write)
        };

        match self.transport.write_without_response(&write, &command).await {
            Ok(()) => {
                tracing::debug!("Sent color to {}: {:02X?}", self.config.id, command);
                Ok(true)
            }
            Err(e) => {
                self.state.lock().dirty = true;
                Err(e.into())
            }
        }
    }

    /// One heartbeat step.
    ///
    /// Drops the link when no notification arrived within the heartbeat
    /// interval; otherwise writes the heartbeat command and reads the
    /// response characteristic to keep the transport pumping. Only
    /// notifications count as replies.
    pub async fn heartbeat_tick(&self, now: Instant) -> Result<HeartbeatOutcome> {
        let (link, expired) = {
            let state = self.state.lock();
            let link = match &state.link {
                LinkState::Connected(link) => link.clone(),
                _ => return Ok(HeartbeatOutcome::Idle),
            };
            let expired = state.last_heartbeat_reply.map_or(true, |last| {
                now.saturating_duration_since(last) > self.timing.heartbeat_interval
            });
            (link, expired)
        };

        if expired {
            tracing::info!("Heartbeat timeout for {}", self.config.id);
            self.disconnect("heartbeat timeout").await;
            return Ok(HeartbeatOutcome::TimedOut);
        }

        self.transport
            .write_without_response(&link.write, &HEARTBEAT_COMMAND)
            .await?;
        let _ = self.transport.read(&link.read).await?;
        Ok(HeartbeatOutcome::Sent)
    }

    /// Record a reply from the light.
    ///
    /// Ignored unless it belongs to the current link.
    pub fn record_notification(&self, notification: &Notification, now: Instant) -> bool {
        let mut state = self.state.lock();
        match &state.link {
            LinkState::Connected(link) if link.id == notification.link => {
                state.last_heartbeat_reply = Some(now);
                true
            }
            _ => {
                tracing::trace!(
                    "Ignoring notification from stale {} for {}",
                    notification.link,
                    self.config.id
                );
                false
            }
        }
    }

    /// Drop the current link.
    ///
    /// The link is swapped out under the lock before the transport is told,
    /// so concurrent callers see Disconnected immediately and only one of
    /// them tears the link down. Returns false if there was no link.
    pub async fn disconnect(&self, reason: &str) -> bool {
        let link = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.link, LinkState::Disconnected) {
                LinkState::Connected(link) => link,
                other => {
                    state.link = other;
                    return false;
                }
            }
        };

        if let Err(e) = self.transport.disconnect(link.id).await {
            tracing::warn!("Transport disconnect of {} failed: {}", self.config.id, e);
        }
        tracing::info!("Disconnected from {} ({})", self.config.id, reason);
        true
    }

}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("config", &self.config)
            .field("status", &self.link_status())
            .finish_non_exhaustive()
    }
}

/// Undoes an unfinished connect attempt when its future is dropped.
struct ConnectAttempt<'a> {
    fixture: &'a Fixture,
    partial: Option<LinkId>,
    settled: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        {
            let mut state = self.fixture.state.lock();
            if state.link == LinkState::Connecting {
                state.link = LinkState::Disconnected;
            }
        }
        tracing::debug!("Connect to {} abandoned", self.fixture.config.id);

        let Some(link) = self.partial.take() else {
            return;
        };
        let transport = Arc::clone(&self.fixture.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = transport.disconnect(link).await {
                        tracing::debug!("Cleanup disconnect of {} failed: {}", link, e);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to drop abandoned {}", link),
        }
    }
}

fn exactly_one<T>(mut items: Vec<T>) -> std::result::Result<T, usize> {
    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Err(items.len())
    }
}
