//! Background tasks driving each fixture, and the shared shutdown signal.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::fixture::{Fixture, HeartbeatOutcome};

/// Cancellation shared by every background loop.
///
/// Loops hold a receiver from [`subscribe`](Self::subscribe) and stop once
/// [`trigger`](Self::trigger) is called or the signal is dropped.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once shutdown is signalled or every sender is gone
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

/// Spawn the loop that pushes the fixture's color to the light.
pub fn spawn_send_task(fixture: Arc<Fixture>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(fixture.timing().send_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut shutdown) => break,

                _ = ticker.tick() => {
                    if let Err(e) = fixture.send_tick(Instant::now()).await {
                        tracing::warn!("Failed to send color to {}: {}", fixture.id(), e);
                    }
                }
            }
        }

        tracing::debug!("Send task for {} stopped", fixture.id());
    })
}

/// Spawn the loop that keeps the link alive and records the light's replies.
///
/// Owns the fixture's notification channel; a fixture can only have one
/// heartbeat task.
pub fn spawn_heartbeat_task(
    fixture: Arc<Fixture>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(mut notifications) = fixture.take_notifications() else {
            tracing::warn!("Heartbeat task for {} already running", fixture.id());
            return;
        };

        let interval = fixture.timing().heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut shutdown) => break,

                Some(notification) = notifications.recv() => {
                    fixture.record_notification(&notification, Instant::now());
                }

                _ = ticker.tick() => {
                    match fixture.heartbeat_tick(Instant::now()).await {
                        Ok(HeartbeatOutcome::Sent) => {
                            tracing::trace!("Heartbeat sent to {}", fixture.id());
                        }
                        Ok(HeartbeatOutcome::TimedOut) | Ok(HeartbeatOutcome::Idle) => {}
                        Err(e) => tracing::warn!("Heartbeat to {} failed: {}", fixture.id(), e),
                    }
                }
            }
        }

        tracing::debug!("Heartbeat task for {} stopped", fixture.id());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_wakes_subscribers() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        assert!(!signal.is_triggered());

        let waiter = tokio::spawn(async move { cancelled(&mut rx).await });
        signal.trigger();
        waiter.await.unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_subscribing_after_trigger_resolves_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let mut rx = signal.subscribe();
        cancelled(&mut rx).await;
    }
}
