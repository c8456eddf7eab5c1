//! Everything the registry needs from the outside world, passed explicitly.

use std::sync::Arc;
use std::time::Duration;

use neewer_state::{FixtureTiming, ShutdownSignal};
use neewer_transport::Transport;
use sacn_stream::ReceiverConfig;

/// Shared handles and settings for one bridge instance
#[derive(Clone)]
pub struct BridgeContext {
    pub transport: Arc<dyn Transport>,
    pub timing: FixtureTiming,
    pub receiver: ReceiverConfig,
    pub shutdown: ShutdownSignal,
    /// Upper bound on waiting for background tasks during shutdown
    pub task_join_timeout: Duration,
}

impl BridgeContext {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timing: FixtureTiming::default(),
            receiver: ReceiverConfig::default(),
            shutdown: ShutdownSignal::new(),
            task_join_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timing(mut self, timing: FixtureTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_receiver(mut self, receiver: ReceiverConfig) -> Self {
        self.receiver = receiver;
        self
    }

    pub fn with_task_join_timeout(mut self, timeout: Duration) -> Self {
        self.task_join_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("timing", &self.timing)
            .field("receiver", &self.receiver)
            .field("task_join_timeout", &self.task_join_timeout)
            .finish_non_exhaustive()
    }
}
