//! Per-fixture timing knobs

use std::time::Duration;

/// Intervals driving the send and heartbeat tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureTiming {
    /// Period of the send task
    pub send_interval: Duration,
    /// Period of the heartbeat task, and the longest allowed silence from
    /// the light before the link is dropped
    pub heartbeat_interval: Duration,
    /// An unchanged color is re-sent after this long
    pub forced_refresh_interval: Duration,
    /// A single connect attempt is abandoned after this long
    pub connect_timeout: Duration,
}

impl Default for FixtureTiming {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(3),
            forced_refresh_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl FixtureTiming {
    pub fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_forced_refresh_interval(mut self, interval: Duration) -> Self {
        self.forced_refresh_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
