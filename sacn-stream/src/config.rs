//! Receiver configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::multicast::SACN_PORT;

/// Configuration for [`crate::MulticastReceiver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// UDP port to bind; 0 picks an ephemeral port (tests)
    pub port: u16,
    /// Interface used when joining multicast groups
    pub interface: Ipv4Addr,
    /// Receive buffer size; larger datagrams are truncated
    pub buffer_size: usize,
    /// Window used for the packets-per-second counter
    pub stats_interval: Duration,
    /// How long `shutdown` waits for the receive loop to stop
    pub shutdown_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: SACN_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            buffer_size: 1500,
            stats_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ReceiverConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }
}
