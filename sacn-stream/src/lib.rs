//! # sACN Stream
//!
//! Receives sACN (E1.31) traffic on UDP port 5568, joined to the multicast
//! group of each configured universe, and hands decoded DMX data packets to a
//! [`PacketHandler`].
//!
//! Datagrams that are not sACN data packets are counted and dropped; packets
//! that fail structural decoding are logged and dropped. Neither stops the
//! receiver. Only socket failures are fatal.

pub mod config;
pub mod error;
pub mod multicast;
pub mod receiver;
pub mod stats;

pub use config::ReceiverConfig;
pub use error::{ReceiverError, Result};
pub use multicast::{multicast_group, SACN_PORT};
pub use receiver::{MulticastReceiver, PacketHandler};
pub use stats::ReceiverStats;
