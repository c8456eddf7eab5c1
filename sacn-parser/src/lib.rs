//! # sacn-parser
//!
//! Validation and decoding of inbound sACN (ANSI E1.31 / E1.17) data packets.
//!
//! The crate is deliberately stateless: a datagram is first checked with
//! [`is_data_packet`] and, when it carries DMX data, decoded into a
//! [`DmxDataPacket`]. Anything else on the multicast group (discovery or
//! synchronization packets, stray traffic) is expected and simply ignored by
//! the caller.
//!
//! ## Usage
//!
//! ```rust
//! use sacn_parser::{is_data_packet, DmxDataPacket};
//!
//! fn handle(datagram: &[u8]) {
//!     if !is_data_packet(datagram) {
//!         return;
//!     }
//!     match DmxDataPacket::from_bytes(datagram) {
//!         Ok(packet) => println!("universe {} from {}", packet.universe, packet.source_name),
//!         Err(e) => eprintln!("bad packet: {e}"),
//!     }
//! }
//! # handle(&[]);
//! ```

pub mod error;
pub mod packet;

#[cfg(feature = "test-support")]
pub mod test_support;

pub use error::{ParseError, ParseResult};
pub use packet::{
    is_data_packet, is_valid_universe, DmxDataPacket, ACN_PACKET_IDENTIFIER, MAX_UNIVERSE,
    MIN_PACKET_LEN, VECTOR_DMP_SET_PROPERTY, VECTOR_E131_DATA_PACKET, VECTOR_ROOT_E131_DATA,
};
