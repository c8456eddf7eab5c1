//! Datagram builder for tests.
//!
//! Produces a complete E1.31 data packet with the same layout a console sends,
//! so receiver and bridge tests can exercise the real decoding path.

use crate::packet::{
    offset, ACN_PACKET_IDENTIFIER, VECTOR_DMP_SET_PROPERTY, VECTOR_E131_DATA_PACKET,
    VECTOR_ROOT_E131_DATA,
};

const FLAGS: u16 = 0x7000;

/// Builder for sACN data packets
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    source_name: String,
    universe: u16,
    priority: u8,
    sequence_number: u8,
    options: u8,
    cid: [u8; 16],
    payload: Vec<u8>,
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self {
            source_name: "test console".to_string(),
            universe: 1,
            priority: 100,
            sequence_number: 0,
            options: 0,
            cid: [0; 16],
            // Start code plus a full universe
            payload: vec![0; 513],
        }
    }
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    pub fn universe(mut self, universe: u16) -> Self {
        self.universe = universe;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn sequence_number(mut self, sequence_number: u8) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn options(mut self, options: u8) -> Self {
        self.options = options;
        self
    }

    pub fn cid(mut self, cid: [u8; 16]) -> Self {
        self.cid = cid;
        self
    }

    /// Replace the raw payload (start code included)
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set consecutive channels starting at the 1-based `address`,
    /// growing the payload if needed.
    pub fn channels_at(mut self, address: u16, values: &[u8]) -> Self {
        let start = address.max(1) as usize;
        let end = start + values.len();
        if self.payload.len() < end {
            self.payload.resize(end, 0);
        }
        self.payload[start..end].copy_from_slice(values);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let total = offset::PAYLOAD + self.payload.len();
        let mut bytes = vec![0u8; total];

        put_u16(&mut bytes, offset::PREAMBLE_SIZE, 0x0010);
        bytes[offset::PACKET_IDENTIFIER..offset::PACKET_IDENTIFIER + 12]
            .copy_from_slice(&ACN_PACKET_IDENTIFIER);
        put_u16(
            &mut bytes,
            offset::ROOT_FLAGS_LENGTH,
            FLAGS | (total - offset::ROOT_FLAGS_LENGTH) as u16,
        );
        bytes[offset::ROOT_VECTOR..offset::ROOT_VECTOR + 4]
            .copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
        bytes[offset::CID..offset::CID + 16].copy_from_slice(&self.cid);

        put_u16(
            &mut bytes,
            offset::FRAMING_FLAGS_LENGTH,
            FLAGS | (total - offset::FRAMING_FLAGS_LENGTH) as u16,
        );
        bytes[offset::FRAMING_VECTOR..offset::FRAMING_VECTOR + 4]
            .copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
        let name = self.source_name.as_bytes();
        let name_len = name.len().min(63);
        bytes[offset::SOURCE_NAME..offset::SOURCE_NAME + name_len]
            .copy_from_slice(&name[..name_len]);
        bytes[offset::PRIORITY] = self.priority;
        put_u16(&mut bytes, offset::SYNC_ADDRESS, 0);
        bytes[offset::SEQUENCE_NUMBER] = self.sequence_number;
        bytes[offset::OPTIONS] = self.options;
        put_u16(&mut bytes, offset::UNIVERSE, self.universe);

        put_u16(
            &mut bytes,
            offset::DMP_FLAGS_LENGTH,
            FLAGS | (total - offset::DMP_FLAGS_LENGTH) as u16,
        );
        bytes[offset::DMP_VECTOR] = VECTOR_DMP_SET_PROPERTY;
        bytes[offset::ADDRESS_DATA_TYPE] = 0xa1;
        put_u16(&mut bytes, offset::FIRST_PROPERTY_ADDRESS, 0);
        put_u16(&mut bytes, offset::ADDRESS_INCREMENT, 1);
        put_u16(&mut bytes, offset::PAYLOAD_LENGTH, self.payload.len() as u16);
        bytes[offset::PAYLOAD..].copy_from_slice(&self.payload);

        bytes
    }
}

fn put_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
}
