//! E1.31 data packet layout, validation and decoding.
//!
//! Offsets are absolute from the start of the UDP payload. Only the fields the
//! bridge consumes are decoded; flags/length words and the DMP address fields
//! are not interpreted.

use crate::error::{ParseError, ParseResult};

/// ACN packet identifier carried by every E1.17 root layer
pub const ACN_PACKET_IDENTIFIER: [u8; 12] = *b"ASC-E1.17\0\0\0";

/// Root layer vector for E1.31 data (VECTOR_ROOT_E131_DATA)
pub const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;

/// Framing layer vector for DMX data packets (VECTOR_E131_DATA_PACKET)
pub const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;

/// DMP layer vector (VECTOR_DMP_SET_PROPERTY)
pub const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;

/// Smallest buffer that carries a complete root layer
pub const MIN_PACKET_LEN: usize = 38;

/// Highest universe number allowed by E1.31
pub const MAX_UNIVERSE: u16 = 63999;

const SOURCE_NAME_LEN: usize = 64;
const CID_LEN: usize = 16;

const OPTION_PREVIEW_DATA: u8 = 0x80;
const OPTION_STREAM_TERMINATED: u8 = 0x40;

/// Absolute field offsets within a data packet
pub mod offset {
    pub const PREAMBLE_SIZE: usize = 0;
    pub const PACKET_IDENTIFIER: usize = 4;
    pub const ROOT_FLAGS_LENGTH: usize = 16;
    pub const ROOT_VECTOR: usize = 18;
    pub const CID: usize = 22;
    pub const FRAMING_FLAGS_LENGTH: usize = 38;
    pub const FRAMING_VECTOR: usize = 40;
    pub const SOURCE_NAME: usize = 44;
    pub const PRIORITY: usize = 108;
    pub const SYNC_ADDRESS: usize = 109;
    pub const SEQUENCE_NUMBER: usize = 111;
    pub const OPTIONS: usize = 112;
    pub const UNIVERSE: usize = 113;
    pub const DMP_FLAGS_LENGTH: usize = 115;
    pub const DMP_VECTOR: usize = 117;
    pub const ADDRESS_DATA_TYPE: usize = 118;
    pub const FIRST_PROPERTY_ADDRESS: usize = 119;
    pub const ADDRESS_INCREMENT: usize = 121;
    pub const PAYLOAD_LENGTH: usize = 123;
    pub const PAYLOAD: usize = 125;
}

/// Whether `universe` is addressable by E1.31 (1-63999)
pub fn is_valid_universe(universe: u16) -> bool {
    (1..=MAX_UNIVERSE).contains(&universe)
}

/// Check whether a datagram is an sACN DMX data packet.
///
/// All four protocol markers must match: the ACN packet identifier, the root
/// layer vector, the framing layer vector and the DMP layer vector. Buffers
/// too short to hold a marker fail the check rather than panic.
pub fn is_data_packet(bytes: &[u8]) -> bool {
    if bytes.len() < MIN_PACKET_LEN {
        return false;
    }

    let identifier =
        bytes.get(offset::PACKET_IDENTIFIER..offset::PACKET_IDENTIFIER + ACN_PACKET_IDENTIFIER.len());

    identifier == Some(&ACN_PACKET_IDENTIFIER[..])
        && read_u32(bytes, offset::ROOT_VECTOR) == Some(VECTOR_ROOT_E131_DATA)
        && read_u32(bytes, offset::FRAMING_VECTOR) == Some(VECTOR_E131_DATA_PACKET)
        && bytes.get(offset::DMP_VECTOR) == Some(&VECTOR_DMP_SET_PROPERTY)
}

/// A decoded sACN DMX data packet.
///
/// `payload` holds the property values exactly as carried on the wire: the
/// first byte is the DMX start code and `payload[n]` is channel `n` (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxDataPacket {
    /// User-assigned source name with NUL padding removed
    pub source_name: String,
    pub universe: u16,
    /// Data priority, 0-200 on conforming sources
    pub priority: u8,
    /// Per-universe sequence number (wraps at 255)
    pub sequence_number: u8,
    /// Framing layer options bitfield
    pub options: u8,
    /// Component identifier of the sender
    pub cid: [u8; CID_LEN],
    pub payload: Vec<u8>,
}

impl DmxDataPacket {
    /// Decode a datagram already accepted by [`is_data_packet`].
    ///
    /// Protocol markers are not re-validated; only structural bounds are.
    ///
    /// # Errors
    ///
    /// - [`ParseError::PacketTooShort`] below [`MIN_PACKET_LEN`] bytes
    /// - [`ParseError::Truncated`] when a fixed field lies past the buffer
    /// - [`ParseError::PayloadOverrun`] when the declared payload length runs
    ///   past the buffer
    pub fn from_bytes(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < MIN_PACKET_LEN {
            return Err(ParseError::PacketTooShort {
                len: bytes.len(),
                min: MIN_PACKET_LEN,
            });
        }

        let mut cid = [0u8; CID_LEN];
        cid.copy_from_slice(field(bytes, offset::CID, CID_LEN, "cid")?);

        let raw_name = field(bytes, offset::SOURCE_NAME, SOURCE_NAME_LEN, "source name")?;
        let name_end = raw_name
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);
        let source_name = String::from_utf8_lossy(&raw_name[..name_end]).into_owned();

        let priority = field(bytes, offset::PRIORITY, 1, "priority")?[0];
        let sequence_number = field(bytes, offset::SEQUENCE_NUMBER, 1, "sequence number")?[0];
        let options = field(bytes, offset::OPTIONS, 1, "options")?[0];
        let universe = be_u16(field(bytes, offset::UNIVERSE, 2, "universe")?);

        let declared = be_u16(field(bytes, offset::PAYLOAD_LENGTH, 2, "payload length")?) as usize;
        let payload = bytes
            .get(offset::PAYLOAD..offset::PAYLOAD + declared)
            .ok_or(ParseError::PayloadOverrun {
                declared,
                available: bytes.len().saturating_sub(offset::PAYLOAD),
            })?
            .to_vec();

        Ok(Self {
            source_name,
            universe,
            priority,
            sequence_number,
            options,
            cid,
            payload,
        })
    }

    /// DMX start code (first payload byte), if any payload is present
    pub fn start_code(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Channel values without the start code; index 0 is channel 1
    pub fn channels(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or(&[])
    }

    /// Value of a single 1-based channel
    pub fn channel(&self, channel: u16) -> Option<u8> {
        if channel == 0 {
            return None;
        }
        self.payload.get(channel as usize).copied()
    }

    /// Three consecutive channels starting at the 1-based `address`.
    ///
    /// Returns `None` when any of the three channels lies outside the payload.
    pub fn rgb_at(&self, address: u16) -> Option<(u8, u8, u8)> {
        if address == 0 {
            return None;
        }
        let start = address as usize;
        match self.payload.get(start..start + 3)? {
            [r, g, b] => Some((*r, *g, *b)),
            _ => None,
        }
    }

    /// Preview data flag: the data is meant for visualisers, not live output
    pub fn is_preview_data(&self) -> bool {
        self.options & OPTION_PREVIEW_DATA != 0
    }

    /// Stream terminated flag: the source is leaving this universe
    pub fn is_stream_terminated(&self) -> bool {
        self.options & OPTION_STREAM_TERMINATED != 0
    }
}

fn field<'a>(
    bytes: &'a [u8],
    at: usize,
    len: usize,
    name: &'static str,
) -> ParseResult<&'a [u8]> {
    bytes.get(at..at + len).ok_or(ParseError::Truncated {
        field: name,
        offset: at,
        len: bytes.len(),
    })
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let word: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_data_packet(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; offset::PAYLOAD + payload.len()];
        bytes[offset::PACKET_IDENTIFIER..offset::PACKET_IDENTIFIER + 12]
            .copy_from_slice(&ACN_PACKET_IDENTIFIER);
        bytes[offset::ROOT_VECTOR..offset::ROOT_VECTOR + 4]
            .copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
        bytes[offset::FRAMING_VECTOR..offset::FRAMING_VECTOR + 4]
            .copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
        bytes[offset::DMP_VECTOR] = VECTOR_DMP_SET_PROPERTY;
        bytes[offset::PAYLOAD_LENGTH..offset::PAYLOAD_LENGTH + 2]
            .copy_from_slice(&(payload.len() as u16).to_be_bytes());
        bytes[offset::PAYLOAD..].copy_from_slice(payload);
        bytes
    }

    #[test]
    fn test_short_buffer_is_not_data_packet() {
        assert!(!is_data_packet(&[]));
        assert!(!is_data_packet(&[0u8; MIN_PACKET_LEN - 1]));
    }

    #[test]
    fn test_buffer_missing_later_markers_does_not_panic() {
        // Long enough for the root layer but not the framing/DMP vectors
        let full = minimal_data_packet(&[0; 4]);
        assert!(!is_data_packet(&full[..MIN_PACKET_LEN]));
        assert!(!is_data_packet(&full[..offset::DMP_VECTOR]));
    }

    #[test]
    fn test_valid_packet_is_data_packet() {
        assert!(is_data_packet(&minimal_data_packet(&[0, 1, 2, 3])));
    }

    #[test]
    fn test_rgb_at_reads_from_one_based_address() {
        let bytes = minimal_data_packet(&[0x00, 10, 20, 30, 40]);
        let packet = DmxDataPacket::from_bytes(&bytes).unwrap();

        assert_eq!(packet.start_code(), Some(0x00));
        assert_eq!(packet.channels(), &[10, 20, 30, 40]);
        assert_eq!(packet.channel(1), Some(10));
        assert_eq!(packet.rgb_at(1), Some((10, 20, 30)));
        assert_eq!(packet.rgb_at(2), Some((20, 30, 40)));
        assert_eq!(packet.rgb_at(3), None);
        assert_eq!(packet.rgb_at(0), None);
        assert_eq!(packet.rgb_at(u16::MAX), None);
    }

    #[test]
    fn test_option_flags() {
        let bytes = minimal_data_packet(&[0]);
        let mut packet = DmxDataPacket::from_bytes(&bytes).unwrap();
        assert!(!packet.is_preview_data());
        assert!(!packet.is_stream_terminated());

        packet.options = 0x80 | 0x40;
        assert!(packet.is_preview_data());
        assert!(packet.is_stream_terminated());
    }

    #[test]
    fn test_universe_range() {
        assert!(!is_valid_universe(0));
        assert!(is_valid_universe(1));
        assert!(is_valid_universe(MAX_UNIVERSE));
        assert!(!is_valid_universe(MAX_UNIVERSE + 1));
    }
}
