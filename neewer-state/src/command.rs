//! Neewer GATT identifiers and command encoding

use uuid::Uuid;

use crate::color::Hsv;

/// Primary service exposed by the lights
pub const NEEWER_SERVICE_UUID: Uuid = Uuid::from_u128(0x69400001_b5a3_f393_e0a9_e50e24dcca99);

/// Characteristic commands are written to (write without response)
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x69400002_b5a3_f393_e0a9_e50e24dcca99);

/// Characteristic the light answers heartbeats on (read + notify)
pub const READ_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x69400003_b5a3_f393_e0a9_e50e24dcca99);

const COMMAND_PREFIX: u8 = 0x78;
const COLOR_TAG: u8 = 0x86;
const COLOR_PARAM_LEN: u8 = 0x04;

/// Keep-alive command; its last byte is the checksum of the first three
pub const HEARTBEAT_COMMAND: [u8; 4] = [COMMAND_PREFIX, 0x85, 0x00, 0xFD];

/// Wrapping 8-bit sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode a set-color command:
/// `[0x78, 0x86, 0x04, hue_lo, hue_hi, saturation, brightness, checksum]`
pub fn color_command(color: Hsv) -> [u8; 8] {
    let [hue_lo, hue_hi] = color.hue.to_le_bytes();
    let mut command = [
        COMMAND_PREFIX,
        COLOR_TAG,
        COLOR_PARAM_LEN,
        hue_lo,
        hue_hi,
        color.saturation,
        color.brightness,
        0,
    ];
    command[7] = checksum(&command[..7]);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0x78, 0x86, 0x04, 1, 0, 50, 75]), 0x80);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_heartbeat_checksum_is_consistent() {
        assert_eq!(checksum(&HEARTBEAT_COMMAND[..3]), HEARTBEAT_COMMAND[3]);
    }

    #[test]
    fn test_color_command_layout() {
        assert_eq!(
            color_command(Hsv::new(0, 100, 100)),
            [0x78, 0x86, 0x04, 0x00, 0x00, 100, 100, 0xCA]
        );
        // Hue is little-endian
        let command = color_command(Hsv::new(300, 50, 25));
        assert_eq!(&command[3..5], &[0x2C, 0x01]);
    }

    #[test]
    fn test_uuid_text_form() {
        assert_eq!(
            NEEWER_SERVICE_UUID.to_string(),
            "69400001-b5a3-f393-e0a9-e50e24dcca99"
        );
        assert_eq!(
            READ_CHARACTERISTIC_UUID.to_string(),
            "69400003-b5a3-f393-e0a9-e50e24dcca99"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_last_byte_is_checksum(hue in 0u16..360, sat in 0u8..=100, bri in 0u8..=100) {
            let command = color_command(Hsv::new(hue, sat, bri));
            prop_assert_eq!(command[7], checksum(&command[..7]));
        }
    }
}
