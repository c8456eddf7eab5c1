//! Identity and handle types exchanged across the transport boundary

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::TransportError;

/// Implements Display for single-field id newtypes
macro_rules! impl_id_display {
    ($name:ident, $fmt:literal) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $fmt, self.0)
            }
        }
    };
}

/// 48-bit Bluetooth device address identifying a light
///
/// Normalized to upper-case, colon-separated octets
/// (`AA:BB:CC:DD:EE:FF`). Dashes are accepted as separators on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse and normalize a device address
    pub fn new(address: impl AsRef<str>) -> Result<Self, TransportError> {
        let address = address.as_ref().trim();
        let octets: Vec<&str> = address.split([':', '-']).collect();

        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(TransportError::InvalidDeviceId(address.to_string()));
        }

        Ok(Self(octets.join(":").to_ascii_uppercase()))
    }

    pub fn from_octets(octets: [u8; 6]) -> Self {
        let [a, b, c, d, e, f] = octets;
        Self(format!(
            "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{f:02X}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceId {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for DeviceId {
    type Error = TransportError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl_id_display!(DeviceId, "{}");

/// Transport-assigned handle for one established connection
///
/// A fresh id is issued per connect, so notifications from a previous
/// connection to the same device can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl_id_display!(LinkId, "link-{}");

/// A device seen while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub id: DeviceId,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
}

/// A discovered service on a link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    pub link: LinkId,
    pub uuid: Uuid,
}

/// A discovered characteristic on a link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub link: LinkId,
    pub service: Uuid,
    pub uuid: Uuid,
}

/// Value pushed by a device on a subscribed characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub link: LinkId,
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_normalizes_case_and_separator() {
        let id = DeviceId::new("aa-bb-cc-dd-ee-0f").unwrap();
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:0F");
        assert_eq!(id, "AA:BB:CC:DD:EE:0F".parse().unwrap());
    }

    #[test]
    fn test_device_id_rejects_malformed() {
        for bad in ["", "AA:BB:CC:DD:EE", "AA:BB:CC:DD:EE:FF:00", "AA:BB:CC:DD:EE:GG", "AAB:B:CC:DD:EE:FF"] {
            assert!(
                matches!(DeviceId::new(bad), Err(TransportError::InvalidDeviceId(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_device_id_from_octets() {
        let id = DeviceId::from_octets([0xc4, 0x7c, 0x8d, 0x01, 0x02, 0xab]);
        assert_eq!(id.to_string(), "C4:7C:8D:01:02:AB");
    }

    #[test]
    fn test_link_id_display() {
        assert_eq!(LinkId::new(7).to_string(), "link-7");
    }
}
