//! Static fixture configuration

use neewer_transport::DeviceId;

/// Where a light lives: its device address and its three DMX channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureConfig {
    pub id: DeviceId,
    pub universe: u16,
    /// 1-based DMX address of the red channel; green and blue follow
    pub address: u16,
}

impl FixtureConfig {
    pub fn new(id: DeviceId, universe: u16, address: u16) -> Self {
        Self {
            id,
            universe,
            address,
        }
    }
}
