//! Light configuration file.
//!
//! ```json
//! {
//!   "lights": [
//!     { "id": "C4:7C:8D:6A:10:01", "universe": 1, "address": 1 }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use neewer_state::FixtureConfig;
use neewer_transport::DeviceId;
use sacn_parser::{is_valid_universe, MAX_UNIVERSE};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Highest DMX address that still leaves room for three channels
pub const MAX_ADDRESS: u16 = 510;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "data/config.json";

/// One light as written in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightConfig {
    /// Bluetooth device address
    pub id: String,
    pub universe: u16,
    /// 1-based DMX address of the red channel
    pub address: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub lights: Vec<LightConfig>,
}

impl BridgeConfig {
    /// Read, parse and validate the file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::info!(
            "Loaded {} light(s) from {}",
            config.lights.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every entry; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fixtures().map(|_| ())
    }

    /// Validated fixture configurations, in file order
    pub fn fixtures(&self) -> Result<Vec<FixtureConfig>, ConfigError> {
        let mut first_use: HashMap<DeviceId, usize> = HashMap::new();
        let mut fixtures = Vec::with_capacity(self.lights.len());

        for (index, light) in self.lights.iter().enumerate() {
            let invalid = |message: String| ConfigError::InvalidLight { index, message };

            let id = DeviceId::new(&light.id).map_err(|e| invalid(e.to_string()))?;
            if !is_valid_universe(light.universe) {
                return Err(invalid(format!(
                    "universe {} is outside 1-{}",
                    light.universe, MAX_UNIVERSE
                )));
            }
            if !(1..=MAX_ADDRESS).contains(&light.address) {
                return Err(invalid(format!(
                    "address {} is outside 1-{}",
                    light.address, MAX_ADDRESS
                )));
            }
            if let Some(&first) = first_use.get(&id) {
                return Err(ConfigError::DuplicateId { index, first, id });
            }
            first_use.insert(id.clone(), index);

            fixtures.push(FixtureConfig::new(id, light.universe, light.address));
        }

        Ok(fixtures)
    }

    /// Sorted, distinct universes used by the lights
    pub fn universes(&self) -> Vec<u16> {
        let mut universes: Vec<u16> = self.lights.iter().map(|light| light.universe).collect();
        universes.sort_unstable();
        universes.dedup();
        universes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn light(id: &str, universe: u16, address: u16) -> LightConfig {
        LightConfig {
            id: id.to_string(),
            universe,
            address,
        }
    }

    #[test]
    fn test_parse_and_normalize() {
        let config = BridgeConfig::from_json(
            r#"{ "lights": [
                { "id": "c4:7c:8d:6a:10:01", "universe": 2, "address": 1 },
                { "id": "C4:7C:8D:6A:10:02", "universe": 1, "address": 4 },
                { "id": "C4:7C:8D:6A:10:03", "universe": 2, "address": 7 }
            ] }"#,
        )
        .unwrap();

        assert_eq!(config.universes(), vec![1, 2]);
        let fixtures = config.fixtures().unwrap();
        assert_eq!(fixtures[0].id.as_str(), "C4:7C:8D:6A:10:01");
        assert_eq!(fixtures[1].address, 4);
    }

    #[test]
    fn test_empty_light_list_is_valid() {
        let config = BridgeConfig::from_json(r#"{ "lights": [] }"#).unwrap();
        assert!(config.universes().is_empty());
    }

    #[rstest]
    #[case::bad_id(light("not-a-mac", 1, 1))]
    #[case::universe_zero(light("AA:BB:CC:DD:EE:FF", 0, 1))]
    #[case::universe_too_high(light("AA:BB:CC:DD:EE:FF", 64000, 1))]
    #[case::address_zero(light("AA:BB:CC:DD:EE:FF", 1, 0))]
    #[case::address_past_last_triple(light("AA:BB:CC:DD:EE:FF", 1, 511))]
    fn test_invalid_entry_names_its_index(#[case] bad: LightConfig) {
        let config = BridgeConfig {
            lights: vec![light("AA:BB:CC:DD:EE:01", 1, 1), bad],
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLight { index: 1, .. }), "{err}");
    }

    #[test]
    fn test_duplicate_ids_are_rejected_after_normalization() {
        let config = BridgeConfig {
            lights: vec![
                light("AA:BB:CC:DD:EE:01", 1, 1),
                light("aa-bb-cc-dd-ee-01", 2, 1),
            ],
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { index: 1, first: 0, .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = BridgeConfig::from_json(r#"{ "lights": [ { "id": 5 } ] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = BridgeConfig::load("/nonexistent/sacn-neewer/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
