//! # sACN to Neewer bridge
//!
//! Listens for sACN (E1.31) data on the universes of the configured lights
//! and keeps each Neewer Bluetooth light showing the RGB value found at its
//! DMX address.
//!
//! ```rust,ignore
//! let config = BridgeConfig::load("data/config.json")?;
//! let context = BridgeContext::new(transport);
//! let mut registry = FixtureRegistry::bind(config.fixtures()?, context)?;
//! registry.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scan;

pub use config::{BridgeConfig, LightConfig, DEFAULT_CONFIG_PATH, MAX_ADDRESS};
pub use context::BridgeContext;
pub use error::{BridgeError, ConfigError, Result};
pub use registry::{DispatchOutcome, FixtureRegistry};
pub use scan::{format_advertisement, scan_devices, ScanOptions};
