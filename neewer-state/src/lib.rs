//! # Neewer State
//!
//! Per-light state for the bridge: the color a light should show, whether it
//! still needs sending, and the link to the light itself.
//!
//! A [`Fixture`] is driven by two background tasks from [`lifecycle`]: a send
//! task that writes the color command when the color changed (or on a forced
//! refresh), and a heartbeat task that keeps the link alive and drops it when
//! the light stops answering. Connecting is triggered from outside, typically
//! when a scan sees the light advertise.
//!
//! ```rust,ignore
//! let fixture = Arc::new(Fixture::new(config, transport, FixtureTiming::default()));
//! let shutdown = ShutdownSignal::new();
//! spawn_send_task(Arc::clone(&fixture), shutdown.subscribe());
//! spawn_heartbeat_task(Arc::clone(&fixture), shutdown.subscribe());
//!
//! fixture.apply_color(255, 0, 0);
//! fixture.connect().await?;
//! ```

pub mod color;
pub mod command;
pub mod config;
pub mod error;
pub mod fixture;
pub mod lifecycle;
pub mod timing;

pub use color::{rgb_to_hsv, Hsv};
pub use command::{
    checksum, color_command, HEARTBEAT_COMMAND, NEEWER_SERVICE_UUID, READ_CHARACTERISTIC_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
pub use config::FixtureConfig;
pub use error::{FixtureError, Result};
pub use fixture::{Fixture, FixtureSnapshot, HeartbeatOutcome, Link, LinkStatus};
pub use lifecycle::{cancelled, spawn_heartbeat_task, spawn_send_task, ShutdownSignal};
pub use timing::FixtureTiming;
