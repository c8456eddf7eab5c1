//! Logging setup for the bridge binary.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the application, through [`init_logging`].

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Environment variable consulted for the filter when no level is given
pub const LOG_LEVEL_ENV: &str = "SACN_NEEWER_LOG_LEVEL";

/// Environment variable selecting the [`LoggingMode`]
pub const LOG_MODE_ENV: &str = "SACN_NEEWER_LOG_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber installed
    Silent,
    /// Compact stderr output
    Development,
    /// Pretty output with thread ids and source locations
    Debug,
}

impl LoggingMode {
    /// Mode named by `SACN_NEEWER_LOG_MODE`, defaulting to `Development`
    pub fn from_env() -> Self {
        match std::env::var(LOG_MODE_ENV).as_deref() {
            Ok("silent") => LoggingMode::Silent,
            Ok("debug") => LoggingMode::Debug,
            _ => LoggingMode::Development,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// Install the global subscriber.
///
/// The filter comes from `level` when given, then `SACN_NEEWER_LOG_LEVEL`,
/// then `RUST_LOG`, then `info` (`debug` in [`LoggingMode::Debug`]).
///
/// ```rust,ignore
/// sacn_neewer::logging::init_logging(LoggingMode::Development, Some("sacn_stream=debug"))?;
/// ```
pub fn init_logging(mode: LoggingMode, level: Option<&str>) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter(level, "info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter(level, "debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_thread_names(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

fn create_env_filter(level: Option<&str>, default_level: &str) -> Result<EnvFilter, LoggingError> {
    let filter = level
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_LEVEL_ENV).ok())
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| default_level.to_string());

    EnvFilter::try_new(&filter).map_err(|e| LoggingError::InvalidFilter {
        message: e.to_string(),
        filter,
    })
}
