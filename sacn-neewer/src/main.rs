use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use neewer_transport::WorkerTransport;
use sacn_neewer::logging::{self, LoggingMode, LOG_LEVEL_ENV};
use sacn_neewer::{
    format_advertisement, scan_devices, BridgeConfig, BridgeContext, FixtureRegistry, ScanOptions,
    DEFAULT_CONFIG_PATH,
};
use tracing::{info, warn};

/// Environment variable naming the light configuration file
const CONFIG_ENV: &str = "SACN_NEEWER_CONFIG";

/// Bound on every call into the Bluetooth worker
#[cfg_attr(not(feature = "ble"), allow(dead_code))]
const TRANSPORT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive Neewer Bluetooth lights from sACN (E1.31) lighting data
#[derive(Parser, Debug)]
#[command(name = "sacn-neewer")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log filter (error, warn, info, debug, trace, or a tracing directive)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Bridge sACN to the configured lights until Ctrl-C (default)
    Run {
        /// Light configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List nearby Bluetooth devices until Ctrl-C
    Scan {
        /// Include devices that advertise no name
        #[arg(long)]
        all: bool,
    },
}

/// Settings resolved from arguments, then environment, then defaults
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_args(args: Args) -> Self {
        let command = match args.command {
            Some(Command::Run { config }) => Command::Run {
                config: config.or_else(config_from_env),
            },
            Some(scan @ Command::Scan { .. }) => scan,
            None => Command::Run {
                config: config_from_env(),
            },
        };

        Self {
            command,
            log_level: args
                .log_level
                .or_else(|| std::env::var(LOG_LEVEL_ENV).ok()),
        }
    }
}

fn config_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse());

    logging::init_logging(LoggingMode::from_env(), config.log_level.as_deref())
        .context("Failed to initialize logging")?;

    match config.command {
        Command::Run { config } => {
            let path = config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            run_bridge(path).await
        }
        Command::Scan { all } => run_scan(ScanOptions { include_unnamed: all }).await,
    }
}

async fn run_bridge(path: PathBuf) -> Result<()> {
    let bridge_config = BridgeConfig::load(&path)
        .with_context(|| format!("Failed to load light configuration from {}", path.display()))?;
    if bridge_config.lights.is_empty() {
        warn!("No lights configured in {}", path.display());
    }

    let worker = open_transport().await?;
    let transport: Arc<dyn neewer_transport::Transport> = worker.clone();

    let mut registry = FixtureRegistry::bind(
        bridge_config.fixtures()?,
        BridgeContext::new(transport),
    )?;
    info!(
        "Bridging {} light(s) on universes {:?}",
        registry.len(),
        registry.universes()
    );

    let outcome = registry.run_until(ctrl_c()).await;
    worker.shutdown().await;
    outcome.context("Bridge stopped with an error")
}

async fn run_scan(options: ScanOptions) -> Result<()> {
    let worker = open_transport().await?;

    let outcome = scan_devices(worker.as_ref(), options, ctrl_c(), |advertisement| {
        println!("{}", format_advertisement(advertisement));
    })
    .await;

    worker.shutdown().await;
    outcome.context("Scan failed")?;
    Ok(())
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}

#[cfg(feature = "ble")]
async fn open_transport() -> Result<Arc<WorkerTransport>> {
    let worker = neewer_transport::spawn_transport_worker(
        neewer_transport::BleTransport::new,
        TRANSPORT_CALL_TIMEOUT,
    )
    .await
    .context("Failed to start the Bluetooth transport")?;
    Ok(Arc::new(worker))
}

#[cfg(not(feature = "ble"))]
async fn open_transport() -> Result<Arc<WorkerTransport>> {
    anyhow::bail!("built without Bluetooth support; rebuild without --no-default-features")
}
