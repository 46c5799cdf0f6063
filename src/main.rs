//! MePS2 Bridge - Main Application
//!
//! Watches the system serial ports, opens a session for every MePS2 receiver
//! it finds and forwards decoded controller state to the configured sink.
//! Devices can be plugged and unplugged while the bridge runs.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use meps2_bridge::backend::{JsonSink, LogSink, OutputSink, SinkError};
use meps2_bridge::config::{Config, SinkKind};
use meps2_bridge::meps2::{EndpointId, SerialConnector, SerialDiscovery};
use meps2_bridge::Bridge;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Bridge MePS2 serial gamepad receivers to virtual controller outputs.
#[derive(Parser, Debug)]
#[command(name = "meps2-bridge", version, about)]
struct Cli {
    /// Serial ports to bridge (default: every port found)
    ports: Vec<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Configuration file (default: configs/default.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output sink
    #[arg(long, value_parser = ["log", "json"])]
    sink: Option<String>,

    /// Silence before a device's output returns to neutral
    #[arg(long)]
    stale_timeout_ms: Option<u64>,

    /// Port rescan interval
    #[arg(long)]
    scan_interval_ms: Option<u64>,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if !self.ports.is_empty() {
            config.serial.ports = self.ports.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(sink) = &self.sink {
            config.output.sink = sink.parse()?;
        }
        if let Some(ms) = self.stale_timeout_ms {
            config.session.stale_timeout_ms = ms;
        }
        if let Some(ms) = self.scan_interval_ms {
            config.registry.scan_interval_ms = ms;
        }
        config.validate()?;
        Ok(())
    }
}

fn make_sink(kind: SinkKind, endpoint: &EndpointId) -> Result<Box<dyn OutputSink>, SinkError> {
    Ok(match kind {
        SinkKind::Log => Box::new(LogSink::new(endpoint.clone())),
        SinkKind::Json => Box::new(JsonSink::stdout(endpoint.clone())),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load_default().context("Failed to load default configuration")?,
    };
    cli.apply(&mut config)?;

    info!("=== MePS2 Bridge ===");
    if config.serial.ports.is_empty() {
        info!("Watching all serial ports @ {} baud", config.serial.baud_rate);
    } else {
        info!("Watching {:?} @ {} baud", config.serial.ports, config.serial.baud_rate);
    }
    info!("Output: {:?}. Press Ctrl+C to stop", config.output.sink);

    let sink_kind = config.output.sink;
    let discovery = SerialDiscovery::new(config.endpoints());
    let connector = SerialConnector::new(config.serial.baud_rate, move |endpoint: &EndpointId| {
        make_sink(sink_kind, endpoint)
    });
    let bridge = Bridge::new(discovery, connector, config.session_options(), config.timing());

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received");
                ctrl_c.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    bridge.run(shutdown).await;
    Ok(())
}
