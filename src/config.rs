//! Configuration loader and validator
//!
//! Loads bridge settings from a TOML file (configs/default.toml by default).
//! Every field has a default, so a partial file or no file at all is fine.

use crate::manager::BridgeTiming;
use crate::meps2::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_SCAN_INTERVAL_MS, DEFAULT_STALE_TIMEOUT_MS, DEFAULT_TICK_INTERVAL_MS,
};
use crate::meps2::controller::StalePolicy;
use crate::meps2::types::{Button, EndpointId};
use crate::session::SessionOptions;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub output: OutputSettings,
}

/// Serial port settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Ports to bridge; empty means every discovered port
    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Per-device session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Silence after which the output returns to neutral
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,

    /// Keep the last reported buttons when a device goes silent
    #[serde(default)]
    pub hold_buttons_on_stale: bool,

    /// Stick deadzone (0.0 to 1.0, exclusive)
    #[serde(default)]
    pub stick_deadzone: f32,

    /// Tap `wake_button` on the sink when a device is opened
    #[serde(default)]
    pub wake_on_connect: bool,

    #[serde(default = "default_wake_button")]
    pub wake_button: Button,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stale_timeout_ms: default_stale_timeout_ms(),
            hold_buttons_on_stale: false,
            stick_deadzone: 0.0,
            wake_on_connect: false,
            wake_button: default_wake_button(),
        }
    }
}

/// Discovery and stale-check timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Output sink kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Log committed state changes
    #[default]
    Log,

    /// One JSON object per commit on stdout
    Json,
}

impl std::str::FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(SinkKind::Log),
            "json" => Ok(SinkKind::Json),
            other => Err(ConfigError::Invalid(format!("unknown sink '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub sink: SinkKind,
}

fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_stale_timeout_ms() -> u64 { DEFAULT_STALE_TIMEOUT_MS }
fn default_wake_button() -> Button { Button::Triangle }
fn default_scan_interval_ms() -> u64 { DEFAULT_SCAN_INTERVAL_MS }
fn default_tick_interval_ms() -> u64 { DEFAULT_TICK_INTERVAL_MS }

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::from_toml(&content)?;

        info!("✓ Config loaded");
        debug!("  - Ports: {:?}", config.serial.ports);
        debug!("  - Baud rate: {}", config.serial.baud_rate);
        debug!("  - Sink: {:?}", config.output.sink);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configs/default.toml, or built-in defaults when it does not exist
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }

        if self.session.stale_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stale_timeout_ms must be positive".into()));
        }

        let deadzone = self.session.stick_deadzone;
        if !(0.0..1.0).contains(&deadzone) {
            return Err(ConfigError::Invalid(
                "stick_deadzone must be in [0.0, 1.0)".into(),
            ));
        }

        if self.registry.scan_interval_ms == 0 || self.registry.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scan_interval_ms and tick_interval_ms must be positive".into(),
            ));
        }

        for port in &self.serial.ports {
            if port.trim().is_empty() {
                return Err(ConfigError::Invalid("empty port name".into()));
            }
        }

        Ok(())
    }

    /// Allow-list for discovery
    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.serial.ports.iter().map(|p| EndpointId::new(p.trim())).collect()
    }

    pub fn session_options(&self) -> SessionOptions {
        let session = &self.session;
        SessionOptions {
            stale_timeout: Duration::from_millis(session.stale_timeout_ms),
            stale_policy: if session.hold_buttons_on_stale {
                StalePolicy::HoldLastKnown
            } else {
                StalePolicy::Neutral
            },
            stick_deadzone: session.stick_deadzone,
            wake_button: session.wake_on_connect.then_some(session.wake_button),
        }
    }

    pub fn timing(&self) -> BridgeTiming {
        BridgeTiming {
            scan_interval: Duration::from_millis(self.registry.scan_interval_ms),
            tick_interval: Duration::from_millis(self.registry.tick_interval_ms),
        }
    }
}
