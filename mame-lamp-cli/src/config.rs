//! Configuration loading and parsing

use anyhow::{Context, Result};
use mame_lamp_core::{BridgeConfig, DEFAULT_CATALOG_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::serial::DEFAULT_BAUD_RATE;

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port to use when autodetection is off or finds nothing
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Use the first port that can be opened
    #[serde(default = "default_true")]
    pub autodetect: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_true() -> bool {
    true
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            autodetect: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MappingConfig {
    #[serde(default = "default_catalog_file")]
    pub file: PathBuf,
}

fn default_catalog_file() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_FILE)
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            file: default_catalog_file(),
        }
    }
}

/// Values given on the command line; each one wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub map: Option<PathBuf>,
    pub serial_port: Option<String>,
    pub baud_rate: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl AppConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.bridge.host = host;
        }
        if let Some(port) = overrides.port {
            self.bridge.port = port;
        }
        if let Some(map) = overrides.map {
            self.mapping.file = map;
        }
        if let Some(serial_port) = overrides.serial_port {
            // An explicit port disables autodetection
            self.serial.port = Some(serial_port);
            self.serial.autodetect = false;
        }
        if let Some(baud_rate) = overrides.baud_rate {
            self.serial.baud_rate = baud_rate;
        }
        if let Some(delay) = overrides.retry_delay_ms {
            self.bridge.connect_retry.delay_ms = delay;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.bridge.connect_retry.max_attempts = Some(max_attempts);
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
