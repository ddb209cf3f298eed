//! Hardware configuration loading using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file listing `[[devices]]`
//! 2. environment variables prefixed with `HWCTL_`
//!
//! Each device entry carries a driver `type` and a free-form `config` table
//! that the matching [`DriverFactory`](crate::driver::DriverFactory) parses.
//!
//! # Example
//!
//! ```toml
//! [[devices]]
//! id = "counter"
//! type = "ni_fast_counter"
//!
//! [devices.config]
//! clock_channel = "/Dev1/Ctr0"
//! input_channel = "/Dev1/AI0"
//! trigger_channel = "/Dev1/PFI0"
//! trigger_edge = "rising"
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment prefix for overrides, e.g. `HWCTL_LOG_LEVEL=debug`.
pub const ENV_PREFIX: &str = "HWCTL_";

/// Top-level hardware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Device definitions.
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,
}

/// One device in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Unique device identifier.
    pub id: String,
    /// Driver type, matching [`DriverFactory::driver_type`](crate::driver::DriverFactory::driver_type).
    pub r#type: String,
    /// Whether this device is built at startup.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Driver-specific configuration.
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl HardwareConfig {
    /// Load configuration from a TOML file and `HWCTL_` environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DaqError::Configuration(format!(
                "hardware config '{}' not found",
                path.display()
            )));
        }
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).only(&["log_level"]))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        let config: Self = Figment::new().merge(Toml::string(source)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(DaqError::Configuration(
                    "device id must not be empty".to_string(),
                ));
            }
            if !ids.insert(&device.id) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate device ID: {}",
                    device.id
                )));
            }
            if !device.config.is_table() {
                return Err(DaqError::Configuration(format!(
                    "device '{}': config must be a table",
                    device.id
                )));
            }
        }

        Ok(())
    }

    /// Get all enabled devices.
    pub fn enabled_devices(&self) -> impl Iterator<Item = &DeviceDefinition> {
        self.devices.iter().filter(|device| device.enabled)
    }

    /// Look up a device by id.
    pub fn device(&self, id: &str) -> Option<&DeviceDefinition> {
        self.devices.iter().find(|device| device.id == id)
    }
}

// =============================================================================
// Table helpers for driver factories
// =============================================================================

/// Fail with a configuration error naming every missing required key.
pub fn require_keys(driver_type: &str, config: &toml::Value, keys: &[&str]) -> AppResult<()> {
    let table = config.as_table().ok_or_else(|| {
        DaqError::Configuration(format!("{}: expected a config table", driver_type))
    })?;
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| !table.contains_key(*key))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DaqError::Configuration(format!(
            "{}: missing required field(s): {}",
            driver_type,
            missing.join(", ")
        )))
    }
}

/// Keys from `keys` absent in `config`, used to warn about defaulted settings.
pub fn missing_keys<'a>(config: &toml::Value, keys: &[&'a str]) -> Vec<&'a str> {
    match config.as_table() {
        Some(table) => keys
            .iter()
            .copied()
            .filter(|key| !table.contains_key(*key))
            .collect(),
        None => keys.to_vec(),
    }
}
