//! Keysight source settings.
//!
//! # Example Configuration
//!
//! ```toml
//! [[devices]]
//! id = "mw_source"
//! type = "keysight_mw"
//!
//! [devices.config]
//! address = "TCPIP0::192.168.1.20::5025::SOCKET"
//! timeout_ms = 10000     # optional
//! trigger = "TRIG1"      # optional, list/sweep trigger input
//! ```

use std::time::Duration;

use daq_core::config::{missing_keys, require_keys};
use daq_core::error::{AppResult, DaqError};
use daq_core::limits::VISA_TIMEOUT;
use serde::Deserialize;
use tracing::warn;

use crate::error::DRIVER_TYPE;
use crate::transport::ResourceAddress;

/// Keys that must be present in the config table.
pub const REQUIRED_KEYS: &[&str] = &["address"];

/// Settings for one Keysight source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeysightSettings {
    /// VISA resource string or `TCPIP0::<host>::<port>::SOCKET`
    pub address: String,

    /// Session timeout in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// External trigger input for list and sweep stepping (default: `TRIG1`)
    #[serde(default = "default_trigger")]
    pub trigger: String,

    /// Talk to a simulated instrument
    #[serde(default)]
    pub mock: bool,
}

fn default_timeout_ms() -> u64 {
    VISA_TIMEOUT.as_millis() as u64
}

fn default_trigger() -> String {
    "TRIG1".to_string()
}

impl KeysightSettings {
    /// Settings for `address` with default timeout and trigger.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout_ms: default_timeout_ms(),
            trigger: default_trigger(),
            mock: false,
        }
    }

    /// Parse and validate a config table without logging.
    pub fn parse(config: &toml::Value) -> AppResult<Self> {
        require_keys(DRIVER_TYPE, config, REQUIRED_KEYS)?;
        let settings: Self = config
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| {
                DaqError::Configuration(format!("{}: {}", DRIVER_TYPE, e.message()))
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a config table, warning about optional keys that fell back to defaults.
    pub fn from_toml(config: &toml::Value) -> AppResult<Self> {
        let settings = Self::parse(config)?;
        for key in missing_keys(config, &["timeout_ms", "trigger"]) {
            match key {
                "timeout_ms" => warn!(
                    key,
                    value = settings.timeout_ms,
                    "No timeout_ms configured, using default"
                ),
                _ => warn!(
                    key,
                    value = %settings.trigger,
                    "No trigger configured, using default"
                ),
            }
        }
        Ok(settings)
    }

    /// Check the address and numeric values.
    pub fn validate(&self) -> AppResult<()> {
        self.resource_address()?;
        if self.timeout_ms == 0 {
            return Err(DaqError::Configuration(format!(
                "{}: timeout_ms must be positive",
                DRIVER_TYPE
            )));
        }
        if self.trigger.trim().is_empty() {
            return Err(DaqError::Configuration(format!(
                "{}: trigger must not be empty",
                DRIVER_TYPE
            )));
        }
        Ok(())
    }

    /// Parsed address.
    pub fn resource_address(&self) -> AppResult<ResourceAddress> {
        Ok(ResourceAddress::parse(&self.address)?)
    }

    /// Session timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_defaults_with_warnings() {
        let config = toml::Value::Table(toml::toml! {
            address = "GPIB0::19::INSTR"
        });
        let settings = KeysightSettings::from_toml(&config).unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.trigger, "TRIG1");
        assert!(logs_contain("No timeout_ms configured"));
        assert!(logs_contain("No trigger configured"));
    }

    #[test]
    fn test_missing_address_is_fatal() {
        let config = toml::Value::Table(toml::toml! {
            timeout_ms = 5000
        });
        let err = KeysightSettings::parse(&config).unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_malformed_address_is_fatal() {
        let config = toml::Value::Table(toml::toml! {
            address = "not an address"
        });
        assert!(matches!(
            KeysightSettings::parse(&config),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_full_table() {
        let config = toml::Value::Table(toml::toml! {
            address = "TCPIP0::10.0.0.5::5025::SOCKET"
            timeout_ms = 2500
            trigger = "TRIG2"
            mock = true
        });
        let settings = KeysightSettings::parse(&config).unwrap();
        assert_eq!(settings.timeout_ms, 2500);
        assert_eq!(settings.trigger, "TRIG2");
        assert!(settings.mock);
        assert_eq!(
            settings.resource_address().unwrap(),
            ResourceAddress::Socket {
                host: "10.0.0.5".into(),
                port: 5025,
            }
        );
    }
}
