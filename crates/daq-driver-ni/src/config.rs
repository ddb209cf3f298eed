//! Fast counter settings.
//!
//! # Example Configuration
//!
//! ```toml
//! [[devices]]
//! id = "fast_counter"
//! type = "ni_fast_counter"
//!
//! [devices.config]
//! clock_channel = "/Dev1/Ctr0"
//! input_channel = "/Dev1/AI0"
//! trigger_channel = "/Dev1/PFI0"
//! trigger_edge = "rising"
//! sample_frequency = 2e6     # optional, Hz
//! min_voltage = -5.0         # optional, V
//! max_voltage = 5.0          # optional, V
//! buffer_length = 5.0        # optional
//! ```

use daq_core::config::{missing_keys, require_keys};
use daq_core::error::{AppResult, DaqError};
use daq_core::TriggerEdge;
use serde::Deserialize;
use tracing::warn;

use crate::error::DRIVER_TYPE;

/// Keys that must be present in the config table.
pub const REQUIRED_KEYS: &[&str] = &[
    "clock_channel",
    "input_channel",
    "trigger_channel",
    "trigger_edge",
];

const DEFAULTED_KEYS: &[&str] = &[
    "sample_frequency",
    "min_voltage",
    "max_voltage",
    "buffer_length",
];

/// Settings for one NI fast counter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NiFastCounterSettings {
    /// Counter generating the sample clock, e.g. `/Dev1/Ctr0`
    pub clock_channel: String,

    /// Sample rate in Hz (default: 2 MHz)
    #[serde(default = "default_sample_frequency")]
    pub sample_frequency: f64,

    /// Analog input channel, e.g. `/Dev1/AI0`
    pub input_channel: String,

    /// Digital line that starts each pulse burst, e.g. `/Dev1/PFI0`
    pub trigger_channel: String,

    /// `"falling"` or `"rising"`; anything else is treated as rising
    pub trigger_edge: String,

    /// Lower end of the input range in volts (default: -5)
    #[serde(default = "default_min_voltage")]
    pub min_voltage: f64,

    /// Upper end of the input range in volts (default: +5)
    #[serde(default = "default_max_voltage")]
    pub max_voltage: f64,

    /// Input buffer length in seconds (default: 5)
    #[serde(default = "default_buffer_length")]
    pub buffer_length: f64,

    /// Use the simulated task backend
    #[serde(default)]
    pub mock: bool,
}

fn default_sample_frequency() -> f64 {
    2e6
}

fn default_min_voltage() -> f64 {
    -5.0
}

fn default_max_voltage() -> f64 {
    5.0
}

fn default_buffer_length() -> f64 {
    5.0
}

impl NiFastCounterSettings {
    /// Settings with the given channels and default optional values.
    pub fn new(
        clock_channel: impl Into<String>,
        input_channel: impl Into<String>,
        trigger_channel: impl Into<String>,
        trigger_edge: impl Into<String>,
    ) -> Self {
        Self {
            clock_channel: clock_channel.into(),
            sample_frequency: default_sample_frequency(),
            input_channel: input_channel.into(),
            trigger_channel: trigger_channel.into(),
            trigger_edge: trigger_edge.into(),
            min_voltage: default_min_voltage(),
            max_voltage: default_max_voltage(),
            buffer_length: default_buffer_length(),
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

    /// Parse a config table, warning about every optional key that fell back to its default.
    pub fn from_toml(config: &toml::Value) -> AppResult<Self> {
        let settings = Self::parse(config)?;
        for key in missing_keys(config, DEFAULTED_KEYS) {
            let value = match key {
                "sample_frequency" => settings.sample_frequency,
                "min_voltage" => settings.min_voltage,
                "max_voltage" => settings.max_voltage,
                _ => settings.buffer_length,
            };
            warn!(key, value, "No {} configured, using default", key);
        }
        Ok(settings)
    }

    /// Check channel names and numeric ranges.
    pub fn validate(&self) -> AppResult<()> {
        for (key, value) in [
            ("clock_channel", &self.clock_channel),
            ("input_channel", &self.input_channel),
            ("trigger_channel", &self.trigger_channel),
        ] {
            if value.trim().is_empty() {
                return Err(DaqError::Configuration(format!(
                    "{}: {} must not be empty",
                    DRIVER_TYPE, key
                )));
            }
        }
        if !self.sample_frequency.is_finite() || self.sample_frequency <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "{}: sample_frequency must be positive, got {}",
                DRIVER_TYPE, self.sample_frequency
            )));
        }
        if !(self.min_voltage < self.max_voltage) {
            return Err(DaqError::Configuration(format!(
                "{}: min_voltage ({}) must be below max_voltage ({})",
                DRIVER_TYPE, self.min_voltage, self.max_voltage
            )));
        }
        if !self.buffer_length.is_finite() || self.buffer_length <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "{}: buffer_length must be positive, got {}",
                DRIVER_TYPE, self.buffer_length
            )));
        }
        Ok(())
    }

    /// Start trigger polarity.
    pub fn edge(&self) -> TriggerEdge {
        TriggerEdge::from_setting(&self.trigger_edge)
    }

    /// Terminal carrying the counter's pulse train, used as the sample clock source.
    pub fn clock_source(&self) -> String {
        format!("{}InternalOutput", self.clock_channel)
    }

    /// Hardware bin width: one sample period.
    pub fn binwidth(&self) -> f64 {
        1.0 / self.sample_frequency
    }

    /// Input buffer size in samples for a bin width: `round(buffer_length / bin_width_s)`.
    pub fn input_buffer_samples(&self, bin_width_s: f64) -> AppResult<u32> {
        let samples = (self.buffer_length / bin_width_s).round();
        if !(samples >= 1.0 && samples <= u32::MAX as f64) {
            return Err(DaqError::Configuration(format!(
                "{}: buffer_length {} at bin width {} s gives {} samples",
                DRIVER_TYPE, self.buffer_length, bin_width_s, samples
            )));
        }
        Ok(samples as u32)
    }
}
