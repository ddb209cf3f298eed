//! DriverFactory implementation for the NI fast counter.
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
//! mock = true
//! ```

use daq_core::driver::{Capability, DeviceComponents, DriverFactory};
use daq_core::error::AppResult;
use tracing::info;

use crate::config::NiFastCounterSettings;
use crate::error::DRIVER_TYPE;
use crate::fast_counter::FastCounterController;
use crate::mock::MockTaskBackend;

static CAPABILITIES: &[Capability] = &[Capability::FastCounter];

/// Factory for NI-DAQmx analog fast counters.
pub struct NiFastCounterFactory;

impl DriverFactory for NiFastCounterFactory {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn name(&self) -> &'static str {
        "NI Analog Fast Counter"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> AppResult<()> {
        NiFastCounterSettings::parse(config).map(|_| ())
    }

    fn build(&self, config: toml::Value) -> AppResult<DeviceComponents> {
        let settings = NiFastCounterSettings::from_toml(&config)?;
        let description = format!(
            "{} sampled at {} Hz, clock {}, trigger {} ({})",
            settings.input_channel,
            settings.sample_frequency,
            settings.clock_channel,
            settings.trigger_channel,
            settings.edge()
        );

        if settings.mock {
            info!(input = %settings.input_channel, "Building simulated fast counter");
            let counter = FastCounterController::new(settings, MockTaskBackend::synthetic())?;
            return Ok(DeviceComponents::new()
                .with_fast_counter(Box::new(counter))
                .with_description(format!("{} [mock]", description)));
        }

        build_hardware(settings, description)
    }
}

#[cfg(feature = "hardware")]
fn build_hardware(
    settings: NiFastCounterSettings,
    description: String,
) -> AppResult<DeviceComponents> {
    use crate::daqmx::DaqmxBackend;

    let counter = FastCounterController::new(settings, DaqmxBackend::new())?;
    Ok(DeviceComponents::new()
        .with_fast_counter(Box::new(counter))
        .with_description(description))
}

#[cfg(not(feature = "hardware"))]
fn build_hardware(
    _settings: NiFastCounterSettings,
    _description: String,
) -> AppResult<DeviceComponents> {
    Err(daq_core::DaqError::FeatureNotEnabled("hardware".to_string()))
}
