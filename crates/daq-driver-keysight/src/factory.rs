//! DriverFactory implementation for Keysight sources.
//!
//! # Example Configuration
//!
//! ```toml
//! [[devices]]
//! id = "mw_source"
//! type = "keysight_mw"
//!
//! [devices.config]
//! address = "USB0::0x0957::0x1F01::MY12345678::INSTR"
//! trigger = "TRIG1"
//! ```

use daq_core::driver::{Capability, DeviceComponents, DriverFactory};
use daq_core::error::AppResult;
use tracing::info;

use crate::config::KeysightSettings;
use crate::error::DRIVER_TYPE;
use crate::mock::{MockTransport, MOCK_MODEL};
use crate::source::KeysightSource;
use crate::transport::open_transport;

static CAPABILITIES: &[Capability] = &[Capability::MicrowaveSource];

/// Factory for Keysight microwave sources.
pub struct KeysightFactory;

impl DriverFactory for KeysightFactory {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn name(&self) -> &'static str {
        "Keysight Microwave Source"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> AppResult<()> {
        KeysightSettings::parse(config).map(|_| ())
    }

    fn build(&self, config: toml::Value) -> AppResult<DeviceComponents> {
        let settings = KeysightSettings::from_toml(&config)?;

        if settings.mock {
            info!(address = %settings.address, "Building simulated Keysight source");
            let source = KeysightSource::connect(MockTransport::new(MOCK_MODEL), &settings)?;
            let description = format!("Keysight {} at {} [mock]", source.model(), settings.address);
            return Ok(DeviceComponents::new()
                .with_microwave_source(Box::new(source))
                .with_description(description));
        }

        let transport = open_transport(&settings.resource_address()?, settings.timeout())?;
        let source = KeysightSource::connect(transport, &settings)?;
        let description = format!("Keysight {} at {}", source.model(), settings.address);
        Ok(DeviceComponents::new()
            .with_microwave_source(Box::new(source))
            .with_description(description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::{DaqError, MicrowaveMode};

    #[test]
    fn test_factory_metadata() {
        assert_eq!(KeysightFactory.driver_type(), "keysight_mw");
        assert_eq!(KeysightFactory.capabilities(), &[Capability::MicrowaveSource]);
    }

    #[test]
    fn test_validate_requires_address() {
        let config = toml::Value::Table(toml::toml! {
            trigger = "TRIG1"
        });
        assert!(matches!(
            KeysightFactory.validate(&config),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_mock() {
        let config = toml::Value::Table(toml::toml! {
            address = "TCPIP0::192.168.1.20::5025::SOCKET"
            mock = true
        });
        let components = KeysightFactory.build(config).unwrap();
        assert_eq!(components.capabilities(), vec![Capability::MicrowaveSource]);
        assert!(components
            .description
            .as_deref()
            .is_some_and(|d| d.contains("N5172B")));

        let mut source = components.microwave_source.unwrap();
        let (mode, running) = source.get_status().unwrap();
        assert_eq!(mode, MicrowaveMode::Cw);
        assert!(!running);
        source.close().unwrap();
    }

    #[test]
    fn test_unreachable_socket_fails_to_build() {
        let config = toml::Value::Table(toml::toml! {
            address = "TCPIP0::127.0.0.1::1::SOCKET"
            timeout_ms = 200
        });
        assert!(KeysightFactory.build(config).is_err());
    }
}
