//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with a
//! [`DriverRegistry`] at startup via explicit `register_factory` calls.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Composition Root (main.rs)                  │
//! │  registry.register_factory(NiFastCounterFactory);               │
//! │  registry.register_factory(KeysightFactory);                    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         DriverRegistry                          │
//! │  factories: HashMap<driver_type, Box<dyn DriverFactory>>        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     DriverFactory::build()                      │
//! │  Parses TOML config, opens hardware, returns DeviceComponents   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::capabilities::{FastCounter, MicrowaveSource};
use crate::config::{DeviceDefinition, HardwareConfig};
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Corresponds to [`crate::capabilities::FastCounter`]
    FastCounter,
    /// Corresponds to [`crate::capabilities::MicrowaveSource`]
    MicrowaveSource,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::FastCounter => "Fast Counter",
            Self::MicrowaveSource => "Microwave Source",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Capability trait objects returned by a driver factory.
#[derive(Default)]
pub struct DeviceComponents {
    /// FastCounter implementation.
    pub fast_counter: Option<Box<dyn FastCounter + Send>>,
    /// MicrowaveSource implementation.
    pub microwave_source: Option<Box<dyn MicrowaveSource + Send>>,
    /// Free-form description (model string, channel summary).
    pub description: Option<String>,
}

impl DeviceComponents {
    /// Create a new empty DeviceComponents
    pub fn new() -> Self {
        Self::default()
    }

    /// Get list of capabilities this device supports
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.fast_counter.is_some() {
            caps.push(Capability::FastCounter);
        }
        if self.microwave_source.is_some() {
            caps.push(Capability::MicrowaveSource);
        }
        caps
    }

    /// Set FastCounter implementation
    pub fn with_fast_counter(mut self, counter: Box<dyn FastCounter + Send>) -> Self {
        self.fast_counter = Some(counter);
        self
    }

    /// Set MicrowaveSource implementation
    pub fn with_microwave_source(mut self, source: Box<dyn MicrowaveSource + Send>) -> Self {
        self.microwave_source = Some(source);
        self
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl std::fmt::Debug for DeviceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceComponents")
            .field("capabilities", &self.capabilities())
            .field("description", &self.description)
            .finish()
    }
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Trait for driver factories that create device instances.
///
/// The factory declares which `type` it handles, validates the `config`
/// table of a device definition and builds the driver.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the TOML `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without touching hardware.
    fn validate(&self, config: &toml::Value) -> AppResult<()>;

    /// Build the driver. Called after [`validate`](Self::validate) succeeds.
    fn build(&self, config: toml::Value) -> AppResult<DeviceComponents>;
}

// =============================================================================
// Registry
// =============================================================================

/// Registry of driver factories keyed by driver type.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<&'static str, Box<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous factory with the same type.
    pub fn register_factory<F: DriverFactory>(&mut self, factory: F) {
        debug!(driver_type = factory.driver_type(), "Registering driver factory");
        self.factories
            .insert(factory.driver_type(), Box::new(factory));
    }

    /// Look up a factory by driver type.
    pub fn factory(&self, driver_type: &str) -> Option<&dyn DriverFactory> {
        self.factories.get(driver_type).map(|f| f.as_ref())
    }

    /// Registered driver types, sorted.
    pub fn driver_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Validate a device definition against its factory.
    pub fn validate(&self, device: &DeviceDefinition) -> AppResult<()> {
        let factory = self.lookup(device)?;
        factory.validate(&device.config)
    }

    /// Validate and build a single device.
    pub fn build(&self, device: &DeviceDefinition) -> AppResult<DeviceComponents> {
        let factory = self.lookup(device)?;
        factory.validate(&device.config)?;
        let components = factory.build(device.config.clone())?;
        info!(
            device = %device.id,
            driver_type = factory.driver_type(),
            capabilities = ?components.capabilities(),
            "Device built"
        );
        Ok(components)
    }

    /// Build every enabled device in `config`, in file order.
    ///
    /// Stops at the first device that fails; devices already built are
    /// dropped, which releases their hardware.
    pub fn build_enabled(
        &self,
        config: &HardwareConfig,
    ) -> AppResult<Vec<(String, DeviceComponents)>> {
        config
            .enabled_devices()
            .map(|device| self.build(device).map(|components| (device.id.clone(), components)))
            .collect()
    }

    fn lookup(&self, device: &DeviceDefinition) -> AppResult<&dyn DriverFactory> {
        self.factory(&device.r#type).ok_or_else(|| {
            DaqError::Configuration(format!(
                "device '{}': unknown driver type '{}' (known: {})",
                device.id,
                device.r#type,
                self.driver_types().join(", ")
            ))
        })
    }
}
