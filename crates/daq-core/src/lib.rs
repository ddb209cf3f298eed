//! `daq-core`
//!
//! Core types shared by the fast-counter and microwave-source drivers.
//!
//! ## Modules
//!
//! - [`capabilities`]: the [`FastCounter`] and [`MicrowaveSource`] traits and
//!   their value types ([`CounterStatus`], [`AcquisitionConfig`], ...)
//! - [`error`]: [`DaqError`], the error type every driver converts into
//! - [`config`]: Figment-based hardware configuration loading
//! - [`driver`]: [`DriverFactory`] plugin API and [`DriverRegistry`]
//! - [`limits`]: timeouts for blocking hardware calls

pub mod capabilities;
pub mod config;
pub mod driver;
pub mod error;
pub mod limits;

pub use capabilities::{
    AcquisitionConfig, CounterStatus, CwSetting, FastCounter, FastCounterConstraints,
    FrequencyReadback, ListSetting, MicrowaveLimits, MicrowaveMode, MicrowaveSource,
    SweepSetting, TriggerEdge,
};
pub use config::{DeviceDefinition, HardwareConfig};
pub use driver::{Capability, DeviceComponents, DriverFactory, DriverRegistry};
pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
