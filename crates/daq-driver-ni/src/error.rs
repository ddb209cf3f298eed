//! Error types for NI-DAQmx task operations.

use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use thiserror::Error;

/// Driver type reported in converted [`DaqError`]s.
pub const DRIVER_TYPE: &str = "ni_fast_counter";

/// Result type alias for task backend operations.
pub type Result<T> = std::result::Result<T, NiError>;

/// Errors that can occur when driving NI-DAQmx tasks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NiError {
    /// A DAQmx call returned a negative status code
    #[error("{function} failed ({code}): {message}")]
    Daqmx {
        function: &'static str,
        code: i32,
        message: String,
    },

    /// Channel or terminal name that cannot be passed to the driver
    #[error("Invalid channel name '{name}': {message}")]
    InvalidChannel { name: String, message: String },

    /// Invalid settings or derived task parameters
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The task handle is not (or no longer) known to the backend
    #[error("Unknown task '{task}'")]
    UnknownTask { task: String },

    /// The task pair has already been released
    #[error("Task pair already released")]
    Released,
}

impl NiError {
    /// Shorthand for [`NiError::InvalidConfig`].
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<NiError> for DaqError {
    fn from(err: NiError) -> Self {
        let kind = match &err {
            NiError::InvalidChannel { .. } | NiError::InvalidConfig { .. } => {
                DriverErrorKind::Configuration
            }
            NiError::Daqmx { .. } => DriverErrorKind::Hardware,
            NiError::UnknownTask { .. } | NiError::Released => DriverErrorKind::Shutdown,
        };
        DaqError::Driver(DriverError::new(DRIVER_TYPE, kind, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NiError::Daqmx {
            function: "DAQmxStartTask",
            code: -200088,
            message: "Task specified is invalid".into(),
        };
        assert_eq!(
            err.to_string(),
            "DAQmxStartTask failed (-200088): Task specified is invalid"
        );
    }

    #[test]
    fn test_conversion_kinds() {
        let daq: DaqError = NiError::invalid_config("buffer too large").into();
        match daq {
            DaqError::Driver(driver) => {
                assert_eq!(driver.driver_type, DRIVER_TYPE);
                assert_eq!(driver.kind, DriverErrorKind::Configuration);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
