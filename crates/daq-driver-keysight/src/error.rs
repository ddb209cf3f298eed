//! Error types for SCPI communication with Keysight sources.

use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use thiserror::Error;

/// Driver type reported in converted [`DaqError`]s.
pub const DRIVER_TYPE: &str = "keysight_mw";

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, KeysightError>;

/// Errors raised by SCPI transports and reply parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeysightError {
    /// Resource string that is neither a socket nor a VISA address
    #[error("Invalid instrument address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    /// Connection could not be established
    #[error("Failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    /// Read or write failed on an open connection
    #[error("I/O error during '{command}': {message}")]
    Io { command: String, message: String },

    /// No reply within the session timeout
    #[error("Timeout waiting for reply to '{command}'")]
    Timeout { command: String },

    /// Reply that could not be interpreted
    #[error("Unexpected reply to '{command}': {response:?}")]
    Parse { command: String, response: String },

    /// The connection was closed by either side
    #[error("Connection closed")]
    Closed,
}

impl KeysightError {
    pub(crate) fn io(command: &str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            command: command.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(command: &str, response: &str) -> Self {
        Self::Parse {
            command: command.to_string(),
            response: response.to_string(),
        }
    }
}

impl From<KeysightError> for DaqError {
    fn from(err: KeysightError) -> Self {
        let kind = match &err {
            KeysightError::InvalidAddress { .. } => {
                return DaqError::Configuration(err.to_string());
            }
            KeysightError::Connect { .. } => DriverErrorKind::Initialization,
            KeysightError::Io { .. } | KeysightError::Parse { .. } => {
                DriverErrorKind::Communication
            }
            KeysightError::Timeout { .. } => DriverErrorKind::Timeout,
            KeysightError::Closed => DriverErrorKind::Shutdown,
        };
        DaqError::Driver(DriverError::new(DRIVER_TYPE, kind, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_address_is_configuration_error() {
        let err: DaqError = KeysightError::InvalidAddress {
            address: "nonsense".into(),
            message: "missing '::'".into(),
        }
        .into();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn test_conversion_kinds() {
        let err: DaqError = KeysightError::Timeout {
            command: ":FREQ?".into(),
        }
        .into();
        match err {
            DaqError::Driver(driver) => {
                assert_eq!(driver.kind, DriverErrorKind::Timeout);
                assert_eq!(driver.driver_type, DRIVER_TYPE);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err: DaqError = KeysightError::parse(":POWER?", "garbage").into();
        assert!(matches!(
            err,
            DaqError::Driver(DriverError {
                kind: DriverErrorKind::Communication,
                ..
            })
        ));
    }
}
