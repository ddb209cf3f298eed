//! Custom error types for the driver workspace.
//!
//! This module defines the primary error type, `DaqError`, shared by every driver
//! crate. Using the `thiserror` crate, it provides a centralized and consistent way
//! to report what went wrong, from configuration issues to hardware failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the hardware configuration file.
//! - **`Configuration`**: Semantic errors in values that parsed correctly but are
//!   logically wrong (missing channel name, malformed VISA address, bin width ≤ 0).
//!   Fatal at construction time.
//! - **`InvalidTransition`**: A state-machine request that does not apply in the
//!   current status (continue without pause, double start). Recoverable: the
//!   device keeps its status and nothing is sent to hardware.
//! - **`Driver`**: Structured hardware errors converted from the per-driver error
//!   enums (`NiError`, `KeysightError`) at the driver boundary.
//! - **`FeatureNotEnabled`**: Functionality (real DAQmx, VISA) that was not
//!   compiled into this build.
//!
//! By using `#[from]`, `DaqError` can be created from underlying error types,
//! simplifying error handling with the `?` operator.

use crate::capabilities::CounterStatus;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device could not be opened or identified.
    Initialization,
    /// Invalid driver settings or channel names.
    Configuration,
    /// Transport-level failure (socket, VISA session).
    Communication,
    /// Failure while releasing hardware resources.
    Shutdown,
    /// Error reported by the instrument or acquisition card.
    Hardware,
    /// Operation did not complete in time.
    Timeout,
    /// Value outside the instrument's limits.
    InvalidParameter,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Driver error tagged with the driver type and a category.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver type name, matching the TOML `type` field.
    pub driver_type: String,
    /// Error category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the workspace error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type shared by all drivers.
///
/// # Error Categories
///
/// 1. **Configuration Errors** - `Config`, `Configuration`, `FeatureNotEnabled`
///    - Occur while loading settings or constructing a driver
///    - Permanent: fix the configuration file or rebuild
///
/// 2. **State Errors** - `InvalidTransition`, `NotSupported`
///    - Occur during normal operation
///    - Recoverable: the device keeps its current status
///
/// 3. **Hardware/Communication Errors** - `Driver`, `Io`, `Timeout`
///    - Occur while talking to the instrument
///    - Surfaced as a failed call; partially allocated resources are released first
///
/// # Example
///
/// ```rust
/// use daq_core::error::{AppResult, DaqError};
///
/// fn validate_bin_width(bin_width_s: f64) -> AppResult<()> {
///     if !(bin_width_s > 0.0) {
///         return Err(DaqError::Configuration("bin_width_s must be positive".into()));
///     }
///     Ok(())
/// }
/// # assert!(validate_bin_width(1e-6).is_ok());
/// ```
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration file parsing failed.
    ///
    /// Occurs when loading the hardware TOML file (syntax errors, missing
    /// required fields, type mismatches).
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration validation failed.
    ///
    /// Values parsed correctly but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// State-machine request that does not apply in the current status.
    ///
    /// The device status is unchanged and no hardware call was issued.
    #[error("Cannot {operation} while {status}")]
    InvalidTransition {
        /// Requested operation, e.g. `continue_measure`.
        operation: &'static str,
        /// Status at the time of the request (and after it).
        status: CounterStatus,
    },

    /// The device or mode does not support the requested operation.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(DriverError),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation exceeded its timeout.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Required feature not enabled at compile time.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// True for errors that leave the device usable (status unchanged).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DaqError::InvalidTransition { .. } | DaqError::NotSupported(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = DaqError::InvalidTransition {
            operation: "continue_measure",
            status: CounterStatus::Idle,
        };
        assert_eq!(err.to_string(), "Cannot continue_measure while idle");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_driver_error_display() {
        let err = DaqError::Driver(DriverError::new(
            "ni_fast_counter",
            DriverErrorKind::Hardware,
            "DAQmxStartTask failed",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'ni_fast_counter' hardware error"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_feature_not_enabled_display() {
        let err = DaqError::FeatureNotEnabled("visa".into());
        assert!(err.to_string().contains("--features visa"));
    }
}
