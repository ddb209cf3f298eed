//! Device-family capability traits.
//!
//! Each instrument family gets an explicit trait instead of a catch-all
//! "instrument" interface:
//!
//! - [`FastCounter`]: time-binned photon/voltage counters with an
//!   Unconfigured → Idle → Running ⇄ Paused lifecycle
//! - [`MicrowaveSource`]: signal generators with CW, list and sweep modes
//!
//! # Design Philosophy
//!
//! Capability traits are synchronous. A device has exactly one caller, so
//! mutating operations take `&mut self` and exclusivity is checked by the
//! compiler. Every operation returns [`AppResult`]; hardware errors are
//! converted to [`DaqError`] at the driver boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use daq_core::capabilities::{AcquisitionConfig, FastCounter};
//!
//! fn acquire(counter: &mut dyn FastCounter) -> daq_core::error::AppResult<Vec<f64>> {
//!     let config = counter.configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0)?)?;
//!     assert_eq!(config.number_of_bins(), 2000);
//!     counter.start_measure()?;
//!     let trace = counter.get_data_trace()?;
//!     counter.stop_measure()?;
//!     Ok(trace)
//! }
//! ```

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Fast Counter
// =============================================================================

/// Acquisition status of a fast counter.
///
/// The numeric codes are part of the external contract (see [`CounterStatus::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterStatus {
    /// No acquisition configuration accepted yet.
    Unconfigured,
    /// Configured, no acquisition running.
    Idle,
    /// Both hardware tasks are running.
    Running,
    /// Hardware tasks stopped but still allocated.
    Paused,
    /// A hardware failure left the device in an undefined state.
    Error,
}

impl CounterStatus {
    /// Integer status code: Unconfigured=0, Idle=1, Running=2, Paused=3, Error=-1.
    pub fn code(self) -> i32 {
        match self {
            Self::Unconfigured => 0,
            Self::Idle => 1,
            Self::Running => 2,
            Self::Paused => 3,
            Self::Error => -1,
        }
    }

    /// Inverse of [`CounterStatus::code`].
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unconfigured),
            1 => Some(Self::Idle),
            2 => Some(Self::Running),
            3 => Some(Self::Paused),
            -1 => Some(Self::Error),
            _ => None,
        }
    }

    /// True while an acquisition owns hardware tasks (Running or Paused).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for CounterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unconfigured => "unconfigured",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// Accepted acquisition parameters with the derived bin count.
///
/// Construct with [`AcquisitionConfig::new`]; the record length is corrected to
/// a whole number of bins, so callers must read back [`timetrace_length`].
///
/// [`timetrace_length`]: AcquisitionConfig::timetrace_length
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcquisitionConfig {
    bin_width_s: f64,
    requested_record_length_s: f64,
    number_of_gates: u32,
    number_of_bins: usize,
}

impl AcquisitionConfig {
    /// Validate a request and derive `number_of_bins = round(record_length_s / bin_width_s)`.
    ///
    /// Rounds half away from zero. Rejects non-finite or non-positive widths and
    /// requests that round to zero bins.
    pub fn new(bin_width_s: f64, record_length_s: f64, number_of_gates: u32) -> AppResult<Self> {
        if !bin_width_s.is_finite() || bin_width_s <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "bin_width_s must be a positive number, got {}",
                bin_width_s
            )));
        }
        if !record_length_s.is_finite() || record_length_s <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "record_length_s must be a positive number, got {}",
                record_length_s
            )));
        }

        let ratio = (record_length_s / bin_width_s).round();
        if ratio < 1.0 || ratio > usize::MAX as f64 {
            return Err(DaqError::Configuration(format!(
                "record length {} s with bin width {} s gives {} bins",
                record_length_s, bin_width_s, ratio
            )));
        }

        Ok(Self {
            bin_width_s,
            requested_record_length_s: record_length_s,
            number_of_gates,
            number_of_bins: ratio as usize,
        })
    }

    /// Width of one bin in seconds.
    pub fn bin_width_s(&self) -> f64 {
        self.bin_width_s
    }

    /// Record length as originally requested.
    pub fn requested_record_length_s(&self) -> f64 {
        self.requested_record_length_s
    }

    /// Number of gates requested (ignored by ungated counters).
    pub fn number_of_gates(&self) -> u32 {
        self.number_of_gates
    }

    /// Rounded bin count.
    pub fn number_of_bins(&self) -> usize {
        self.number_of_bins
    }

    /// `number_of_bins * bin_width_s`, the corrected record length.
    pub fn timetrace_length(&self) -> f64 {
        self.number_of_bins as f64 * self.bin_width_s
    }
}

/// Hardware constraints reported to calling logic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastCounterConstraints {
    /// Supported bin widths in seconds.
    pub hardware_binwidth_list: Vec<f64>,
}

/// Time-binned counter with an explicit acquisition state machine.
///
/// | From | Call | To |
/// |---|---|---|
/// | Unconfigured/Idle/Error | `configure` | Idle |
/// | Idle | `start_measure` | Running |
/// | Running | `pause_measure` | Paused |
/// | Paused | `continue_measure` | Running |
/// | Running/Paused | `stop_measure` | Idle |
///
/// Requests outside this table return [`DaqError::InvalidTransition`] and
/// leave the status unchanged.
pub trait FastCounter {
    /// Supported bin widths.
    fn get_constraints(&self) -> FastCounterConstraints;

    /// Accept an acquisition configuration.
    ///
    /// Counters with a fixed bin width replace the requested width with the
    /// hardware one before deriving the bin count; read the returned value.
    /// While Running or Paused the configuration is frozen and the previously
    /// accepted values are returned unchanged.
    fn configure(&mut self, config: AcquisitionConfig) -> AppResult<AcquisitionConfig>;

    /// Current status.
    fn get_status(&self) -> CounterStatus;

    /// Allocate hardware tasks, zero the accumulation buffer and start.
    fn start_measure(&mut self) -> AppResult<CounterStatus>;

    /// Stop and release hardware tasks. Idempotent.
    fn stop_measure(&mut self) -> AppResult<CounterStatus>;

    /// Stop hardware tasks without releasing them.
    fn pause_measure(&mut self) -> AppResult<CounterStatus>;

    /// Restart paused hardware tasks.
    fn continue_measure(&mut self) -> AppResult<CounterStatus>;

    /// Whether the counter bins per external gate.
    fn is_gated(&self) -> bool;

    /// Hardware bin width in seconds.
    fn get_binwidth(&self) -> f64;

    /// Accumulate newly available samples and return a snapshot of the trace.
    fn get_data_trace(&mut self) -> AppResult<Vec<f64>>;

    /// Release hardware. Safe to call more than once.
    fn close(&mut self) -> AppResult<()>;
}

// =============================================================================
// Microwave Source
// =============================================================================

/// Output mode of a microwave source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicrowaveMode {
    /// Continuous wave at a fixed frequency.
    Cw,
    /// Arbitrary frequency list stepped by trigger.
    List,
    /// Linear frequency sweep stepped by trigger.
    Sweep,
}

impl fmt::Display for MicrowaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cw => "cw",
            Self::List => "list",
            Self::Sweep => "sweep",
        };
        write!(f, "{}", label)
    }
}

/// Polarity of a digital trigger edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEdge {
    /// Low-to-high transition.
    #[default]
    Rising,
    /// High-to-low transition.
    Falling,
}

impl TriggerEdge {
    /// Map a configuration string to an edge.
    ///
    /// `"falling"` (any case) selects [`TriggerEdge::Falling`]; every other
    /// value, including typos, selects [`TriggerEdge::Rising`].
    pub fn from_setting(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("falling") {
            Self::Falling
        } else {
            Self::Rising
        }
    }
}

impl fmt::Display for TriggerEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Falling => write!(f, "falling"),
        }
    }
}

/// Model-dependent limits of a microwave source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicrowaveLimits {
    /// Supported output modes.
    pub supported_modes: Vec<MicrowaveMode>,
    /// Minimum output frequency in Hz.
    pub min_frequency: f64,
    /// Maximum output frequency in Hz.
    pub max_frequency: f64,
    /// Minimum output power in dBm.
    pub min_power: f64,
    /// Maximum output power in dBm.
    pub max_power: f64,
    /// Smallest list step in Hz.
    pub list_minstep: f64,
    /// Largest list step in Hz.
    pub list_maxstep: f64,
    /// Maximum number of list entries.
    pub list_maxentries: usize,
    /// Smallest sweep step in Hz.
    pub sweep_minstep: f64,
    /// Largest sweep step in Hz.
    pub sweep_maxstep: f64,
    /// Maximum number of sweep points.
    pub sweep_maxentries: usize,
}

impl MicrowaveLimits {
    /// True if `frequency` lies within the output range.
    pub fn frequency_in_range(&self, frequency: f64) -> bool {
        frequency >= self.min_frequency && frequency <= self.max_frequency
    }

    /// True if `power` lies within the output range.
    pub fn power_in_range(&self, power: f64) -> bool {
        power >= self.min_power && power <= self.max_power
    }

    /// Error unless `frequency` is within range.
    pub fn check_frequency(&self, frequency: f64) -> AppResult<()> {
        if self.frequency_in_range(frequency) {
            Ok(())
        } else {
            Err(DaqError::Configuration(format!(
                "frequency {} Hz outside [{}, {}] Hz",
                frequency, self.min_frequency, self.max_frequency
            )))
        }
    }

    /// Error unless `power` is within range.
    pub fn check_power(&self, power: f64) -> AppResult<()> {
        if self.power_in_range(power) {
            Ok(())
        } else {
            Err(DaqError::Configuration(format!(
                "power {} dBm outside [{}, {}] dBm",
                power, self.min_power, self.max_power
            )))
        }
    }
}

/// Frequency read back from the instrument, shaped by mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FrequencyReadback {
    /// Single CW frequency in Hz.
    Cw {
        /// Output frequency.
        frequency: f64,
    },
    /// Sweep parameters in Hz; `start` is the first stepped frequency.
    Sweep {
        /// First output frequency of the sweep.
        start: f64,
        /// Last output frequency.
        stop: f64,
        /// Step between points.
        step: f64,
    },
}

/// Values the instrument accepted for a CW configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CwSetting {
    /// Frequency in Hz.
    pub frequency: f64,
    /// Power in dBm.
    pub power: f64,
    /// Resulting mode.
    pub mode: MicrowaveMode,
}

/// Values the instrument accepted for a list configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSetting {
    /// Frequencies in Hz as requested.
    pub frequencies: Vec<f64>,
    /// Power in dBm.
    pub power: f64,
    /// Resulting mode.
    pub mode: MicrowaveMode,
}

/// Values the instrument accepted for a sweep configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepSetting {
    /// First output frequency in Hz.
    pub start: f64,
    /// Last output frequency in Hz.
    pub stop: f64,
    /// Step in Hz.
    pub step: f64,
    /// Power in dBm.
    pub power: f64,
    /// Number of sweep points reported by the instrument.
    pub points: usize,
    /// Resulting mode.
    pub mode: MicrowaveMode,
}

/// Microwave signal source with CW, list and sweep modes.
pub trait MicrowaveSource {
    /// Model-dependent limits.
    fn get_limits(&self) -> MicrowaveLimits;

    /// Switch the output off and wait until the instrument reports it.
    fn off(&mut self) -> AppResult<()>;

    /// Current mode and whether the output is on.
    fn get_status(&mut self) -> AppResult<(MicrowaveMode, bool)>;

    /// Output power in dBm.
    fn get_power(&mut self) -> AppResult<f64>;

    /// Output frequency for the current mode.
    fn get_frequency(&mut self) -> AppResult<FrequencyReadback>;

    /// Switch on in CW mode.
    fn cw_on(&mut self) -> AppResult<()>;

    /// Configure CW frequency and power (output left off).
    fn set_cw(&mut self, frequency: f64, power: f64) -> AppResult<CwSetting>;

    /// Switch on in list mode.
    fn list_on(&mut self) -> AppResult<()>;

    /// Configure a frequency list.
    ///
    /// The output is switched off and stays off; call
    /// [`list_on`](Self::list_on) to start stepping through the list.
    fn set_list(&mut self, frequencies: &[f64], power: f64) -> AppResult<ListSetting>;

    /// Return to the first list entry.
    fn reset_listpos(&mut self) -> AppResult<()>;

    /// Switch on in sweep mode.
    fn sweep_on(&mut self) -> AppResult<()>;

    /// Configure a linear sweep.
    ///
    /// The output is switched off and stays off; call
    /// [`sweep_on`](Self::sweep_on) to start the sweep.
    fn set_sweep(&mut self, start: f64, stop: f64, step: f64, power: f64)
        -> AppResult<SweepSetting>;

    /// Return to the first sweep point.
    fn reset_sweeppos(&mut self) -> AppResult<()>;

    /// Configure the external trigger polarity; returns the edge in effect.
    fn set_ext_trigger(&mut self, edge: TriggerEdge) -> AppResult<TriggerEdge>;

    /// Switch off and close the transport.
    fn close(&mut self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CounterStatus::Unconfigured.code(), 0);
        assert_eq!(CounterStatus::Idle.code(), 1);
        assert_eq!(CounterStatus::Running.code(), 2);
        assert_eq!(CounterStatus::Paused.code(), 3);
        assert_eq!(CounterStatus::Error.code(), -1);
        assert_eq!(CounterStatus::from_code(3), Some(CounterStatus::Paused));
        assert_eq!(CounterStatus::from_code(7), None);
    }

    #[test]
    fn test_acquisition_config_scenario() {
        let config = AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap();
        assert_eq!(config.number_of_bins(), 2000);
        assert!((config.timetrace_length() - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn test_record_length_is_corrected() {
        // 1.26 µs / 0.5 µs = 2.52 -> 3 bins
        let config = AcquisitionConfig::new(0.5e-6, 1.26e-6, 0).unwrap();
        assert_eq!(config.number_of_bins(), 3);
        assert!((config.timetrace_length() - 1.5e-6).abs() < 1e-18);
        assert_eq!(config.requested_record_length_s(), 1.26e-6);
    }

    #[test]
    fn test_ties_round_away_from_zero() {
        let config = AcquisitionConfig::new(1.0, 2.5, 0).unwrap();
        assert_eq!(config.number_of_bins(), 3);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        assert!(AcquisitionConfig::new(0.0, 1e-3, 0).is_err());
        assert!(AcquisitionConfig::new(-1e-6, 1e-3, 0).is_err());
        assert!(AcquisitionConfig::new(f64::NAN, 1e-3, 0).is_err());
        assert!(AcquisitionConfig::new(1e-6, 0.0, 0).is_err());
        assert!(AcquisitionConfig::new(1e-3, 1e-6, 0).is_err());
    }

    #[test]
    fn test_trigger_edge_from_setting() {
        assert_eq!(TriggerEdge::from_setting("falling"), TriggerEdge::Falling);
        assert_eq!(TriggerEdge::from_setting("FALLING"), TriggerEdge::Falling);
        assert_eq!(TriggerEdge::from_setting("rising"), TriggerEdge::Rising);
        assert_eq!(TriggerEdge::from_setting("fall"), TriggerEdge::Rising);
        assert_eq!(TriggerEdge::from_setting(""), TriggerEdge::Rising);
    }

    #[test]
    fn test_limits_checks() {
        let limits = MicrowaveLimits {
            supported_modes: vec![MicrowaveMode::Cw],
            min_frequency: 1e6,
            max_frequency: 1e9,
            min_power: -100.0,
            max_power: 10.0,
            list_minstep: 0.1,
            list_maxstep: 1e9,
            list_maxentries: 10,
            sweep_minstep: 0.1,
            sweep_maxstep: 1e9,
            sweep_maxentries: 10,
        };
        assert!(limits.check_frequency(2.87e8).is_ok());
        assert!(limits.check_frequency(2e9).is_err());
        assert!(limits.check_power(-20.0).is_ok());
        assert!(limits.check_power(20.0).is_err());
    }
}
