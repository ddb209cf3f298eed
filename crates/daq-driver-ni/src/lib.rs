//! NI-DAQmx analog fast counter.
//!
//! Turns an analog input channel into a time-binned counter: a counter output
//! generates a retriggerable burst of sample clock pulses, one per bin, on
//! every edge of an external trigger. The analog input samples once per pulse
//! and [`FastCounterController`] sums the resulting chunks bin by bin.
//!
//! # Architecture
//!
//! - [`FastCounterController`]: the [`daq_core::FastCounter`] state machine
//! - [`AcquisitionTaskPair`]: sampling task plus trigger task, created,
//!   started and released as one unit
//! - [`TaskBackend`]: the DAQmx call surface, implemented by
//!   [`MockTaskBackend`] and, with feature `hardware`, `DaqmxBackend`
//! - [`NiFastCounterFactory`]: registry integration
//!
//! # Features
//!
//! - `hardware`: link the NI-DAQmx runtime and enable `DaqmxBackend`

pub mod backend;
pub mod config;
#[cfg(feature = "hardware")]
pub mod daqmx;
pub mod error;
pub mod factory;
pub mod fast_counter;
pub mod mock;
pub mod task_pair;

pub use backend::{PulseSpec, SampleMode, TaskBackend, TerminalConfig};
pub use config::NiFastCounterSettings;
#[cfg(feature = "hardware")]
pub use daqmx::{DaqmxBackend, DaqmxTask};
pub use error::{NiError, Result};
pub use factory::NiFastCounterFactory;
pub use fast_counter::FastCounterController;
pub use mock::{MockOp, MockTask, MockTaskBackend, TaskCall};
pub use task_pair::AcquisitionTaskPair;
