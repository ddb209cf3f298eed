//! Hardware task backend abstraction.
//!
//! [`TaskBackend`] is the seam between the acquisition logic and NI-DAQmx.
//! It mirrors the handful of DAQmx task calls the fast counter needs, one
//! method per call, so the same sequencing code drives the real library
//! ([`DaqmxBackend`](crate::daqmx::DaqmxBackend), feature `hardware`) and the
//! in-memory [`MockTaskBackend`](crate::mock::MockTaskBackend).
//!
//! Methods take `&self`; implementations that keep state use interior
//! locking. Task handles are owned values: [`TaskBackend::clear_task`]
//! consumes the handle, so a cleared task cannot be used again.

use crate::error::Result;
use daq_core::TriggerEdge;
use std::time::Duration;

/// Analog input terminal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalConfig {
    /// Referenced single-ended.
    Rse,
    /// Non-referenced single-ended.
    Nrse,
    /// Differential.
    Differential,
}

/// Sample count mode of a timed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// Acquire or generate until stopped.
    Continuous,
    /// Acquire or generate a fixed number of samples.
    Finite,
}

/// Counter output pulse train, specified by frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseSpec {
    /// Pulse frequency in Hz.
    pub frequency: f64,
    /// High fraction of each period.
    pub duty_cycle: f64,
    /// Delay before the first pulse in seconds.
    pub initial_delay: f64,
}

/// Synchronous hardware task API.
pub trait TaskBackend: Send + Sync {
    /// Owned task handle.
    type Task: Send;

    /// Create an empty task.
    fn create_task(&self, name: &str) -> Result<Self::Task>;

    /// Add an analog input voltage channel.
    fn create_ai_voltage_channel(
        &self,
        task: &Self::Task,
        physical_channel: &str,
        terminal: TerminalConfig,
        min_voltage: f64,
        max_voltage: f64,
    ) -> Result<()>;

    /// Configure sample clock timing.
    fn configure_sample_clock(
        &self,
        task: &Self::Task,
        source: &str,
        rate: f64,
        edge: TriggerEdge,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()>;

    /// Override the input buffer size (samples per channel).
    fn configure_input_buffer(&self, task: &Self::Task, samples_per_channel: u32) -> Result<()>;

    /// Add a counter output channel generating pulses, idle low.
    fn create_co_pulse_channel(
        &self,
        task: &Self::Task,
        counter: &str,
        pulse: PulseSpec,
    ) -> Result<()>;

    /// Configure implicit timing (counter output burst length).
    fn configure_implicit_timing(
        &self,
        task: &Self::Task,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()>;

    /// Arm the task on a digital edge.
    fn configure_start_trigger(&self, task: &Self::Task, source: &str, edge: TriggerEdge)
        -> Result<()>;

    /// Rearm automatically after each finite run.
    fn set_retriggerable(&self, task: &Self::Task, retriggerable: bool) -> Result<()>;

    /// Start the task.
    fn start_task(&self, task: &Self::Task) -> Result<()>;

    /// Stop the task. Stopping a stopped task is not an error.
    fn stop_task(&self, task: &Self::Task) -> Result<()>;

    /// Release the task.
    fn clear_task(&self, task: Self::Task) -> Result<()>;

    /// Read all currently available samples, at most `max_samples`,
    /// waiting no longer than `timeout`.
    fn read_analog(
        &self,
        task: &Self::Task,
        max_samples: usize,
        timeout: Duration,
    ) -> Result<Vec<f64>>;
}

/// DAQmx constant for an edge.
pub fn daqmx_edge(edge: TriggerEdge) -> i32 {
    match edge {
        TriggerEdge::Rising => daqmx_sys::DAQmx_Val_Rising,
        TriggerEdge::Falling => daqmx_sys::DAQmx_Val_Falling,
    }
}

/// DAQmx constant for a sample mode.
pub fn daqmx_sample_mode(mode: SampleMode) -> i32 {
    match mode {
        SampleMode::Continuous => daqmx_sys::DAQmx_Val_ContSamps,
        SampleMode::Finite => daqmx_sys::DAQmx_Val_FiniteSamps,
    }
}

/// DAQmx constant for a terminal configuration.
pub fn daqmx_terminal(terminal: TerminalConfig) -> i32 {
    match terminal {
        TerminalConfig::Rse => daqmx_sys::DAQmx_Val_RSE,
        TerminalConfig::Nrse => daqmx_sys::DAQmx_Val_NRSE,
        TerminalConfig::Differential => daqmx_sys::DAQmx_Val_Diff,
    }
}
