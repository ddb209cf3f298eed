//! Fast counter acquisition state machine.
//!
//! [`FastCounterController`] sequences an [`AcquisitionTaskPair`] through the
//! [`FastCounter`] lifecycle and accumulates sampled chunks into a trace:
//!
//! ```text
//!                configure            start_measure
//! Unconfigured ───────────▶ Idle ───────────────────▶ Running
//!                            ▲  ◀─────────────────────  │  ▲
//!                            │      stop_measure        │  │ continue_measure
//!                            │                    pause │  │
//!                            └──────────────────── Paused ◀┘
//!                                  stop_measure
//! ```
//!
//! Requests outside these edges return [`DaqError::InvalidTransition`],
//! leave the status unchanged and never touch hardware.
//!
//! # Example
//!
//! ```
//! use daq_core::{AcquisitionConfig, CounterStatus, FastCounter};
//! use daq_driver_ni::{FastCounterController, MockTaskBackend, NiFastCounterSettings};
//!
//! # fn main() -> daq_core::AppResult<()> {
//! let settings = NiFastCounterSettings::new("/Dev1/Ctr0", "/Dev1/AI0", "/Dev1/PFI0", "rising");
//! let mut counter = FastCounterController::new(settings, MockTaskBackend::new())?;
//!
//! let config = counter.configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0)?)?;
//! assert_eq!(config.number_of_bins(), 2000);
//!
//! assert_eq!(counter.start_measure()?, CounterStatus::Running);
//! let trace = counter.get_data_trace()?;
//! assert_eq!(trace.len(), 2000);
//! assert_eq!(counter.stop_measure()?, CounterStatus::Idle);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::SAMPLE_READ_TIMEOUT;
use daq_core::{AcquisitionConfig, CounterStatus, FastCounter, FastCounterConstraints};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::backend::TaskBackend;
use crate::config::NiFastCounterSettings;
use crate::task_pair::AcquisitionTaskPair;

/// Relative tolerance when comparing a requested bin width with the hardware one.
const BINWIDTH_TOLERANCE: f64 = 1e-9;

/// NI analog fast counter.
pub struct FastCounterController<B: TaskBackend> {
    settings: NiFastCounterSettings,
    backend: Arc<B>,
    status: CounterStatus,
    acquisition: Option<AcquisitionConfig>,
    task_pair: Option<AcquisitionTaskPair<B>>,
    /// running sum, one entry per bin
    buffer: Vec<f64>,
    /// samples read but not yet forming a whole chunk
    carry: Vec<f64>,
    span: Span,
}

impl<B: TaskBackend> FastCounterController<B> {
    /// Create an unconfigured counter. Settings are validated here.
    pub fn new(settings: NiFastCounterSettings, backend: B) -> AppResult<Self> {
        let span = info_span!("ni_fast_counter", input = %settings.input_channel);
        Self::with_span(settings, backend, span)
    }

    /// Like [`new`](Self::new), logging into the caller's span.
    pub fn with_span(settings: NiFastCounterSettings, backend: B, span: Span) -> AppResult<Self> {
        settings.validate()?;
        {
            let _enter = span.enter();
            info!(
                clock = %settings.clock_channel,
                input = %settings.input_channel,
                trigger = %settings.trigger_channel,
                edge = %settings.edge(),
                sample_frequency = settings.sample_frequency,
                "Fast counter ready"
            );
        }
        Ok(Self {
            settings,
            backend: Arc::new(backend),
            status: CounterStatus::Unconfigured,
            acquisition: None,
            task_pair: None,
            buffer: Vec::new(),
            carry: Vec::new(),
            span,
        })
    }

    /// Settings this counter was built with.
    pub fn settings(&self) -> &NiFastCounterSettings {
        &self.settings
    }

    /// Accepted acquisition configuration, if any.
    pub fn acquisition(&self) -> Option<&AcquisitionConfig> {
        self.acquisition.as_ref()
    }

    /// True while a task pair is owned.
    pub fn has_task_pair(&self) -> bool {
        self.task_pair.is_some()
    }

    fn reject(&self, operation: &'static str) -> DaqError {
        error!(operation, status = %self.status, "Invalid state transition requested");
        DaqError::InvalidTransition {
            operation,
            status: self.status,
        }
    }

    fn accumulate(&mut self, samples: Vec<f64>) {
        let bins = self.buffer.len();
        if bins == 0 {
            return;
        }
        self.carry.extend(samples);
        let whole = self.carry.len() / bins * bins;
        for chunk in self.carry[..whole].chunks_exact(bins) {
            for (total, sample) in self.buffer.iter_mut().zip(chunk) {
                *total += *sample;
            }
        }
        if whole > 0 {
            debug!(chunks = whole / bins, "Accumulated chunks");
        }
        self.carry.drain(..whole);
    }
}

impl<B: TaskBackend> FastCounter for FastCounterController<B> {
    fn get_constraints(&self) -> FastCounterConstraints {
        FastCounterConstraints {
            hardware_binwidth_list: vec![self.settings.binwidth()],
        }
    }

    fn configure(&mut self, config: AcquisitionConfig) -> AppResult<AcquisitionConfig> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.status.is_active() {
            if let Some(current) = self.acquisition {
                warn!(status = %self.status, "Configuration is frozen during an acquisition");
                return Ok(current);
            }
        }

        // bins are one sample clock period wide
        let hardware = self.settings.binwidth();
        let config = if (config.bin_width_s() - hardware).abs() > hardware * BINWIDTH_TOLERANCE {
            warn!(
                requested = config.bin_width_s(),
                hardware,
                "Requested bin width differs from the sample clock period, using hardware bin width"
            );
            AcquisitionConfig::new(
                hardware,
                config.requested_record_length_s(),
                config.number_of_gates(),
            )?
        } else {
            config
        };
        self.settings.input_buffer_samples(config.bin_width_s())?;
        if config.number_of_gates() != 0 {
            debug!(
                gates = config.number_of_gates(),
                "Ignoring gate count on an ungated counter"
            );
        }

        self.acquisition = Some(config);
        self.buffer = vec![0.0; config.number_of_bins()];
        self.carry.clear();
        self.status = CounterStatus::Idle;
        info!(
            bin_width_s = config.bin_width_s(),
            bins = config.number_of_bins(),
            timetrace_length = config.timetrace_length(),
            "Configured"
        );
        Ok(config)
    }

    fn get_status(&self) -> CounterStatus {
        self.status
    }

    fn start_measure(&mut self) -> AppResult<CounterStatus> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.task_pair.is_some() {
            return Err(self.reject("start_measure"));
        }
        let Some(acquisition) = self.acquisition.filter(|_| self.status == CounterStatus::Idle)
        else {
            return Err(self.reject("start_measure"));
        };

        let mut pair =
            AcquisitionTaskPair::create(Arc::clone(&self.backend), &self.settings, &acquisition)
                .map_err(|err| {
                    error!(error = %err, "Failed to create task pair");
                    DaqError::from(err)
                })?;

        self.buffer.iter_mut().for_each(|v| *v = 0.0);
        self.carry.clear();

        if let Err(err) = pair.start() {
            error!(error = %err, "Failed to start task pair");
            if let Err(close_err) = pair.close() {
                warn!(error = %close_err, "Failed to release task pair after start failure");
            }
            return Err(err.into());
        }

        self.task_pair = Some(pair);
        self.status = CounterStatus::Running;
        info!(bins = acquisition.number_of_bins(), "Measurement started");
        Ok(self.status)
    }

    fn stop_measure(&mut self) -> AppResult<CounterStatus> {
        let span = self.span.clone();
        let _enter = span.enter();

        let Some(mut pair) = self.task_pair.take() else {
            debug!(status = %self.status, "Stop requested with no acquisition running");
            return Ok(self.status);
        };

        let result = pair.close();
        self.carry.clear();
        self.status = CounterStatus::Idle;
        match result {
            Ok(()) => {
                info!("Measurement stopped");
                Ok(self.status)
            }
            Err(err) => {
                error!(error = %err, "Task pair did not release cleanly");
                Err(err.into())
            }
        }
    }

    fn pause_measure(&mut self) -> AppResult<CounterStatus> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.status != CounterStatus::Running {
            return Err(self.reject("pause_measure"));
        }
        let Some(pair) = self.task_pair.as_mut() else {
            return Err(self.reject("pause_measure"));
        };

        pair.halt().map_err(|err| {
            error!(error = %err, "Failed to pause task pair");
            DaqError::from(err)
        })?;
        self.status = CounterStatus::Paused;
        info!("Measurement paused");
        Ok(self.status)
    }

    fn continue_measure(&mut self) -> AppResult<CounterStatus> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.status != CounterStatus::Paused {
            return Err(self.reject("continue_measure"));
        }
        let Some(pair) = self.task_pair.as_mut() else {
            return Err(self.reject("continue_measure"));
        };

        pair.resume().map_err(|err| {
            error!(error = %err, "Failed to resume task pair");
            DaqError::from(err)
        })?;
        self.status = CounterStatus::Running;
        info!("Measurement continued");
        Ok(self.status)
    }

    fn is_gated(&self) -> bool {
        false
    }

    fn get_binwidth(&self) -> f64 {
        self.settings.binwidth()
    }

    fn get_data_trace(&mut self) -> AppResult<Vec<f64>> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.status == CounterStatus::Running {
            if let Some(pair) = self.task_pair.as_mut() {
                let samples = pair.read(SAMPLE_READ_TIMEOUT).map_err(|err| {
                    error!(error = %err, "Failed to read samples");
                    DaqError::from(err)
                })?;
                self.accumulate(samples);
            }
        }

        Ok(self.buffer.iter().map(|v| v.abs()).collect())
    }

    fn close(&mut self) -> AppResult<()> {
        if self.task_pair.is_some() {
            self.stop_measure()?;
        }
        Ok(())
    }
}

impl<B: TaskBackend> Drop for FastCounterController<B> {
    fn drop(&mut self) {
        if let Err(err) = FastCounter::close(self) {
            warn!(error = %err, "Failed to close fast counter on drop");
        }
    }
}

impl<B: TaskBackend> std::fmt::Debug for FastCounterController<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastCounterController")
            .field("status", &self.status)
            .field("acquisition", &self.acquisition)
            .field("task_pair", &self.task_pair)
            .finish()
    }
}
