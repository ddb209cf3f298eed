//! Sampling task + trigger/clock task, managed as one unit.
//!
//! ```text
//!   trigger_channel ──edge──▶ ┌──────────────────────┐
//!                             │ trigger task (CO)    │  finite burst of
//!                             │ clock_channel        │  number_of_bins pulses,
//!                             └──────────┬───────────┘  re-triggerable
//!                                        │ <clock_channel>InternalOutput
//!                                        ▼
//!   input_channel ──────────▶ ┌──────────────────────┐
//!                             │ sampling task (AI)   │  continuous, one sample
//!                             │                      │  per clock pulse
//!                             └──────────────────────┘
//! ```
//!
//! The pair owns both handles or neither. Every exit path releases what was
//! allocated: failed creation clears the tasks created so far, a failed
//! trigger start stops the sampler again, and `Drop` closes an open pair.

use std::sync::Arc;
use std::time::Duration;

use daq_core::AcquisitionConfig;
use tracing::{debug, warn};

use crate::backend::{PulseSpec, SampleMode, TaskBackend, TerminalConfig};
use crate::config::NiFastCounterSettings;
use crate::error::{NiError, Result};

/// Name given to the analog sampling task.
pub const SAMPLER_TASK_NAME: &str = "fast_counter_sampler";

/// Name given to the counter output task.
pub const TRIGGER_TASK_NAME: &str = "fast_counter_trigger";

const PULSE_DUTY_CYCLE: f64 = 0.5;

struct Tasks<T> {
    sampler: T,
    trigger: T,
}

/// Two correlated hardware tasks with a shared lifecycle.
pub struct AcquisitionTaskPair<B: TaskBackend> {
    backend: Arc<B>,
    tasks: Option<Tasks<B::Task>>,
    running: bool,
    read_capacity: usize,
}

impl<B: TaskBackend> AcquisitionTaskPair<B> {
    /// Allocate and configure both tasks. Nothing is started yet.
    pub fn create(
        backend: Arc<B>,
        settings: &NiFastCounterSettings,
        acquisition: &AcquisitionConfig,
    ) -> Result<Self> {
        let buffer_samples = settings
            .input_buffer_samples(acquisition.bin_width_s())
            .map_err(|e| NiError::invalid_config(e.to_string()))?;
        let bins = acquisition.number_of_bins() as u64;

        let sampler = backend.create_task(SAMPLER_TASK_NAME)?;
        if let Err(err) = configure_sampler(backend.as_ref(), &sampler, settings, buffer_samples) {
            discard(backend.as_ref(), sampler);
            return Err(err);
        }

        let trigger = match backend.create_task(TRIGGER_TASK_NAME) {
            Ok(task) => task,
            Err(err) => {
                discard(backend.as_ref(), sampler);
                return Err(err);
            }
        };
        if let Err(err) = configure_trigger(backend.as_ref(), &trigger, settings, bins) {
            discard(backend.as_ref(), trigger);
            discard(backend.as_ref(), sampler);
            return Err(err);
        }

        debug!(
            input = %settings.input_channel,
            clock = %settings.clock_channel,
            trigger = %settings.trigger_channel,
            edge = %settings.edge(),
            bins,
            buffer_samples,
            "Task pair created"
        );

        Ok(Self {
            backend,
            tasks: Some(Tasks { sampler, trigger }),
            running: false,
            read_capacity: buffer_samples as usize,
        })
    }

    /// Start the sampler, then the trigger task.
    ///
    /// The sampler must be armed before the first clock pulse can arrive. If
    /// the trigger task fails to start, the sampler is stopped again.
    pub fn start(&mut self) -> Result<()> {
        let tasks = self.tasks.as_ref().ok_or(NiError::Released)?;
        self.backend.start_task(&tasks.sampler)?;
        if let Err(err) = self.backend.start_task(&tasks.trigger) {
            if let Err(stop_err) = self.backend.stop_task(&tasks.sampler) {
                warn!(error = %stop_err, "Failed to stop sampler after trigger start failure");
            }
            return Err(err);
        }
        self.running = true;
        Ok(())
    }

    /// Stop both tasks but keep them allocated.
    ///
    /// On failure both tasks are left running, so the pair stays running as
    /// a whole.
    pub fn halt(&mut self) -> Result<()> {
        let tasks = self.tasks.as_ref().ok_or(NiError::Released)?;
        self.backend.stop_task(&tasks.trigger)?;
        if let Err(err) = self.backend.stop_task(&tasks.sampler) {
            if let Err(restart_err) = self.backend.start_task(&tasks.trigger) {
                warn!(error = %restart_err, "Failed to restart trigger after sampler stop failure");
            }
            return Err(err);
        }
        self.running = false;
        Ok(())
    }

    /// Restart halted tasks in the same order as [`start`](Self::start).
    pub fn resume(&mut self) -> Result<()> {
        self.start()
    }

    /// Stop and release both tasks. Closing a closed pair is a no-op.
    ///
    /// Every step is attempted even if an earlier one fails; the first error
    /// is returned.
    pub fn close(&mut self) -> Result<()> {
        let Some(Tasks { sampler, trigger }) = self.tasks.take() else {
            return Ok(());
        };
        self.running = false;

        let results = [
            self.backend.stop_task(&trigger),
            self.backend.stop_task(&sampler),
            self.backend.clear_task(trigger),
            self.backend.clear_task(sampler),
        ];
        debug!("Task pair released");
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Alias for [`close`](Self::close).
    pub fn stop(&mut self) -> Result<()> {
        self.close()
    }

    /// Read whatever samples are available, waiting at most `timeout`.
    ///
    /// The number of samples read is the length of the returned vector.
    pub fn read(&mut self, timeout: Duration) -> Result<Vec<f64>> {
        let tasks = self.tasks.as_ref().ok_or(NiError::Released)?;
        self.backend
            .read_analog(&tasks.sampler, self.read_capacity, timeout)
    }

    /// True while both handles are held.
    pub fn is_open(&self) -> bool {
        self.tasks.is_some()
    }

    /// True between a successful start and the next halt or close.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<B: TaskBackend> Drop for AcquisitionTaskPair<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "Failed to release task pair on drop");
        }
    }
}

impl<B: TaskBackend> std::fmt::Debug for AcquisitionTaskPair<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionTaskPair")
            .field("open", &self.is_open())
            .field("running", &self.running)
            .field("read_capacity", &self.read_capacity)
            .finish()
    }
}

fn configure_sampler<B: TaskBackend>(
    backend: &B,
    task: &B::Task,
    settings: &NiFastCounterSettings,
    buffer_samples: u32,
) -> Result<()> {
    backend.create_ai_voltage_channel(
        task,
        &settings.input_channel,
        TerminalConfig::Rse,
        settings.min_voltage,
        settings.max_voltage,
    )?;
    backend.configure_sample_clock(
        task,
        &settings.clock_source(),
        settings.sample_frequency,
        daq_core::TriggerEdge::Rising,
        SampleMode::Continuous,
        u64::from(buffer_samples),
    )?;
    backend.configure_input_buffer(task, buffer_samples)
}

fn configure_trigger<B: TaskBackend>(
    backend: &B,
    task: &B::Task,
    settings: &NiFastCounterSettings,
    bins: u64,
) -> Result<()> {
    backend.create_co_pulse_channel(
        task,
        &settings.clock_channel,
        PulseSpec {
            frequency: settings.sample_frequency,
            duty_cycle: PULSE_DUTY_CYCLE,
            initial_delay: 0.0,
        },
    )?;
    backend.configure_implicit_timing(task, SampleMode::Finite, bins)?;
    backend.configure_start_trigger(task, &settings.trigger_channel, settings.edge())?;
    backend.set_retriggerable(task, true)
}

fn discard<B: TaskBackend>(backend: &B, task: B::Task) {
    if let Err(err) = backend.clear_task(task) {
        warn!(error = %err, "Failed to clear partially configured task");
    }
}
