//! In-memory task backend.
//!
//! [`MockTaskBackend`] records every call, hands out queued sample chunks and
//! can be told to fail a specific call. Clones share state, so a test keeps
//! one clone for inspection while the controller owns another.
//!
//! With [`MockTaskBackend::synthetic`] the backend also generates a decay
//! trace (negative, as from an inverting front end) once per read while the
//! sampling task runs, which is what `mock = true` devices use.

use crate::backend::{PulseSpec, SampleMode, TaskBackend, TerminalConfig};
use crate::error::{NiError, Result};
use daq_core::TriggerEdge;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Handle issued by [`MockTaskBackend`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MockTask(u64);

impl MockTask {
    /// Numeric id, matching the ids in [`TaskCall`].
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Operation kinds, used to select calls for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `create_task`
    CreateTask,
    /// `create_ai_voltage_channel`
    CreateAiVoltageChannel,
    /// `configure_sample_clock`
    ConfigureSampleClock,
    /// `configure_input_buffer`
    ConfigureInputBuffer,
    /// `create_co_pulse_channel`
    CreateCoPulseChannel,
    /// `configure_implicit_timing`
    ConfigureImplicitTiming,
    /// `configure_start_trigger`
    ConfigureStartTrigger,
    /// `set_retriggerable`
    SetRetriggerable,
    /// `start_task`
    StartTask,
    /// `stop_task`
    StopTask,
    /// `clear_task`
    ClearTask,
    /// `read_analog`
    ReadAnalog,
}

/// One recorded backend call. `task` is the [`MockTask::id`] it was made on.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCall {
    /// A task was created.
    CreateTask {
        /// New task id.
        task: u64,
        /// Requested task name.
        name: String,
    },
    /// An analog input voltage channel was added.
    CreateAiVoltageChannel {
        /// Task id.
        task: u64,
        /// Physical channel.
        channel: String,
        /// Input terminal configuration.
        terminal: TerminalConfig,
        /// Lower end of the input range in volts.
        min_voltage: f64,
        /// Upper end of the input range in volts.
        max_voltage: f64,
    },
    /// Sample clock timing was configured.
    ConfigureSampleClock {
        /// Task id.
        task: u64,
        /// Clock source terminal.
        source: String,
        /// Sample rate in Hz.
        rate: f64,
        /// Active clock edge.
        edge: TriggerEdge,
        /// Continuous or finite acquisition.
        mode: SampleMode,
        /// Samples per channel.
        samples_per_channel: u64,
    },
    /// The input buffer was sized.
    ConfigureInputBuffer {
        /// Task id.
        task: u64,
        /// Buffer size in samples per channel.
        samples_per_channel: u32,
    },
    /// A counter output pulse channel was added.
    CreateCoPulseChannel {
        /// Task id.
        task: u64,
        /// Counter channel.
        counter: String,
        /// Pulse frequency, duty cycle and delay.
        pulse: PulseSpec,
    },
    /// Implicit timing was configured.
    ConfigureImplicitTiming {
        /// Task id.
        task: u64,
        /// Continuous or finite generation.
        mode: SampleMode,
        /// Pulses per trigger.
        samples_per_channel: u64,
    },
    /// A digital edge start trigger was configured.
    ConfigureStartTrigger {
        /// Task id.
        task: u64,
        /// Trigger terminal.
        source: String,
        /// Trigger edge.
        edge: TriggerEdge,
    },
    /// The start trigger was made (non-)retriggerable.
    SetRetriggerable {
        /// Task id.
        task: u64,
        /// New setting.
        retriggerable: bool,
    },
    /// A task was started.
    StartTask {
        /// Task id.
        task: u64,
    },
    /// A task was stopped.
    StopTask {
        /// Task id.
        task: u64,
    },
    /// A task was cleared.
    ClearTask {
        /// Task id.
        task: u64,
    },
    /// Analog samples were read.
    ReadAnalog {
        /// Task id.
        task: u64,
        /// Number of samples returned.
        returned: usize,
    },
}

impl TaskCall {
    /// Operation kind of this call.
    pub fn op(&self) -> MockOp {
        match self {
            Self::CreateTask { .. } => MockOp::CreateTask,
            Self::CreateAiVoltageChannel { .. } => MockOp::CreateAiVoltageChannel,
            Self::ConfigureSampleClock { .. } => MockOp::ConfigureSampleClock,
            Self::ConfigureInputBuffer { .. } => MockOp::ConfigureInputBuffer,
            Self::CreateCoPulseChannel { .. } => MockOp::CreateCoPulseChannel,
            Self::ConfigureImplicitTiming { .. } => MockOp::ConfigureImplicitTiming,
            Self::ConfigureStartTrigger { .. } => MockOp::ConfigureStartTrigger,
            Self::SetRetriggerable { .. } => MockOp::SetRetriggerable,
            Self::StartTask { .. } => MockOp::StartTask,
            Self::StopTask { .. } => MockOp::StopTask,
            Self::ClearTask { .. } => MockOp::ClearTask,
            Self::ReadAnalog { .. } => MockOp::ReadAnalog,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    calls: Vec<TaskCall>,
    live: HashSet<u64>,
    running: HashSet<u64>,
    analog: HashSet<u64>,
    burst_length: Option<u64>,
    pending: VecDeque<f64>,
    /// op -> remaining calls before the injected failure fires
    failures: HashMap<MockOp, usize>,
    synthetic: bool,
    synthetic_phase: u64,
}

/// Simulated NI-DAQmx task backend.
#[derive(Debug, Clone, Default)]
pub struct MockTaskBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockTaskBackend {
    /// Backend that returns only explicitly queued samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that also generates one synthetic chunk per read.
    pub fn synthetic() -> Self {
        let backend = Self::new();
        backend.state.lock().synthetic = true;
        backend
    }

    /// Queue samples for the next reads of a running analog task.
    pub fn push_samples(&self, samples: &[f64]) {
        self.state.lock().pending.extend(samples.iter().copied());
    }

    /// Fail the next call of `op`.
    pub fn fail_next(&self, op: MockOp) {
        self.fail_nth(op, 1);
    }

    /// Fail the `n`-th future call of `op` (1-based).
    pub fn fail_nth(&self, op: MockOp, n: usize) {
        self.state.lock().failures.insert(op, n.max(1));
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<TaskCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Tasks created and not yet cleared.
    pub fn live_tasks(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Tasks currently started.
    pub fn running_tasks(&self) -> usize {
        self.state.lock().running.len()
    }

    fn check_failure(state: &mut MockState, op: MockOp) -> Result<()> {
        if let Some(remaining) = state.failures.get_mut(&op) {
            *remaining -= 1;
            if *remaining == 0 {
                state.failures.remove(&op);
                return Err(NiError::Daqmx {
                    function: "mock",
                    code: -200_000,
                    message: format!("injected {:?} failure", op),
                });
            }
        }
        Ok(())
    }

    fn check_live(state: &MockState, task: &MockTask) -> Result<()> {
        if state.live.contains(&task.0) {
            Ok(())
        } else {
            Err(NiError::UnknownTask {
                task: task.0.to_string(),
            })
        }
    }

    /// Run the common bookkeeping for a call on an existing task.
    fn record(&self, op: MockOp, task: &MockTask, call: TaskCall) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_live(&state, task)?;
        Self::check_failure(&mut state, op)?;
        state.calls.push(call);
        Ok(())
    }

    fn synthetic_chunk(state: &mut MockState) -> Vec<f64> {
        let bins = state.burst_length.unwrap_or(0) as usize;
        let phase = state.synthetic_phase;
        state.synthetic_phase = state.synthetic_phase.wrapping_add(1);
        let decay = (bins as f64 / 5.0).max(1.0);
        (0..bins)
            .map(|i| {
                // small deterministic ripple so successive chunks differ
                let ripple = 0.01 * (((i as u64 + phase) % 7) as f64 - 3.0);
                -(0.8 * (-(i as f64) / decay).exp() + 0.05 + ripple)
            })
            .collect()
    }
}

impl TaskBackend for MockTaskBackend {
    type Task = MockTask;

    fn create_task(&self, name: &str) -> Result<MockTask> {
        let mut state = self.state.lock();
        Self::check_failure(&mut state, MockOp::CreateTask)?;
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id);
        state.calls.push(TaskCall::CreateTask {
            task: id,
            name: name.to_string(),
        });
        Ok(MockTask(id))
    }

    fn create_ai_voltage_channel(
        &self,
        task: &MockTask,
        physical_channel: &str,
        terminal: TerminalConfig,
        min_voltage: f64,
        max_voltage: f64,
    ) -> Result<()> {
        self.record(
            MockOp::CreateAiVoltageChannel,
            task,
            TaskCall::CreateAiVoltageChannel {
                task: task.0,
                channel: physical_channel.to_string(),
                terminal,
                min_voltage,
                max_voltage,
            },
        )?;
        self.state.lock().analog.insert(task.0);
        Ok(())
    }

    fn configure_sample_clock(
        &self,
        task: &MockTask,
        source: &str,
        rate: f64,
        edge: TriggerEdge,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()> {
        self.record(
            MockOp::ConfigureSampleClock,
            task,
            TaskCall::ConfigureSampleClock {
                task: task.0,
                source: source.to_string(),
                rate,
                edge,
                mode,
                samples_per_channel,
            },
        )
    }

    fn configure_input_buffer(&self, task: &MockTask, samples_per_channel: u32) -> Result<()> {
        self.record(
            MockOp::ConfigureInputBuffer,
            task,
            TaskCall::ConfigureInputBuffer {
                task: task.0,
                samples_per_channel,
            },
        )
    }

    fn create_co_pulse_channel(
        &self,
        task: &MockTask,
        counter: &str,
        pulse: PulseSpec,
    ) -> Result<()> {
        self.record(
            MockOp::CreateCoPulseChannel,
            task,
            TaskCall::CreateCoPulseChannel {
                task: task.0,
                counter: counter.to_string(),
                pulse,
            },
        )
    }

    fn configure_implicit_timing(
        &self,
        task: &MockTask,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()> {
        self.record(
            MockOp::ConfigureImplicitTiming,
            task,
            TaskCall::ConfigureImplicitTiming {
                task: task.0,
                mode,
                samples_per_channel,
            },
        )?;
        if mode == SampleMode::Finite {
            self.state.lock().burst_length = Some(samples_per_channel);
        }
        Ok(())
    }

    fn configure_start_trigger(
        &self,
        task: &MockTask,
        source: &str,
        edge: TriggerEdge,
    ) -> Result<()> {
        self.record(
            MockOp::ConfigureStartTrigger,
            task,
            TaskCall::ConfigureStartTrigger {
                task: task.0,
                source: source.to_string(),
                edge,
            },
        )
    }

    fn set_retriggerable(&self, task: &MockTask, retriggerable: bool) -> Result<()> {
        self.record(
            MockOp::SetRetriggerable,
            task,
            TaskCall::SetRetriggerable {
                task: task.0,
                retriggerable,
            },
        )
    }

    fn start_task(&self, task: &MockTask) -> Result<()> {
        self.record(MockOp::StartTask, task, TaskCall::StartTask { task: task.0 })?;
        self.state.lock().running.insert(task.0);
        Ok(())
    }

    fn stop_task(&self, task: &MockTask) -> Result<()> {
        self.record(MockOp::StopTask, task, TaskCall::StopTask { task: task.0 })?;
        self.state.lock().running.remove(&task.0);
        Ok(())
    }

    fn clear_task(&self, task: MockTask) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_live(&state, &task)?;
        state.calls.push(TaskCall::ClearTask { task: task.0 });
        // the handle is gone even when the library reports an error
        state.live.remove(&task.0);
        state.running.remove(&task.0);
        state.analog.remove(&task.0);
        Self::check_failure(&mut state, MockOp::ClearTask)
    }

    fn read_analog(
        &self,
        task: &MockTask,
        max_samples: usize,
        _timeout: Duration,
    ) -> Result<Vec<f64>> {
        let mut state = self.state.lock();
        Self::check_live(&state, task)?;
        Self::check_failure(&mut state, MockOp::ReadAnalog)?;

        let samples = if state.analog.contains(&task.0) && state.running.contains(&task.0) {
            if state.pending.is_empty() && state.synthetic {
                let chunk = Self::synthetic_chunk(&mut state);
                state.pending.extend(chunk);
            }
            let count = state.pending.len().min(max_samples);
            state.pending.drain(..count).collect()
        } else {
            Vec::new()
        };

        state.calls.push(TaskCall::ReadAnalog {
            task: task.0,
            returned: samples.len(),
        });
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_clear() {
        let backend = MockTaskBackend::new();
        let task = backend.create_task("a").unwrap();
        assert_eq!(backend.live_tasks(), 1);
        backend.clear_task(task).unwrap();
        assert_eq!(backend.live_tasks(), 0);
    }

    #[test]
    fn test_fail_nth() {
        let backend = MockTaskBackend::new();
        backend.fail_nth(MockOp::CreateTask, 2);
        assert!(backend.create_task("a").is_ok());
        assert!(backend.create_task("b").is_err());
        assert!(backend.create_task("c").is_ok());
    }

    #[test]
    fn test_read_only_while_running() {
        let backend = MockTaskBackend::new();
        let task = backend.create_task("ai").unwrap();
        backend
            .create_ai_voltage_channel(&task, "/Dev1/AI0", TerminalConfig::Rse, -5.0, 5.0)
            .unwrap();
        backend.push_samples(&[1.0, 2.0, 3.0]);

        let idle = backend.read_analog(&task, 10, Duration::ZERO).unwrap();
        assert!(idle.is_empty());

        backend.start_task(&task).unwrap();
        let first = backend.read_analog(&task, 2, Duration::ZERO).unwrap();
        assert_eq!(first, vec![1.0, 2.0]);
        let rest = backend.read_analog(&task, 10, Duration::ZERO).unwrap();
        assert_eq!(rest, vec![3.0]);
    }

    #[test]
    fn test_synthetic_chunk_is_negative() {
        let backend = MockTaskBackend::synthetic();
        let task = backend.create_task("ai").unwrap();
        backend
            .create_ai_voltage_channel(&task, "/Dev1/AI0", TerminalConfig::Rse, -5.0, 5.0)
            .unwrap();
        let trigger = backend.create_task("co").unwrap();
        backend
            .configure_implicit_timing(&trigger, SampleMode::Finite, 50)
            .unwrap();
        backend.start_task(&task).unwrap();

        let chunk = backend.read_analog(&task, 1000, Duration::ZERO).unwrap();
        assert_eq!(chunk.len(), 50);
        assert!(chunk.iter().all(|v| *v < 0.0));
    }

    #[test]
    fn test_unknown_task_rejected() {
        let backend = MockTaskBackend::new();
        let task = backend.create_task("a").unwrap();
        let stale = MockTask(task.id());
        backend.clear_task(task).unwrap();
        assert!(matches!(
            backend.start_task(&stale),
            Err(NiError::UnknownTask { .. })
        ));
    }
}
