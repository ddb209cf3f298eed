//! NI-DAQmx task backend (feature `hardware`).
//!
//! Thin safe layer over `daqmx-sys`: every call converts its string arguments,
//! checks the returned status and turns failures into [`NiError::Daqmx`] with
//! the driver's extended error text.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::time::Duration;

use daq_core::TriggerEdge;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::{
    daqmx_edge, daqmx_sample_mode, daqmx_terminal, PulseSpec, SampleMode, TaskBackend,
    TerminalConfig,
};
use crate::error::{NiError, Result};

const ERROR_BUFFER_LEN: usize = 2048;

/// Owned DAQmx task handle.
#[derive(Debug)]
pub struct DaqmxTask {
    handle: daqmx_sys::TaskHandle,
    name: String,
    /// read buffer, reused across reads
    scratch: Mutex<Vec<f64>>,
}

impl DaqmxTask {
    /// Name the task was created with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// SAFETY: a DAQmx task handle is an opaque token, not tied to the creating
// thread. All calls through it are serialized by DaqmxBackend::ffi_lock.
unsafe impl Send for DaqmxTask {}

/// Task backend calling the installed NI-DAQmx library.
#[derive(Debug, Default)]
pub struct DaqmxBackend {
    /// Serializes calls into the library, which keeps per-process error state.
    ffi_lock: Mutex<()>,
}

impl DaqmxBackend {
    /// Create a backend. No library call is made until the first task.
    pub fn new() -> Self {
        Self::default()
    }
}

fn c_string(name: &str) -> Result<CString> {
    CString::new(name).map_err(|e| NiError::InvalidChannel {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn extended_error_info() -> String {
    let mut buffer = vec![0u8; ERROR_BUFFER_LEN];
    // SAFETY: buffer is writable for ERROR_BUFFER_LEN bytes and the library
    // writes a NUL-terminated string no longer than the size it is given.
    let status = unsafe {
        daqmx_sys::DAQmxGetExtendedErrorInfo(
            buffer.as_mut_ptr().cast::<c_char>(),
            ERROR_BUFFER_LEN as u32,
        )
    };
    if daqmx_sys::DAQmxFailed(status) {
        return "no extended error information".to_string();
    }
    CStr::from_bytes_until_nul(&buffer)
        .map(|text| text.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn check(function: &'static str, status: i32) -> Result<()> {
    if daqmx_sys::DAQmxFailed(status) {
        return Err(NiError::Daqmx {
            function,
            code: status,
            message: extended_error_info(),
        });
    }
    if status > 0 {
        debug!(function, status, "DAQmx warning");
    }
    Ok(())
}

impl TaskBackend for DaqmxBackend {
    type Task = DaqmxTask;

    fn create_task(&self, name: &str) -> Result<DaqmxTask> {
        let c_name = c_string(name)?;
        let mut handle: daqmx_sys::TaskHandle = ptr::null_mut();
        let _guard = self.ffi_lock.lock();
        // SAFETY: c_name is NUL-terminated and handle is a valid out pointer.
        let status = unsafe { daqmx_sys::DAQmxCreateTask(c_name.as_ptr(), &mut handle) };
        check("DAQmxCreateTask", status)?;
        debug!(task = name, "Created DAQmx task");
        Ok(DaqmxTask {
            handle,
            name: name.to_string(),
            scratch: Mutex::new(Vec::new()),
        })
    }

    fn create_ai_voltage_channel(
        &self,
        task: &DaqmxTask,
        physical_channel: &str,
        terminal: TerminalConfig,
        min_voltage: f64,
        max_voltage: f64,
    ) -> Result<()> {
        let channel = c_string(physical_channel)?;
        let empty = c_string("")?;
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; all strings are NUL-terminated.
        let status = unsafe {
            daqmx_sys::DAQmxCreateAIVoltageChan(
                task.handle,
                channel.as_ptr(),
                empty.as_ptr(),
                daqmx_terminal(terminal),
                min_voltage,
                max_voltage,
                daqmx_sys::DAQmx_Val_Volts,
                ptr::null(),
            )
        };
        check("DAQmxCreateAIVoltageChan", status)
    }

    fn configure_sample_clock(
        &self,
        task: &DaqmxTask,
        source: &str,
        rate: f64,
        edge: TriggerEdge,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()> {
        let source = c_string(source)?;
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; source is NUL-terminated.
        let status = unsafe {
            daqmx_sys::DAQmxCfgSampClkTiming(
                task.handle,
                source.as_ptr(),
                rate,
                daqmx_edge(edge),
                daqmx_sample_mode(mode),
                samples_per_channel,
            )
        };
        check("DAQmxCfgSampClkTiming", status)
    }

    fn configure_input_buffer(&self, task: &DaqmxTask, samples_per_channel: u32) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task.
        let status = unsafe { daqmx_sys::DAQmxCfgInputBuffer(task.handle, samples_per_channel) };
        check("DAQmxCfgInputBuffer", status)
    }

    fn create_co_pulse_channel(
        &self,
        task: &DaqmxTask,
        counter: &str,
        pulse: PulseSpec,
    ) -> Result<()> {
        let counter = c_string(counter)?;
        let empty = c_string("")?;
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; strings are NUL-terminated.
        let status = unsafe {
            daqmx_sys::DAQmxCreateCOPulseChanFreq(
                task.handle,
                counter.as_ptr(),
                empty.as_ptr(),
                daqmx_sys::DAQmx_Val_Hz,
                daqmx_sys::DAQmx_Val_Low,
                pulse.initial_delay,
                pulse.frequency,
                pulse.duty_cycle,
            )
        };
        check("DAQmxCreateCOPulseChanFreq", status)
    }

    fn configure_implicit_timing(
        &self,
        task: &DaqmxTask,
        mode: SampleMode,
        samples_per_channel: u64,
    ) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task.
        let status = unsafe {
            daqmx_sys::DAQmxCfgImplicitTiming(
                task.handle,
                daqmx_sample_mode(mode),
                samples_per_channel,
            )
        };
        check("DAQmxCfgImplicitTiming", status)
    }

    fn configure_start_trigger(
        &self,
        task: &DaqmxTask,
        source: &str,
        edge: TriggerEdge,
    ) -> Result<()> {
        let source = c_string(source)?;
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; source is NUL-terminated.
        let status = unsafe {
            daqmx_sys::DAQmxCfgDigEdgeStartTrig(task.handle, source.as_ptr(), daqmx_edge(edge))
        };
        check("DAQmxCfgDigEdgeStartTrig", status)
    }

    fn set_retriggerable(&self, task: &DaqmxTask, retriggerable: bool) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task.
        let status = unsafe {
            daqmx_sys::DAQmxSetStartTrigRetriggerable(task.handle, u32::from(retriggerable))
        };
        check("DAQmxSetStartTrigRetriggerable", status)
    }

    fn start_task(&self, task: &DaqmxTask) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task.
        let status = unsafe { daqmx_sys::DAQmxStartTask(task.handle) };
        check("DAQmxStartTask", status)
    }

    fn stop_task(&self, task: &DaqmxTask) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task.
        let status = unsafe { daqmx_sys::DAQmxStopTask(task.handle) };
        check("DAQmxStopTask", status)
    }

    fn clear_task(&self, task: DaqmxTask) -> Result<()> {
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; it is consumed here and never
        // used again.
        let status = unsafe { daqmx_sys::DAQmxClearTask(task.handle) };
        if daqmx_sys::DAQmxFailed(status) {
            warn!(task = %task.name, status, "DAQmxClearTask reported an error");
        }
        check("DAQmxClearTask", status)
    }

    fn read_analog(
        &self,
        task: &DaqmxTask,
        max_samples: usize,
        timeout: Duration,
    ) -> Result<Vec<f64>> {
        let capacity = u32::try_from(max_samples).unwrap_or(u32::MAX);
        let mut buffer = task.scratch.lock();
        buffer.resize(capacity as usize, 0.0);
        let mut read: i32 = 0;
        let _guard = self.ffi_lock.lock();
        // SAFETY: task.handle is a live task; buffer holds `capacity` f64
        // values and `read` is a valid out pointer. reserved must be null.
        let status = unsafe {
            daqmx_sys::DAQmxReadAnalogF64(
                task.handle,
                daqmx_sys::DAQmx_Val_Auto,
                timeout.as_secs_f64(),
                daqmx_sys::DAQmx_Val_GroupByScanNumber,
                buffer.as_mut_ptr(),
                capacity,
                &mut read,
                ptr::null_mut(),
            )
        };
        if status == daqmx_sys::DAQmxErrorSamplesNotYetAvailable {
            return Ok(Vec::new());
        }
        check("DAQmxReadAnalogF64", status)?;
        let read = usize::try_from(read).unwrap_or(0).min(buffer.len());
        Ok(buffer[..read].to_vec())
    }
}
