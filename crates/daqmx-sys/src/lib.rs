//! Low-level FFI bindings for the National Instruments NI-DAQmx C library.
//!
//! Only the subset of NIDAQmx.h used by the task-based fast counter is
//! declared here: task lifecycle, analog input voltage channels, sample clock
//! timing, counter pulse outputs and digital edge start triggers.
//!
//! # Safety
//!
//! All functions are `unsafe` direct FFI bindings. For a safe wrapper, use the
//! `daq-driver-ni` crate with its `hardware` feature.
//!
//! # Features
//!
//! - `daqmx-sdk`: declare the functions and link against the installed NI-DAQmx
//!   runtime. Without this feature only constants and type aliases are exported,
//!   so dependent crates build on machines without the driver installed.
//!
//! # Example (unsafe)
//!
//! ```ignore
//! use daqmx_sys::*;
//! use std::ffi::CString;
//! use std::ptr;
//!
//! unsafe {
//!     let mut task: TaskHandle = ptr::null_mut();
//!     let name = CString::new("").unwrap();
//!     if DAQmxCreateTask(name.as_ptr(), &mut task) >= 0 {
//!         DAQmxClearTask(task);
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(missing_docs)]

use std::os::raw::c_void;

pub type int32 = i32;
pub type uInt32 = u32;
pub type uInt64 = u64;
pub type float64 = f64;
pub type bool32 = u32;

/// Opaque task handle.
pub type TaskHandle = *mut c_void;

// Terminal configuration
pub const DAQmx_Val_Cfg_Default: int32 = -1;
pub const DAQmx_Val_RSE: int32 = 10083;
pub const DAQmx_Val_NRSE: int32 = 10078;
pub const DAQmx_Val_Diff: int32 = 10106;

// Units
pub const DAQmx_Val_Volts: int32 = 10348;
pub const DAQmx_Val_Hz: int32 = 10373;

// Edges
pub const DAQmx_Val_Rising: int32 = 10280;
pub const DAQmx_Val_Falling: int32 = 10171;

// Sample modes
pub const DAQmx_Val_FiniteSamps: int32 = 10178;
pub const DAQmx_Val_ContSamps: int32 = 10123;

// Idle states
pub const DAQmx_Val_Low: int32 = 10214;
pub const DAQmx_Val_High: int32 = 10192;

// Fill modes
pub const DAQmx_Val_GroupByChannel: bool32 = 0;
pub const DAQmx_Val_GroupByScanNumber: bool32 = 1;

/// Read all samples currently available.
pub const DAQmx_Val_Auto: int32 = -1;

pub const DAQmx_Val_WaitInfinitely: float64 = -1.0;

// Error codes
pub const DAQmxSuccess: int32 = 0;
pub const DAQmxErrorSamplesNotYetAvailable: int32 = -200284;
pub const DAQmxErrorInvalidTask: int32 = -200088;

#[cfg(feature = "daqmx-sdk")]
pub use ffi::*;

#[cfg(feature = "daqmx-sdk")]
mod ffi {
    use super::*;
    use std::os::raw::c_char;

    extern "C" {
        pub fn DAQmxCreateTask(taskName: *const c_char, taskHandle: *mut TaskHandle) -> int32;
        pub fn DAQmxStartTask(taskHandle: TaskHandle) -> int32;
        pub fn DAQmxStopTask(taskHandle: TaskHandle) -> int32;
        pub fn DAQmxClearTask(taskHandle: TaskHandle) -> int32;

        pub fn DAQmxCreateAIVoltageChan(
            taskHandle: TaskHandle,
            physicalChannel: *const c_char,
            nameToAssignToChannel: *const c_char,
            terminalConfig: int32,
            minVal: float64,
            maxVal: float64,
            units: int32,
            customScaleName: *const c_char,
        ) -> int32;

        pub fn DAQmxCreateCOPulseChanFreq(
            taskHandle: TaskHandle,
            counter: *const c_char,
            nameToAssignToChannel: *const c_char,
            units: int32,
            idleState: int32,
            initialDelay: float64,
            freq: float64,
            dutyCycle: float64,
        ) -> int32;

        pub fn DAQmxCfgSampClkTiming(
            taskHandle: TaskHandle,
            source: *const c_char,
            rate: float64,
            activeEdge: int32,
            sampleMode: int32,
            sampsPerChan: uInt64,
        ) -> int32;

        pub fn DAQmxCfgImplicitTiming(
            taskHandle: TaskHandle,
            sampleMode: int32,
            sampsPerChan: uInt64,
        ) -> int32;

        pub fn DAQmxCfgInputBuffer(taskHandle: TaskHandle, numSampsPerChan: uInt32) -> int32;

        pub fn DAQmxCfgDigEdgeStartTrig(
            taskHandle: TaskHandle,
            triggerSource: *const c_char,
            triggerEdge: int32,
        ) -> int32;

        pub fn DAQmxSetStartTrigRetriggerable(taskHandle: TaskHandle, data: bool32) -> int32;

        pub fn DAQmxReadAnalogF64(
            taskHandle: TaskHandle,
            numSampsPerChan: int32,
            timeout: float64,
            fillMode: bool32,
            readArray: *mut float64,
            arraySizeInSamps: uInt32,
            sampsPerChanRead: *mut int32,
            reserved: *mut bool32,
        ) -> int32;

        pub fn DAQmxGetExtendedErrorInfo(errorString: *mut c_char, bufferSize: uInt32) -> int32;
    }
}

/// True when a DAQmx status code signals failure. Positive codes are warnings.
#[inline]
pub fn DAQmxFailed(status: int32) -> bool {
    status < 0
}
