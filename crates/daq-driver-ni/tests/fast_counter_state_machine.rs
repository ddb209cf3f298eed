//! Fast counter state machine tests against the recording mock backend.
//!
//! # Test Coverage
//!
//! | Test | Description |
//! |------|-------------|
//! | `configure_scenario_2000_bins` | 0.5 us bins over 1 ms |
//! | `configure_frozen_while_active` | Running/Paused configure returns prior values |
//! | `double_start_fails` | second start rejected, status unchanged |
//! | `pause_continue_keeps_buffer` | no re-zeroing across pause |
//! | `stop_is_idempotent` | stop, stop both return Idle |
//! | `pause_failure_keeps_acquisition_running` | failed halt leaves both tasks running |
//! | `coarser_bin_request_uses_hardware_binwidth` | bins follow the sample clock period |
//! | `two_chunks_are_summed` | element-wise sum of absolute values |
//! | `continue_from_idle_is_noop` | no hardware calls issued |
//! | `falling_edge_reaches_trigger_task` | edge setting to hardware |
//! | `start_failure_releases_tasks` | no leaked handles, status unchanged |

use daq_core::{AcquisitionConfig, CounterStatus, DaqError, FastCounter, TriggerEdge};
use daq_driver_ni::{
    FastCounterController, MockOp, MockTaskBackend, NiFastCounterSettings, TaskCall,
};
use proptest::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

fn settings(edge: &str) -> NiFastCounterSettings {
    NiFastCounterSettings::new("/Dev1/Ctr0", "/Dev1/AI0", "/Dev1/PFI0", edge)
}

fn counter(backend: &MockTaskBackend) -> FastCounterController<MockTaskBackend> {
    FastCounterController::new(settings("rising"), backend.clone()).unwrap()
}

fn running_counter(
    backend: &MockTaskBackend,
    record_length_s: f64,
) -> FastCounterController<MockTaskBackend> {
    let mut counter = counter(backend);
    counter
        .configure(AcquisitionConfig::new(0.5e-6, record_length_s, 0).unwrap())
        .unwrap();
    assert_eq!(counter.start_measure().unwrap(), CounterStatus::Running);
    counter
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn configure_scenario_2000_bins() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);

    let config = counter
        .configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap())
        .unwrap();

    assert_eq!(config.number_of_bins(), 2000);
    assert!((config.timetrace_length() - 1e-3).abs() < 1e-15);
    assert_eq!(counter.get_status(), CounterStatus::Idle);
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn configure_frozen_while_active() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);
    let other = AcquisitionConfig::new(1e-6, 5e-3, 2).unwrap();

    let while_running = counter.configure(other).unwrap();
    assert_eq!(while_running.number_of_bins(), 2000);
    assert_eq!(while_running.bin_width_s(), 0.5e-6);

    counter.pause_measure().unwrap();
    let while_paused = counter.configure(other).unwrap();
    assert_eq!(while_paused, while_running);
    assert_eq!(counter.get_status(), CounterStatus::Paused);
}

proptest! {
    #[test]
    fn bin_count_is_rounded_ratio(
        bin_width_s in 1e-8f64..1e-3,
        ratio in 0.6f64..50_000.0,
    ) {
        let record_length_s = bin_width_s * ratio;
        let config = AcquisitionConfig::new(bin_width_s, record_length_s, 0).unwrap();

        prop_assert_eq!(
            config.number_of_bins() as f64,
            (record_length_s / bin_width_s).round()
        );
        prop_assert_eq!(
            config.timetrace_length(),
            config.number_of_bins() as f64 * bin_width_s
        );
    }

    #[test]
    fn configured_trace_matches_hardware_binwidth(
        bin_width_s in 1e-8f64..1e-3,
        record_length_s in 1e-6f64..1e-2,
    ) {
        let backend = MockTaskBackend::new();
        let mut counter = counter(&backend);
        let hardware = counter.get_binwidth();

        let config = counter
            .configure(AcquisitionConfig::new(bin_width_s, record_length_s, 0).unwrap())
            .unwrap();

        prop_assert_eq!(config.bin_width_s(), hardware);
        prop_assert_eq!(
            config.number_of_bins() as f64,
            (record_length_s / hardware).round()
        );
        prop_assert_eq!(
            config.timetrace_length(),
            config.number_of_bins() as f64 * hardware
        );
    }
}

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn double_start_fails() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);
    let calls = backend.call_count();

    let err = counter.start_measure().unwrap_err();
    assert!(matches!(
        err,
        DaqError::InvalidTransition {
            operation: "start_measure",
            status: CounterStatus::Running,
        }
    ));
    assert!(err.is_recoverable());
    assert_eq!(counter.get_status(), CounterStatus::Running);
    assert_eq!(backend.call_count(), calls);
    assert_eq!(backend.live_tasks(), 2);
}

#[test]
fn pause_continue_keeps_buffer() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-6);

    backend.push_samples(&[-1.0, -2.0]);
    assert_eq!(counter.get_data_trace().unwrap(), vec![1.0, 2.0]);

    assert_eq!(counter.pause_measure().unwrap(), CounterStatus::Paused);
    assert_eq!(backend.running_tasks(), 0);
    assert_eq!(backend.live_tasks(), 2);

    assert_eq!(counter.continue_measure().unwrap(), CounterStatus::Running);
    assert_eq!(backend.running_tasks(), 2);

    backend.push_samples(&[-1.0, -1.0]);
    assert_eq!(counter.get_data_trace().unwrap(), vec![2.0, 3.0]);
}

#[test]
fn stop_is_idempotent() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);

    assert_eq!(counter.stop_measure().unwrap(), CounterStatus::Idle);
    assert_eq!(backend.live_tasks(), 0);
    let calls = backend.call_count();

    assert_eq!(counter.stop_measure().unwrap(), CounterStatus::Idle);
    assert_eq!(backend.call_count(), calls);
    assert!(!counter.has_task_pair());
}

#[test]
fn stop_from_paused_releases_tasks() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);
    counter.pause_measure().unwrap();

    assert_eq!(counter.stop_measure().unwrap(), CounterStatus::Idle);
    assert_eq!(backend.live_tasks(), 0);
    assert_eq!(counter.start_measure().unwrap(), CounterStatus::Running);
}

#[test]
fn continue_from_idle_is_noop() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);
    counter
        .configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap())
        .unwrap();

    let err = counter.continue_measure().unwrap_err();
    assert!(matches!(
        err,
        DaqError::InvalidTransition {
            status: CounterStatus::Idle,
            ..
        }
    ));
    assert_eq!(counter.get_status(), CounterStatus::Idle);
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn pause_when_not_running_is_rejected() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);
    assert!(counter.pause_measure().is_err());
    assert_eq!(counter.get_status(), CounterStatus::Unconfigured);
    assert_eq!(backend.call_count(), 0);
}

#[test]
fn pause_failure_keeps_acquisition_running() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);

    backend.fail_next(MockOp::StopTask);
    assert!(matches!(counter.pause_measure(), Err(DaqError::Driver(_))));
    assert_eq!(counter.get_status(), CounterStatus::Running);
    assert_eq!(backend.running_tasks(), 2);

    assert_eq!(counter.pause_measure().unwrap(), CounterStatus::Paused);
    assert_eq!(backend.running_tasks(), 0);
}

#[test]
fn coarser_bin_request_uses_hardware_binwidth() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);

    let config = counter
        .configure(AcquisitionConfig::new(1e-6, 1e-3, 0).unwrap())
        .unwrap();
    assert_eq!(config.number_of_bins(), 2000);
    assert_eq!(
        config.timetrace_length(),
        config.number_of_bins() as f64 * counter.get_binwidth()
    );

    counter.start_measure().unwrap();
    assert!(backend.calls().iter().any(|call| matches!(
        call,
        TaskCall::ConfigureImplicitTiming { samples_per_channel: 2000, .. }
    )));
}

// =============================================================================
// Data
// =============================================================================

#[test]
fn two_chunks_are_summed() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 2e-6);

    backend.push_samples(&[-1.0, -2.0, -3.0, -4.0]);
    assert_eq!(counter.get_data_trace().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

    backend.push_samples(&[-0.5, -0.5, -0.5, -0.5]);
    assert_eq!(counter.get_data_trace().unwrap(), vec![1.5, 2.5, 3.5, 4.5]);
}

#[test]
fn two_chunks_in_one_read_are_summed() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-6);

    backend.push_samples(&[-1.0, -2.0, -3.0, -4.0]);
    assert_eq!(counter.get_data_trace().unwrap(), vec![4.0, 6.0]);
}

#[test]
fn restart_zeroes_buffer() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-6);
    backend.push_samples(&[-1.0, -1.0]);
    counter.get_data_trace().unwrap();

    counter.stop_measure().unwrap();
    assert_eq!(counter.get_data_trace().unwrap(), vec![1.0, 1.0]);

    counter.start_measure().unwrap();
    assert_eq!(counter.get_data_trace().unwrap(), vec![0.0, 0.0]);
}

// =============================================================================
// Hardware Sequencing
// =============================================================================

#[test]
fn falling_edge_reaches_trigger_task() {
    for (setting, expected) in [
        ("falling", TriggerEdge::Falling),
        ("rising", TriggerEdge::Rising),
        ("sideways", TriggerEdge::Rising),
    ] {
        let backend = MockTaskBackend::new();
        let mut counter = FastCounterController::new(settings(setting), backend.clone()).unwrap();
        counter
            .configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap())
            .unwrap();
        counter.start_measure().unwrap();

        let edges: Vec<TriggerEdge> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TaskCall::ConfigureStartTrigger { edge, .. } => Some(edge),
                _ => None,
            })
            .collect();
        assert_eq!(edges, vec![expected], "setting {setting:?}");
    }
}

#[test]
fn start_failure_releases_tasks() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);
    counter
        .configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap())
        .unwrap();

    backend.fail_nth(MockOp::StartTask, 2);
    assert!(counter.start_measure().is_err());
    assert_eq!(counter.get_status(), CounterStatus::Idle);
    assert_eq!(backend.live_tasks(), 0);
    assert!(!counter.has_task_pair());

    assert_eq!(counter.start_measure().unwrap(), CounterStatus::Running);
}

#[test]
fn creation_failure_keeps_status() {
    let backend = MockTaskBackend::new();
    let mut counter = counter(&backend);
    counter
        .configure(AcquisitionConfig::new(0.5e-6, 1e-3, 0).unwrap())
        .unwrap();

    backend.fail_next(MockOp::CreateCoPulseChannel);
    assert!(counter.start_measure().is_err());
    assert_eq!(counter.get_status(), CounterStatus::Idle);
    assert_eq!(backend.live_tasks(), 0);
}

#[test]
fn close_releases_everything() {
    let backend = MockTaskBackend::new();
    let mut counter = running_counter(&backend, 1e-3);
    counter.close().unwrap();
    counter.close().unwrap();
    assert_eq!(backend.live_tasks(), 0);
    assert_eq!(counter.get_status(), CounterStatus::Idle);
}
