//! Integration tests for the `hwctl` binary.
//!
//! Every test runs the built binary against a temporary config with
//! simulated devices, so no hardware is needed.
//!
//! Run with: cargo test -p daq-bin --test integration_tests

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const CONFIG: &str = r#"
log_level = "warn"

[[devices]]
id = "counter"
type = "ni_fast_counter"

[devices.config]
clock_channel = "/Dev1/Ctr0"
input_channel = "/Dev1/AI0"
trigger_channel = "/Dev1/PFI0"
trigger_edge = "rising"
mock = true

[[devices]]
id = "mw_source"
type = "keysight_mw"

[devices.config]
address = "TCPIP0::192.168.1.20::5025::SOCKET"
mock = true

[[devices]]
id = "spare"
type = "keysight_mw"
enabled = false

[devices.config]
address = "GPIB0::19::INSTR"
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn hwctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hwctl"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute hwctl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn test_help_lists_subcommands() {
    let output = hwctl(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["list", "count", "microwave"] {
        assert!(text.contains(command), "help should mention {command}");
    }
}

#[test]
fn test_missing_config_fails() {
    let output = hwctl(&["list", "--config", "/nonexistent/hardware.toml"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("loading hardware config"));
}

// =============================================================================
// list
// =============================================================================

#[test]
fn test_list_shows_devices_and_capabilities() {
    let config = config_file(CONFIG);
    let path = config.path().to_str().unwrap();

    let output = hwctl(&["list", "--config", path]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("counter"));
    assert!(text.contains("ni_fast_counter"));
    assert!(text.contains("Fast Counter"));
    assert!(text.contains("mw_source"));
    assert!(text.contains("Microwave Source"));
    assert!(text.contains("false"), "disabled device should be listed");
}

#[test]
fn test_list_build_constructs_enabled_devices() {
    let config = config_file(CONFIG);
    let output = hwctl(&["list", "--build", "--config", config.path().to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Keysight N5172B"), "stdout: {text}");
    assert!(text.contains("[mock]"));
}

#[test]
fn test_duplicate_ids_rejected() {
    let config = config_file(
        r#"
[[devices]]
id = "a"
type = "keysight_mw"

[[devices]]
id = "a"
type = "keysight_mw"
"#,
    );
    let output = hwctl(&["list", "--config", config.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Duplicate device ID"));
}

// =============================================================================
// count
// =============================================================================

#[test]
fn test_count_prints_trace_summary() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "count",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "counter",
        "--bin-width",
        "1e-6",
        "--record-length",
        "1e-4",
        "--polls",
        "3",
        "--interval-ms",
        "5",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("bins:      200"), "stdout: {text}");
    assert!(text.contains("peak:"));
}

#[test]
fn test_count_on_microwave_device_fails() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "count",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "mw_source",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("is not a fast counter"));
}

#[test]
fn test_count_rejects_bad_bin_width() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "count",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "counter",
        "--bin-width",
        "0",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("bin_width_s"));
}

// =============================================================================
// microwave
// =============================================================================

#[test]
fn test_microwave_status() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "microwave",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "mw_source",
        "status",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("mode:"));
    assert!(text.contains("output:    off"));
    assert!(text.contains("frequency:"));
}

#[test]
fn test_microwave_cw() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "microwave",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "mw_source",
        "cw",
        "--frequency",
        "2.87e9",
        "--power",
        "-10",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("CW on at 2.87e9 Hz, -10 dBm"));
}

#[test]
fn test_microwave_cw_out_of_range_fails() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "microwave",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "mw_source",
        "cw",
        "--frequency",
        "50e9",
        "--power",
        "0",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_unknown_device_fails() {
    let config = config_file(CONFIG);
    let output = hwctl(&[
        "microwave",
        "--config",
        config.path().to_str().unwrap(),
        "--device",
        "nope",
        "off",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no device 'nope'"));
}
