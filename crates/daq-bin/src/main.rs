//! `hwctl`: load a hardware config and drive the fast counter or microwave source.
//!
//! ```text
//! hwctl list --config hardware.toml
//! hwctl count --config hardware.toml --device counter --bin-width 0.5e-6 --record-length 2e-3
//! hwctl microwave --config hardware.toml --device mw_source cw --frequency 2.87e9 --power -10
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use daq_core::{
    AcquisitionConfig, DeviceComponents, DriverRegistry, FastCounter, FrequencyReadback,
    HardwareConfig, MicrowaveSource,
};
use daq_driver_keysight::KeysightFactory;
use daq_driver_ni::NiFastCounterFactory;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwctl")]
#[command(about = "NI fast counter and Keysight microwave source control", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured devices and their capabilities
    List {
        /// Hardware configuration file
        #[arg(long)]
        config: PathBuf,
        /// Build every enabled device and print what it reports
        #[arg(long)]
        build: bool,
    },
    /// Run one fast-counter acquisition and print a trace summary
    Count {
        /// Hardware configuration file
        #[arg(long)]
        config: PathBuf,
        /// Device id of the fast counter
        #[arg(long)]
        device: String,
        /// Bin width in seconds
        #[arg(long, default_value_t = 0.5e-6)]
        bin_width: f64,
        /// Record length in seconds
        #[arg(long, default_value_t = 1e-3)]
        record_length: f64,
        /// Number of trace reads before stopping
        #[arg(long, default_value_t = 10)]
        polls: u32,
        /// Delay between trace reads
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
    /// Query or set the microwave source
    Microwave {
        /// Hardware configuration file
        #[arg(long)]
        config: PathBuf,
        /// Device id of the microwave source
        #[arg(long)]
        device: String,
        #[command(subcommand)]
        action: MicrowaveAction,
    },
}

#[derive(Subcommand)]
enum MicrowaveAction {
    /// Print mode, output state, frequency and power
    Status,
    /// Switch on in CW mode. The output goes off again when hwctl exits.
    Cw {
        /// Frequency in Hz
        #[arg(long)]
        frequency: f64,
        /// Power in dBm
        #[arg(long, allow_negative_numbers = true)]
        power: f64,
        /// Keep the output on this long before exiting
        #[arg(long, default_value_t = 0)]
        hold_ms: u64,
    },
    /// Switch the output off
    Off,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::List { config, build } => {
            let config = load_config(&config, cli.json)?;
            list_devices(&config)?;
            if build {
                build_devices(&config)?;
            }
            Ok(())
        }
        Commands::Count {
            config,
            device,
            bin_width,
            record_length,
            polls,
            interval_ms,
        } => {
            let config = load_config(&config, cli.json)?;
            run_count(
                &config,
                &device,
                bin_width,
                record_length,
                polls,
                Duration::from_millis(interval_ms),
            )
        }
        Commands::Microwave {
            config,
            device,
            action,
        } => {
            let config = load_config(&config, cli.json)?;
            run_microwave(&config, &device, action)
        }
    }
}

/// Load the config, then start logging with its `log_level` unless `RUST_LOG` is set.
fn load_config(path: &Path, json: bool) -> Result<HardwareConfig> {
    let config = HardwareConfig::load_from(path)
        .with_context(|| format!("loading hardware config {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(path = %path.display(), devices = config.devices.len(), "Loaded hardware config");
    Ok(config)
}

fn registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register_factory(NiFastCounterFactory);
    registry.register_factory(KeysightFactory);
    registry
}

fn build_device(config: &HardwareConfig, id: &str) -> Result<DeviceComponents> {
    let device = config
        .device(id)
        .ok_or_else(|| anyhow!("no device '{}' in config", id))?;
    if !device.enabled {
        warn!(device = id, "Device is disabled in config, building anyway");
    }
    registry()
        .build(device)
        .with_context(|| format!("building device '{}'", id))
}

// =============================================================================
// list
// =============================================================================

fn list_devices(config: &HardwareConfig) -> Result<()> {
    let registry = registry();
    println!("{:<16} {:<18} {:<8} CAPABILITIES", "ID", "TYPE", "ENABLED");
    for device in &config.devices {
        let capabilities = match registry.factory(&device.r#type) {
            Some(factory) => {
                if let Err(e) = factory.validate(&device.config) {
                    warn!(device = %device.id, error = %e, "Invalid device config");
                }
                factory
                    .capabilities()
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            None => "unknown driver type".to_string(),
        };
        println!(
            "{:<16} {:<18} {:<8} {}",
            device.id, device.r#type, device.enabled, capabilities
        );
    }
    Ok(())
}

fn build_devices(config: &HardwareConfig) -> Result<()> {
    let devices = registry()
        .build_enabled(config)
        .context("building enabled devices")?;
    println!();
    for (id, components) in devices {
        println!(
            "{:<16} {}",
            id,
            components.description.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// =============================================================================
// count
// =============================================================================

fn run_count(
    config: &HardwareConfig,
    id: &str,
    bin_width: f64,
    record_length: f64,
    polls: u32,
    interval: Duration,
) -> Result<()> {
    let mut counter: Box<dyn FastCounter + Send> = build_device(config, id)?
        .fast_counter
        .ok_or_else(|| anyhow!("device '{}' is not a fast counter", id))?;

    let acquisition = AcquisitionConfig::new(bin_width, record_length, 0)?;
    let applied = counter.configure(acquisition)?;
    info!(
        bins = applied.number_of_bins(),
        bin_width_s = applied.bin_width_s(),
        "Counter configured"
    );

    counter.start_measure()?;
    let mut trace = Vec::new();
    for poll in 0..polls {
        thread::sleep(interval);
        match counter.get_data_trace() {
            Ok(data) => trace = data,
            Err(e) => {
                warn!(poll, error = %e, "Reading trace failed, stopping");
                counter.stop_measure()?;
                counter.close()?;
                return Err(e.into());
            }
        }
    }
    counter.stop_measure()?;
    counter.close()?;

    print_trace_summary(&trace, counter.get_binwidth());
    Ok(())
}

fn print_trace_summary(trace: &[f64], bin_width: f64) {
    let total: f64 = trace.iter().sum();
    let (peak_bin, peak) = trace
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0.0_f64), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    let mean = if trace.is_empty() {
        0.0
    } else {
        total / trace.len() as f64
    };

    println!("bins:      {}", trace.len());
    println!("bin width: {:e} s", bin_width);
    println!("sum:       {:.6}", total);
    println!("mean:      {:.6}", mean);
    println!("peak:      {:.6} at bin {}", peak, peak_bin);
}

// =============================================================================
// microwave
// =============================================================================

fn run_microwave(config: &HardwareConfig, id: &str, action: MicrowaveAction) -> Result<()> {
    let mut source = build_device(config, id)?
        .microwave_source
        .ok_or_else(|| anyhow!("device '{}' is not a microwave source", id))?;

    let result = match action {
        MicrowaveAction::Status => print_status(source.as_mut()),
        MicrowaveAction::Cw {
            frequency,
            power,
            hold_ms,
        } => run_cw(source.as_mut(), frequency, power, Duration::from_millis(hold_ms)),
        MicrowaveAction::Off => source
            .off()
            .map(|()| println!("output off"))
            .map_err(anyhow::Error::from),
    };

    source.close()?;
    result
}

fn print_status(source: &mut (dyn MicrowaveSource + Send)) -> Result<()> {
    let (mode, running) = source.get_status()?;
    println!("mode:      {}", mode);
    println!("output:    {}", if running { "on" } else { "off" });
    println!("power:     {} dBm", source.get_power()?);
    match source.get_frequency() {
        Ok(FrequencyReadback::Cw { frequency }) => println!("frequency: {:e} Hz", frequency),
        Ok(FrequencyReadback::Sweep { start, stop, step }) => {
            println!("sweep:     {:e} .. {:e} Hz, step {:e} Hz", start, stop, step)
        }
        Err(e) if e.is_recoverable() => println!("frequency: unavailable ({})", e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn run_cw(
    source: &mut (dyn MicrowaveSource + Send),
    frequency: f64,
    power: f64,
    hold: Duration,
) -> Result<()> {
    let cw = source.set_cw(frequency, power)?;
    source.cw_on()?;
    println!("CW on at {:e} Hz, {} dBm", cw.frequency, cw.power);
    if !hold.is_zero() {
        info!(hold_ms = hold.as_millis() as u64, "Holding output on");
        thread::sleep(hold);
    }
    Ok(())
}
