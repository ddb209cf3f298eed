//! Keysight microwave source over SCPI.
//!
//! Mode mapping used by [`MicrowaveSource::get_status`]:
//!
//! | `:FREQ:MODE?` | `:LIST:TYPE?` | mode |
//! |---|---|---|
//! | `LIST` | `LIST` | list |
//! | `LIST` | `STEP` | sweep |
//! | `CW` / `FIX` | any | cw |
//!
//! List mode writes the first frequency twice, so `n` requested frequencies
//! occupy `n + 1` list entries. The first trigger after arming lands on the
//! duplicate and the following `n` triggers step through the request.

use std::thread;
use std::time::{Duration, Instant};

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::{LIST_DWELL, OUTPUT_POLL_INTERVAL};
use daq_core::{
    CwSetting, FrequencyReadback, ListSetting, MicrowaveLimits, MicrowaveMode, MicrowaveSource,
    SweepSetting, TriggerEdge,
};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::config::KeysightSettings;
use crate::error::KeysightError;
use crate::transport::ScpiTransport;

/// Model with its own limit table.
pub const N5172B: &str = "N5172B";

/// Limits for a model string as reported in `*IDN?`.
///
/// Unknown models get the conservative default table and a warning.
pub fn limits_for_model(model: &str) -> MicrowaveLimits {
    let mut limits = MicrowaveLimits {
        supported_modes: vec![MicrowaveMode::Cw, MicrowaveMode::List, MicrowaveMode::Sweep],
        min_frequency: 300e3,
        max_frequency: 6.4e9,
        min_power: -144.0,
        max_power: 10.0,
        list_minstep: 0.1,
        list_maxstep: 6.4e9,
        list_maxentries: 4000,
        sweep_minstep: 0.1,
        sweep_maxstep: 6.4e9,
        sweep_maxentries: 10001,
    };

    if model.trim() == N5172B {
        limits.min_frequency = 9e3;
        limits.max_frequency = 6.0e9;
        limits.min_power = -127.0;
        limits.max_power = 9.0;
        limits.list_maxentries = 3201;
        limits.sweep_maxentries = 65535;
    } else {
        warn!(model, "Model string unknown, hardware limits may be wrong");
    }
    limits.list_maxstep = limits.max_frequency;
    limits.sweep_maxstep = limits.max_frequency;
    limits
}

/// Keysight signal generator (N5172B, E8257D, ...).
pub struct KeysightSource<T: ScpiTransport> {
    transport: T,
    model: String,
    limits: MicrowaveLimits,
    trigger: String,
    timeout: Duration,
    poll_interval: Duration,
    closed: bool,
    span: Span,
}

impl<T: ScpiTransport> KeysightSource<T> {
    /// Identify the instrument behind `transport` and load its limits.
    pub fn connect(transport: T, settings: &KeysightSettings) -> AppResult<Self> {
        let span = info_span!("keysight_mw", address = %settings.address);
        let mut transport = transport;

        let idn = {
            let _enter = span.enter();
            transport.query("*IDN?")?
        };
        let model = idn
            .split(',')
            .nth(1)
            .map(|field| field.trim().to_string())
            .filter(|field| !field.is_empty())
            .ok_or_else(|| KeysightError::parse("*IDN?", &idn))?;

        let limits = {
            let _enter = span.enter();
            info!(model = %model, "Keysight source connected");
            limits_for_model(&model)
        };

        Ok(Self {
            transport,
            model,
            limits,
            trigger: settings.trigger.clone(),
            timeout: settings.timeout(),
            poll_interval: OUTPUT_POLL_INTERVAL,
            closed: false,
            span,
        })
    }

    /// Interval between output-state polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Model field of the `*IDN?` reply.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Trigger input used for list and sweep stepping.
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    fn write(&mut self, command: &str) -> AppResult<()> {
        Ok(self.transport.write(command)?)
    }

    fn query_f64(&mut self, command: &str) -> AppResult<f64> {
        let reply = self.transport.query(command)?;
        reply
            .trim()
            .parse::<f64>()
            .map_err(|_| KeysightError::parse(command, &reply).into())
    }

    fn query_word(&mut self, command: &str) -> AppResult<String> {
        Ok(self.transport.query(command)?.trim().to_ascii_lowercase())
    }

    fn switch_output(&mut self, on: bool) -> AppResult<()> {
        self.write(if on { ":OUTP:STAT ON" } else { ":OUTP:STAT OFF" })?;
        self.wait_for_output(on)
    }

    fn wait_for_output(&mut self, on: bool) -> AppResult<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let (_, running) = self.get_status()?;
            if running == on {
                return Ok(());
            }
            if Instant::now() >= deadline {
                error!(expected = on, "Output state did not settle");
                return Err(DaqError::Timeout(format!(
                    "output did not switch {} within {:?}",
                    if on { "on" } else { "off" },
                    self.timeout
                )));
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn off_if_running(&mut self) -> AppResult<()> {
        let (_, running) = self.get_status()?;
        if running {
            self.off()?;
        }
        Ok(())
    }
}

impl<T: ScpiTransport> MicrowaveSource for KeysightSource<T> {
    fn get_limits(&self) -> MicrowaveLimits {
        self.limits.clone()
    }

    fn off(&mut self) -> AppResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.switch_output(false)?;
        debug!("Output off");
        Ok(())
    }

    fn get_status(&mut self) -> AppResult<(MicrowaveMode, bool)> {
        let running = self.query_f64("OUTP:STAT?")? as i64 != 0;
        let freq_mode = self.query_word(":FREQ:MODE?")?;
        let list_type = self.query_word(":LIST:TYPE?")?;
        let mode = match (freq_mode.as_str(), list_type.as_str()) {
            ("list", "list") => MicrowaveMode::List,
            ("list", _) => MicrowaveMode::Sweep,
            _ => MicrowaveMode::Cw,
        };
        Ok((mode, running))
    }

    fn get_power(&mut self) -> AppResult<f64> {
        self.query_f64(":POWER?")
    }

    fn get_frequency(&mut self) -> AppResult<FrequencyReadback> {
        let (mode, _) = self.get_status()?;
        match mode {
            MicrowaveMode::Cw => Ok(FrequencyReadback::Cw {
                frequency: self.query_f64(":FREQ?")?,
            }),
            MicrowaveMode::Sweep => {
                let start = self.query_f64(":FREQ:STAR?")?;
                let stop = self.query_f64(":FREQ:STOP?")?;
                let step = self.query_f64(":SWE:FREQ:STEP:LIN?")?;
                Ok(FrequencyReadback::Sweep {
                    start: start + step,
                    stop,
                    step,
                })
            }
            MicrowaveMode::List => {
                let _enter = self.span.enter();
                error!("Frequency readback is not available in list mode");
                Err(DaqError::NotSupported(
                    "frequency readback in list mode".to_string(),
                ))
            }
        }
    }

    fn cw_on(&mut self) -> AppResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let (mode, running) = self.get_status()?;
        if running {
            if mode == MicrowaveMode::Cw {
                return Ok(());
            }
            self.off()?;
        }
        if mode != MicrowaveMode::Cw {
            self.write(":FREQ:MODE CW")?;
        }
        self.switch_output(true)?;
        info!("CW output on");
        Ok(())
    }

    fn set_cw(&mut self, frequency: f64, power: f64) -> AppResult<CwSetting> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.limits.check_frequency(frequency)?;
        self.limits.check_power(power)?;
        self.off_if_running()?;

        self.write(":FREQ:MODE CW")?;
        self.write(&format!(":FREQ {:e} Hz", frequency))?;
        self.write(&format!(":POWER {}", power))?;

        let (mode, _) = self.get_status()?;
        let frequency = match self.get_frequency()? {
            FrequencyReadback::Cw { frequency } => frequency,
            FrequencyReadback::Sweep { start, .. } => start,
        };
        let power = self.get_power()?;
        info!(frequency, power, "CW configured");
        Ok(CwSetting {
            frequency,
            power,
            mode,
        })
    }

    fn list_on(&mut self) -> AppResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.switch_output(true)?;
        info!("List output on");
        Ok(())
    }

    fn set_list(&mut self, frequencies: &[f64], power: f64) -> AppResult<ListSetting> {
        let span = self.span.clone();
        let _enter = span.enter();

        let Some(first) = frequencies.first() else {
            return Err(DaqError::Configuration(
                "frequency list must not be empty".to_string(),
            ));
        };
        let entries = frequencies.len() + 1;
        if entries > self.limits.list_maxentries {
            return Err(DaqError::Configuration(format!(
                "{} frequencies need {} list entries, instrument allows {}",
                frequencies.len(),
                entries,
                self.limits.list_maxentries
            )));
        }
        for frequency in frequencies {
            self.limits.check_frequency(*frequency)?;
        }
        self.limits.check_power(power)?;
        self.off_if_running()?;

        let list = std::iter::once(first)
            .chain(frequencies)
            .map(|f| format!("{}", f))
            .collect::<Vec<_>>()
            .join(",");

        self.write(":FREQ:MODE LIST")?;
        self.write(":LIST:TYPE LIST")?;
        self.write(&format!(":LIST:DWEL {} ms", LIST_DWELL.as_millis()))?;
        self.write(&format!(":LIST:FREQ {}", list))?;
        self.write(&format!(":POWER {}", power))?;

        let (mode, _) = self.get_status()?;
        let power = self.get_power()?;
        info!(entries, power, "Frequency list configured");
        Ok(ListSetting {
            frequencies: frequencies.to_vec(),
            power,
            mode,
        })
    }

    fn reset_listpos(&mut self) -> AppResult<()> {
        self.write(":LIST:MAN 1")?;
        self.write("*WAI")
    }

    fn sweep_on(&mut self) -> AppResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();
        self.switch_output(true)?;
        info!("Sweep output on");
        Ok(())
    }

    fn set_sweep(
        &mut self,
        start: f64,
        stop: f64,
        step: f64,
        power: f64,
    ) -> AppResult<SweepSetting> {
        let span = self.span.clone();
        let _enter = span.enter();

        self.limits.check_frequency(start)?;
        self.limits.check_frequency(stop)?;
        self.limits.check_power(power)?;
        if !(start < stop) {
            return Err(DaqError::Configuration(format!(
                "sweep start {} Hz must be below stop {} Hz",
                start, stop
            )));
        }
        if !(step >= self.limits.sweep_minstep && step <= self.limits.sweep_maxstep) {
            return Err(DaqError::Configuration(format!(
                "sweep step {} Hz outside [{}, {}] Hz",
                step, self.limits.sweep_minstep, self.limits.sweep_maxstep
            )));
        }
        let requested_points = ((stop - start) / step).round() as usize + 1;
        if requested_points > self.limits.sweep_maxentries {
            return Err(DaqError::Configuration(format!(
                "sweep of {} points exceeds the instrument maximum of {}",
                requested_points, self.limits.sweep_maxentries
            )));
        }
        self.off_if_running()?;

        self.write(":LIST:TYPE STEP")?;
        self.write(":FREQ:MODE LIST")?;
        self.write(&format!(":FREQ:STAR {:e} Hz", start))?;
        self.write(&format!(":FREQ:STOP {:e} Hz", stop))?;
        self.write(&format!(":SWE:FREQ:STEP:LIN {:e} Hz", step))?;
        self.write(&format!(":SWE:DWEL {} ms", LIST_DWELL.as_millis()))?;
        self.write(&format!(":POWER {}", power))?;

        let power = self.get_power()?;
        let points = self.query_f64(":SWE:POIN?")?.round().max(0.0) as usize;
        let (mode, _) = self.get_status()?;
        info!(start, stop, step, points, "Sweep configured");
        Ok(SweepSetting {
            start,
            stop,
            step,
            power,
            points,
            mode,
        })
    }

    fn reset_sweeppos(&mut self) -> AppResult<()> {
        self.write(":ABORT")
    }

    fn set_ext_trigger(&mut self, edge: TriggerEdge) -> AppResult<TriggerEdge> {
        let slope = match edge {
            TriggerEdge::Rising => "POS",
            TriggerEdge::Falling => "NEG",
        };
        let source = self.trigger.clone();
        self.write(&format!(":LIST:TRIG:EXT:SOUR {}", source))?;
        self.write(&format!(":LIST:TRIG:SLOP {}", slope))?;
        let _enter = self.span.enter();
        debug!(source = %source, edge = %edge, "External trigger configured");
        Ok(edge)
    }

    fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(err) = self.off() {
            let _enter = self.span.enter();
            warn!(error = %err, "Failed to switch output off while closing");
        }
        self.transport.close()?;
        let _enter = self.span.enter();
        info!("Keysight source closed");
        Ok(())
    }
}

impl<T: ScpiTransport> Drop for KeysightSource<T> {
    fn drop(&mut self) {
        if let Err(err) = MicrowaveSource::close(self) {
            warn!(error = %err, "Failed to close Keysight source on drop");
        }
    }
}

impl<T: ScpiTransport> std::fmt::Debug for KeysightSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeysightSource")
            .field("model", &self.model)
            .field("trigger", &self.trigger)
            .field("timeout", &self.timeout)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use tracing_test::traced_test;

    #[test]
    fn test_n5172b_limits() {
        let limits = limits_for_model(" N5172B");
        assert_eq!(limits.min_frequency, 9e3);
        assert_eq!(limits.max_frequency, 6.0e9);
        assert_eq!(limits.min_power, -127.0);
        assert_eq!(limits.max_power, 9.0);
        assert_eq!(limits.list_maxentries, 3201);
        assert_eq!(limits.sweep_maxentries, 65535);
        assert_eq!(limits.list_maxstep, 6.0e9);
        assert_eq!(limits.sweep_maxstep, 6.0e9);
    }

    #[traced_test]
    #[test]
    fn test_unknown_model_falls_back_with_warning() {
        let limits = limits_for_model("E8257D");
        assert_eq!(limits.min_frequency, 300e3);
        assert_eq!(limits.max_frequency, 6.4e9);
        assert_eq!(limits.list_maxentries, 4000);
        assert_eq!(limits.sweep_maxentries, 10001);
        assert!(logs_contain("Model string unknown"));
    }

    #[test]
    fn test_connect_reads_model() {
        let mock = MockTransport::new("N5172B");
        let source =
            KeysightSource::connect(mock.clone(), &KeysightSettings::new("GPIB0::19::INSTR"))
                .unwrap();
        assert_eq!(source.model(), "N5172B");
        assert_eq!(mock.commands(), vec!["*IDN?".to_string()]);
    }

    #[test]
    fn test_connect_rejects_garbled_idn() {
        let mock = MockTransport::new("N5172B");
        mock.push_reply("garbage");
        let err =
            KeysightSource::connect(mock, &KeysightSettings::new("GPIB0::19::INSTR")).unwrap_err();
        assert!(matches!(err, DaqError::Driver(_)));
    }

    #[test]
    fn test_drop_switches_off_and_closes() {
        let mock = MockTransport::new("N5172B");
        {
            let mut source =
                KeysightSource::connect(mock.clone(), &KeysightSettings::new("GPIB0::19::INSTR"))
                    .unwrap()
                    .with_poll_interval(Duration::ZERO);
            source.cw_on().unwrap();
            assert!(mock.output_on());
        }
        assert!(!mock.output_on());
        assert!(mock.is_closed());
    }
}
