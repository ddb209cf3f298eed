//! Simulated Keysight source.
//!
//! [`MockTransport`] interprets the SCPI subset the driver uses against an
//! in-memory instrument state and records every command it receives. Clones
//! share state, so a test can keep one handle for inspection.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{KeysightError, Result};
use crate::transport::ScpiTransport;

/// Model reported by a default mock.
pub const MOCK_MODEL: &str = "N5172B";

#[derive(Debug)]
struct Instrument {
    model: String,
    output_on: bool,
    /// output requested by the last :OUTP:STAT command
    output_target: bool,
    /// status queries left before the output follows its target
    settle_polls: usize,
    settle_delay: usize,
    stuck_output: bool,
    list_mode: bool,
    list_type_step: bool,
    frequency: f64,
    power: f64,
    start: f64,
    stop: f64,
    step: f64,
    list: Vec<f64>,
    trigger_source: String,
    trigger_slope: String,
    commands: Vec<String>,
    replies: VecDeque<String>,
    fail_next: Option<String>,
    closed: bool,
}

/// In-memory SCPI instrument.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<Instrument>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(MOCK_MODEL)
    }
}

impl MockTransport {
    /// Instrument reporting `model` in its `*IDN?` reply, output off, CW mode.
    pub fn new(model: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(Instrument {
                model: model.to_string(),
                output_on: false,
                output_target: false,
                settle_polls: 0,
                settle_delay: 0,
                stuck_output: false,
                list_mode: false,
                list_type_step: false,
                frequency: 2.87e9,
                power: -20.0,
                start: 2.8e9,
                stop: 2.9e9,
                step: 1e6,
                list: Vec::new(),
                trigger_source: "TRIG1".into(),
                trigger_slope: "POS".into(),
                commands: Vec::new(),
                replies: VecDeque::new(),
                fail_next: None,
                closed: false,
            })),
        }
    }

    /// Output state changes become visible only after `polls` status queries.
    pub fn with_settle_polls(self, polls: usize) -> Self {
        self.state.lock().settle_delay = polls;
        self
    }

    /// Output state never changes, whatever is commanded.
    pub fn with_stuck_output(self) -> Self {
        self.state.lock().stuck_output = true;
        self
    }

    /// Answer the next query with `reply` instead of the simulated value.
    pub fn push_reply(&self, reply: &str) {
        self.state.lock().replies.push_back(reply.to_string());
    }

    /// Fail the next command whose header starts with `prefix`.
    pub fn fail_next(&self, prefix: &str) {
        self.state.lock().fail_next = Some(prefix.to_ascii_uppercase());
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Commands that were writes (no trailing `?` in the header).
    pub fn writes(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| !header(c).ends_with('?'))
            .collect()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Simulated output state.
    pub fn output_on(&self) -> bool {
        self.state.lock().output_on
    }

    /// Frequency list last written.
    pub fn list(&self) -> Vec<f64> {
        self.state.lock().list.clone()
    }

    /// Trigger source and slope last written.
    pub fn trigger(&self) -> (String, String) {
        let state = self.state.lock();
        (state.trigger_source.clone(), state.trigger_slope.clone())
    }

    /// Whether [`ScpiTransport::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn handle(&self, command: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(KeysightError::Closed);
        }
        state.commands.push(command.to_string());

        let head = header(command).to_ascii_uppercase();
        if let Some(prefix) = state.fail_next.take() {
            if head.starts_with(&prefix) {
                return Err(KeysightError::io(command, "injected failure"));
            }
            state.fail_next = Some(prefix);
        }
        let arg = argument(command);

        if head.ends_with('?') {
            let simulated = state.query(&head, command)?;
            let reply = state.replies.pop_front().unwrap_or(simulated);
            debug!(command, reply = %reply, "Mock SCPI reply");
            return Ok(Some(reply));
        }

        state.apply(&head, arg, command)?;
        Ok(None)
    }
}

fn header(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

fn argument(command: &str) -> &str {
    command
        .trim()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}

fn number(command: &str, text: &str) -> Result<f64> {
    let value = text.split_whitespace().next().unwrap_or("");
    value
        .parse::<f64>()
        .map_err(|_| KeysightError::parse(command, text))
}

impl Instrument {
    fn query(&mut self, head: &str, command: &str) -> Result<String> {
        let head = head.trim_start_matches(':');
        let reply = match head {
            "*IDN?" => format!("Keysight Technologies,{},MY00000000,B.01.86", self.model),
            "OUTP:STAT?" => {
                if self.settle_polls > 0 {
                    self.settle_polls -= 1;
                } else if !self.stuck_output {
                    self.output_on = self.output_target;
                }
                if self.output_on { "1" } else { "0" }.to_string()
            }
            "FREQ:MODE?" => if self.list_mode { "LIST" } else { "CW" }.to_string(),
            "LIST:TYPE?" => if self.list_type_step { "STEP" } else { "LIST" }.to_string(),
            "FREQ?" => format!("{:E}", self.frequency),
            "POWER?" => format!("{:E}", self.power),
            "FREQ:STAR?" => format!("{:E}", self.start),
            "FREQ:STOP?" => format!("{:E}", self.stop),
            "SWE:FREQ:STEP:LIN?" => format!("{:E}", self.step),
            "SWE:POIN?" => {
                let points = ((self.stop - self.start) / self.step).round() + 1.0;
                format!("{}", points)
            }
            _ => return Err(KeysightError::io(command, "undefined header")),
        };
        Ok(reply)
    }

    fn apply(&mut self, head: &str, arg: &str, command: &str) -> Result<()> {
        let head = head.trim_start_matches(':');
        match head {
            "OUTP:STAT" => {
                let on = matches!(arg.to_ascii_uppercase().as_str(), "ON" | "1");
                if on != self.output_target || on != self.output_on {
                    self.settle_polls = self.settle_delay;
                }
                self.output_target = on;
            }
            "FREQ:MODE" => self.list_mode = arg.eq_ignore_ascii_case("LIST"),
            "LIST:TYPE" => self.list_type_step = arg.eq_ignore_ascii_case("STEP"),
            "FREQ" => self.frequency = number(command, arg)?,
            "POWER" => self.power = number(command, arg)?,
            "FREQ:STAR" => self.start = number(command, arg)?,
            "FREQ:STOP" => self.stop = number(command, arg)?,
            "SWE:FREQ:STEP:LIN" => self.step = number(command, arg)?,
            "LIST:FREQ" => {
                self.list = arg
                    .split(',')
                    .map(|value| number(command, value.trim()))
                    .collect::<Result<Vec<f64>>>()?;
            }
            "LIST:TRIG:EXT:SOUR" => self.trigger_source = arg.to_string(),
            "LIST:TRIG:SLOP" => self.trigger_slope = arg.to_string(),
            "LIST:DWEL" | "SWE:DWEL" | "LIST:MAN" | "*WAI" | "ABORT" => {}
            _ => return Err(KeysightError::io(command, "undefined header")),
        }
        Ok(())
    }
}

impl ScpiTransport for MockTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        self.handle(command).map(|_| ())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.handle(command)?
            .ok_or_else(|| KeysightError::parse(command, "<no reply to a write>"))
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}
