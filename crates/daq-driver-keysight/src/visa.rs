//! VISA session transport (feature `visa`).

use std::ffi::CString;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use tracing::{debug, info};
use visa_rs::prelude::*;

use crate::error::{KeysightError, Result};
use crate::transport::ScpiTransport;

/// SCPI over a VISA session.
pub struct VisaTransport {
    resource: String,
    instrument: Option<Instrument>,
    // closing the resource manager closes every session opened through it
    _rm: DefaultRM,
}

impl VisaTransport {
    /// Open `resource` through the default resource manager.
    pub fn open(resource: &str, timeout: Duration) -> Result<Self> {
        let connect_err = |message: String| KeysightError::Connect {
            address: resource.to_string(),
            message,
        };

        let rm = DefaultRM::new().map_err(|e| connect_err(e.to_string()))?;
        let name = CString::new(resource).map_err(|e| KeysightError::InvalidAddress {
            address: resource.to_string(),
            message: e.to_string(),
        })?;
        let instrument = rm
            .open(&VisaString::from(name), AccessMode::NO_LOCK, timeout)
            .map_err(|e| connect_err(e.to_string()))?;

        info!(resource, "Opened VISA session");
        Ok(Self {
            resource: resource.to_string(),
            instrument: Some(instrument),
            _rm: rm,
        })
    }

    fn instrument(&mut self) -> Result<&mut Instrument> {
        self.instrument.as_mut().ok_or(KeysightError::Closed)
    }
}

impl ScpiTransport for VisaTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        debug!(command, "VISA write");
        self.instrument()?
            .write_all(format!("{}\n", command).as_bytes())
            .map_err(|e| KeysightError::io(command, e))
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let instrument = self.instrument()?;
        let mut line = String::new();
        BufReader::new(&*instrument)
            .read_line(&mut line)
            .map_err(|e| KeysightError::io(command, e))?;
        let reply = line.trim().to_string();
        debug!(command, reply = %reply, "VISA reply");
        Ok(reply)
    }

    fn close(&mut self) -> Result<()> {
        if self.instrument.take().is_some() {
            debug!(resource = %self.resource, "Closed VISA session");
        }
        Ok(())
    }
}

impl std::fmt::Debug for VisaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisaTransport")
            .field("resource", &self.resource)
            .field("open", &self.instrument.is_some())
            .finish()
    }
}
