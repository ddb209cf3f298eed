//! Keysight microwave source driver.
//!
//! Drives Keysight/Agilent signal generators (N5172B EXG and compatible) in
//! CW, list and step-sweep modes through SCPI. The instrument is reached over
//! a raw SCPI socket or, with feature `visa`, any VISA resource.
//!
//! # Example
//!
//! ```
//! use daq_core::MicrowaveSource;
//! use daq_driver_keysight::{KeysightSettings, KeysightSource, MockTransport};
//!
//! # fn main() -> daq_core::AppResult<()> {
//! let settings = KeysightSettings::new("TCPIP0::192.168.1.20::5025::SOCKET");
//! let mut source = KeysightSource::connect(MockTransport::default(), &settings)?;
//!
//! let cw = source.set_cw(2.87e9, -10.0)?;
//! assert_eq!(cw.frequency, 2.87e9);
//! source.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `visa`: open non-socket addresses through `visa-rs` (needs a VISA library)

pub mod config;
pub mod error;
pub mod factory;
pub mod mock;
pub mod source;
pub mod transport;
#[cfg(feature = "visa")]
pub mod visa;

pub use config::KeysightSettings;
pub use error::{KeysightError, Result};
pub use factory::KeysightFactory;
pub use mock::MockTransport;
pub use source::{limits_for_model, KeysightSource};
pub use transport::{open_transport, ResourceAddress, ScpiTransport, TcpTransport};
#[cfg(feature = "visa")]
pub use visa::VisaTransport;
