//! SCPI transports.
//!
//! [`ScpiTransport`] is the line-oriented command channel the source driver
//! talks through. Two implementations reach real instruments:
//!
//! - [`TcpTransport`]: raw SCPI socket (`TCPIP0::<host>::<port>::SOCKET`,
//!   port 5025 on Keysight sources), no VISA library required
//! - `VisaTransport` (feature `visa`): any VISA resource string, e.g.
//!   `USB0::0x0957::0x1F01::MY12345678::INSTR`
//!
//! Commands are terminated with `\n`; replies are read up to the next `\n`
//! and trimmed.

use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{KeysightError, Result};

const VISA_INTERFACES: &[&str] = &["TCPIP", "USB", "GPIB", "ASRL", "VXI", "PXI"];

// =============================================================================
// Transport Trait
// =============================================================================

/// Line-oriented SCPI command channel.
pub trait ScpiTransport: Send {
    /// Send a command that produces no reply.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Send a query and return the trimmed reply line.
    fn query(&mut self, command: &str) -> Result<String>;

    /// Release the connection. Further calls fail with [`KeysightError::Closed`].
    fn close(&mut self) -> Result<()>;
}

impl ScpiTransport for Box<dyn ScpiTransport> {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// =============================================================================
// Resource Addresses
// =============================================================================

/// Parsed instrument address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
    /// Raw SCPI socket.
    Socket {
        /// Host name or IP address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Any other VISA resource string, passed through unchanged.
    Visa(String),
}

impl ResourceAddress {
    /// Parse a VISA-style resource string.
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |message: &str| KeysightError::InvalidAddress {
            address: address.to_string(),
            message: message.to_string(),
        };

        let trimmed = address.trim();
        let parts: Vec<&str> = trimmed.split("::").collect();
        if parts.len() < 2 {
            return Err(invalid("expected '::'-separated VISA resource string"));
        }
        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(invalid("empty address field"));
        }

        let interface = parts[0].to_ascii_uppercase();
        let family = interface.trim_end_matches(|c: char| c.is_ascii_digit());
        if !VISA_INTERFACES.contains(&family) {
            return Err(invalid("unknown interface type"));
        }

        let is_socket = parts
            .last()
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case("SOCKET"));
        if family == "TCPIP" && is_socket {
            if parts.len() != 4 {
                return Err(invalid("socket address must be TCPIP<n>::<host>::<port>::SOCKET"));
            }
            let port = parts[2]
                .parse::<u16>()
                .map_err(|_| invalid("port is not a number in 0..=65535"))?;
            return Ok(Self::Socket {
                host: parts[1].to_string(),
                port,
            });
        }

        Ok(Self::Visa(trimmed.to_string()))
    }
}

impl FromStr for ResourceAddress {
    type Err = KeysightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket { host, port } => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
            Self::Visa(resource) => write!(f, "{}", resource),
        }
    }
}

/// Open a transport for `address`.
///
/// Socket addresses always work; other resources need the `visa` feature.
pub fn open_transport(
    address: &ResourceAddress,
    timeout: Duration,
) -> daq_core::AppResult<Box<dyn ScpiTransport>> {
    match address {
        ResourceAddress::Socket { host, port } => {
            Ok(Box::new(TcpTransport::connect(host, *port, timeout)?))
        }
        #[cfg(feature = "visa")]
        ResourceAddress::Visa(resource) => {
            Ok(Box::new(crate::visa::VisaTransport::open(resource, timeout)?))
        }
        #[cfg(not(feature = "visa"))]
        ResourceAddress::Visa(_) => Err(daq_core::DaqError::FeatureNotEnabled(
            "visa".to_string(),
        )),
    }
}

// =============================================================================
// Raw Socket Transport
// =============================================================================

/// SCPI over a raw TCP socket.
pub struct TcpTransport {
    stream: Option<BufReader<TcpStream>>,
    peer: String,
}

impl TcpTransport {
    /// Connect to `host:port`. `timeout` bounds the connect and every read
    /// and write.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        let connect_err = |message: String| KeysightError::Connect {
            address: peer.clone(),
            message,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?;

        let mut last_error = String::from("address resolved to nothing");
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        let stream = connected.ok_or_else(|| connect_err(last_error))?;

        stream
            .set_read_timeout(Some(timeout))
            .and_then(|_| stream.set_write_timeout(Some(timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| connect_err(e.to_string()))?;

        info!(peer = %peer, "Connected to SCPI socket");
        Ok(Self {
            stream: Some(BufReader::new(stream)),
            peer,
        })
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(KeysightError::Closed)
    }
}

impl ScpiTransport for TcpTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        debug!(command, "SCPI write");
        let stream = self.stream()?.get_mut();
        stream
            .write_all(format!("{}\n", command).as_bytes())
            .and_then(|_| stream.flush())
            .map_err(|e| match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => KeysightError::Timeout {
                    command: command.to_string(),
                },
                _ => KeysightError::io(command, e),
            })
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let mut line = String::new();
        match self.stream()?.read_line(&mut line) {
            Ok(0) => Err(KeysightError::Closed),
            Ok(_) => {
                let reply = line.trim().to_string();
                debug!(command, reply = %reply, "SCPI reply");
                Ok(reply)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(KeysightError::Timeout {
                    command: command.to_string(),
                })
            }
            Err(e) => Err(KeysightError::io(command, e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!(peer = %self.peer, "Closing SCPI socket");
            match stream.get_ref().shutdown(Shutdown::Both) {
                Ok(()) => {}
                // peer already gone
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => return Err(KeysightError::io("close", e)),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("peer", &self.peer)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_socket_address() {
        let address = ResourceAddress::parse("TCPIP0::192.168.1.20::5025::SOCKET").unwrap();
        assert_eq!(
            address,
            ResourceAddress::Socket {
                host: "192.168.1.20".into(),
                port: 5025,
            }
        );
        assert_eq!(address.to_string(), "TCPIP0::192.168.1.20::5025::SOCKET");
    }

    #[test]
    fn test_parse_visa_addresses() {
        for resource in [
            "USB0::0x0957::0x1F01::MY12345678::INSTR",
            "GPIB0::19::INSTR",
            "TCPIP0::192.168.1.20::inst0::INSTR",
        ] {
            assert_eq!(
                resource.parse::<ResourceAddress>().unwrap(),
                ResourceAddress::Visa(resource.into())
            );
        }
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        for address in [
            "",
            "192.168.1.20",
            "TCPIP0::192.168.1.20::notaport::SOCKET",
            "TCPIP0::192.168.1.20::SOCKET",
            "FOO0::1::INSTR",
            "GPIB0::::INSTR",
        ] {
            assert!(
                matches!(
                    ResourceAddress::parse(address),
                    Err(KeysightError::InvalidAddress { .. })
                ),
                "address {address:?}"
            );
        }
    }

    #[cfg(not(feature = "visa"))]
    #[test]
    fn test_visa_requires_feature() {
        let address = ResourceAddress::Visa("GPIB0::19::INSTR".into());
        assert!(matches!(
            open_transport(&address, Duration::from_millis(100)),
            Err(daq_core::DaqError::FeatureNotEnabled(_))
        ));
    }

    #[test]
    fn test_tcp_query_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(socket.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, ":OUTP:STAT OFF\n");
            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            socket
                .write_all(b"Keysight Technologies,N5172B,MY123,B.01.86\n")
                .unwrap();
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest);
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        transport.write(":OUTP:STAT OFF").unwrap();
        assert_eq!(
            transport.query("*IDN?").unwrap(),
            "Keysight Technologies,N5172B,MY123,B.01.86"
        );
        transport.close().unwrap();
        assert!(matches!(transport.query("*IDN?"), Err(KeysightError::Closed)));
        server.join().unwrap();
    }

    #[test]
    fn test_tcp_query_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut rest = Vec::new();
            let _ = socket.read_to_end(&mut rest);
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_millis(100)).unwrap();
        assert!(matches!(
            transport.query(":FREQ?"),
            Err(KeysightError::Timeout { .. })
        ));
        transport.close().unwrap();
        server.join().unwrap();
    }
}
