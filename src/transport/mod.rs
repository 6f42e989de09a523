// Byte transports to an instrument. A transport moves whole SCPI messages: `write` sends one
// command, and the reads consume the instrument's reply to it.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::config::SessionConfig;
use crate::error::TransportError;

pub mod loopback;
pub mod socket;
pub mod vxi11;
pub mod xdr;

pub const TERMINATOR:u8 = b'\n';

lazy_static! {
	static ref SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)::(\d+)::SOCKET$").unwrap();
	static ref INSTR_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:]+)(?:::([a-z]+\d+(?:,\d+)?))?(?:::INSTR)?$").unwrap();
	static ref OTHER_RE: Regex = Regex::new(r"(?i)^(USB|GPIB|ASRL|PXI|VXI)\d*::").unwrap();
}

pub trait Transport {

	fn write(&mut self, command:&str) -> Result<(), TransportError>;

	/// Read up to `max_bytes` of the current reply. Fewer bytes come back only when the reply
	/// ended, and an empty vector means nothing of it is left.
	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError>;

	/// Read through the next terminator (included) or to the end of the reply.
	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError>;
}

impl<T:Transport + ?Sized> Transport for Box<T> {
	fn write(&mut self, command:&str) -> Result<(), TransportError> { (**self).write(command) }
	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError> { (**self).read_raw(max_bytes) }
	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> { (**self).read_until_terminator() }
}

/// A parsed VISA resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
	/// `TCPIP::host[::inst0][::INSTR]`
	Vxi11 { host:String, device:String },
	/// `TCPIP::host::port::SOCKET`
	Socket { host:String, port:u16 },
}

impl FromStr for Resource {
	type Err = TransportError;

	fn from_str(s:&str) -> Result<Self, TransportError> {
		let s = s.trim();

		if let Some(caps) = SOCKET_RE.captures(s) {
			let port = caps[2].parse().map_err(|_| TransportError::InvalidResource(s.to_owned()))?;
			return Ok(Resource::Socket { host: caps[1].to_owned(), port });
		}

		if let Some(caps) = INSTR_RE.captures(s) {
			let device = caps.get(2).map(|m| m.as_str().to_owned()).unwrap_or_else(|| "inst0".to_owned());
			if device.to_ascii_lowercase().starts_with("hislip") {
				return Err(TransportError::UnsupportedResource(s.to_owned()));
			}
			return Ok(Resource::Vxi11 { host: caps[1].to_owned(), device });
		}

		if OTHER_RE.is_match(s) {
			return Err(TransportError::UnsupportedResource(s.to_owned()));
		}

		Err(TransportError::InvalidResource(s.to_owned()))
	}
}

impl fmt::Display for Resource {
	fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Resource::Vxi11 { host, device } => write!(f, "TCPIP::{}::{}::INSTR", host, device),
			Resource::Socket { host, port }  => write!(f, "TCPIP::{}::{}::SOCKET", host, port),
		}
	}
}

pub fn open(resource:&Resource, config:&SessionConfig) -> Result<Box<dyn Transport>, TransportError> {
	debug!("Opening {}", resource);

	Ok(match resource {
		Resource::Vxi11 { host, device } => Box::new(vxi11::Vxi11Transport::connect(host, device, config.timeout())?),
		Resource::Socket { host, port }  => Box::new(socket::SocketTransport::connect(host, *port, config.timeout())?),
	})
}
