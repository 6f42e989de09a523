// Raw SCPI over TCP (port 5025 on most instruments). There is no message framing beyond the
// newline, so a reply shorter than requested shows up as a timeout rather than an early end.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, trace};

use crate::error::TransportError;

use super::{Transport, TERMINATOR};

pub struct SocketTransport {
	stream: BufReader<TcpStream>,
	timeout: Duration,
}

impl SocketTransport {

	pub fn connect(host:&str, port:u16, timeout:Duration) -> Result<Self, TransportError> {
		let addr = (host, port).to_socket_addrs()?
			.next()
			.ok_or_else(|| TransportError::InvalidResource(format!("{}:{}", host, port)))?;

		let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| TransportError::from_io(e, timeout))?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;

		debug!("Connected to {} over raw socket", addr);
		Ok(Self { stream: BufReader::new(stream), timeout })
	}
}

impl Transport for SocketTransport {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		let mut msg = command.as_bytes().to_vec();
		msg.push(TERMINATOR);

		let timeout = self.timeout;
		self.stream.get_mut().write_all(&msg).map_err(|e| TransportError::from_io(e, timeout))
	}

	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError> {
		let mut buffer = vec![0u8; max_bytes];
		let timeout = self.timeout;
		self.stream.read_exact(&mut buffer).map_err(|e| TransportError::from_io(e, timeout))?;

		trace!("Read {} raw bytes", buffer.len());
		Ok(buffer)
	}

	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> {
		let mut buffer:Vec<u8> = vec![];
		let timeout = self.timeout;
		self.stream.read_until(TERMINATOR, &mut buffer).map_err(|e| TransportError::from_io(e, timeout))?;
		Ok(buffer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::TcpListener;
	use std::sync::mpsc;
	use std::thread;

	use crate::error::ScopeError;
	use crate::waveform::block::read_block;

	// Serve one connection: answer the first command line with `reply`, then hold the socket open
	// until the test is done so a missing byte looks like silence rather than a closed stream
	fn serve(reply:&'static [u8]) -> (u16, mpsc::Sender<()>, thread::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		let (done_tx, done_rx) = mpsc::channel::<()>();

		let handle = thread::spawn(move || {
			let (stream, _) = listener.accept().unwrap();
			let mut reader = BufReader::new(stream);

			let mut command = String::new();
			reader.read_line(&mut command).unwrap();
			reader.get_mut().write_all(reply).unwrap();

			let _ = done_rx.recv();
			command
		});

		(port, done_tx, handle)
	}

	#[test]
	fn query_round_trip() {
		let (port, done, server) = serve(b"TEKTRONIX,TBS1072C,C010123,CF:91.1CT FV:v26.01\n");
		let mut link = SocketTransport::connect("127.0.0.1", port, Duration::from_millis(2000)).unwrap();

		link.write("*IDN?").unwrap();
		assert_eq!(link.read_until_terminator().unwrap(), b"TEKTRONIX,TBS1072C,C010123,CF:91.1CT FV:v26.01\n".to_vec());

		done.send(()).unwrap();
		assert_eq!(server.join().unwrap(), "*IDN?\n");
	}

	#[test]
	fn block_reads_over_the_stream() {
		let (port, done, server) = serve(b"#15hello\n");
		let mut link = SocketTransport::connect("127.0.0.1", port, Duration::from_millis(2000)).unwrap();

		link.write("CURVe?").unwrap();
		assert_eq!(read_block(&mut link).unwrap(), b"hello");

		done.send(()).unwrap();
		server.join().unwrap();
	}

	#[test]
	fn one_byte_short_block_is_truncated_not_a_timeout() {
		let (port, done, server) = serve(b"#15hell\n");
		let mut link = SocketTransport::connect("127.0.0.1", port, Duration::from_millis(300)).unwrap();

		link.write("CURVe?").unwrap();
		match read_block(&mut link) {
			Err(ScopeError::TruncatedData { declared, received }) => assert_eq!((declared, received), (5, 4)),
			other => panic!("expected TruncatedData, got {:?}", other),
		}

		done.send(()).unwrap();
		server.join().unwrap();
	}

	#[test]
	fn silence_is_a_timeout() {
		let (port, done, server) = serve(b"");
		let mut link = SocketTransport::connect("127.0.0.1", port, Duration::from_millis(200)).unwrap();

		link.write("ACQuire:MAXSamplerate?").unwrap();
		assert!(matches!(link.read_until_terminator(), Err(TransportError::Timeout(_))));

		done.send(()).unwrap();
		server.join().unwrap();
	}
}
