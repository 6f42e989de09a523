// VXI-11 core channel over ONC-RPC on TCP. The portmapper on port 111 tells us where the device
// core program listens; a link to the named device ("inst0") is created on connect and destroyed
// on drop.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};
use log::{debug, trace, warn};

use crate::error::TransportError;

use super::{Transport, TERMINATOR};
use super::xdr::{Packer, Unpacker};

const RPCVERSION:u32 = 2;
const CALL:i32 = 0;
const REPLY:i32 = 1;
const MSG_ACCEPTED:i32 = 0;
const SUCCESS:i32 = 0;
const LAST_FRAGMENT:u32 = 0x8000_0000;

const PMAP_PROG:u32 = 100000;
const PMAP_VERS:u32 = 2;
const PMAP_PORT:u16 = 111;
const PMAPPROC_GETPORT:u32 = 3;
const IPPROTO_TCP:u32 = 6;

const DEVICE_CORE_PROG:u32 = 0x0607af;
const DEVICE_CORE_VERS:u32 = 1;
const CREATE_LINK:u32 = 10;
const DEVICE_WRITE:u32 = 11;
const DEVICE_READ:u32 = 12;
const DESTROY_LINK:u32 = 23;

const CLIENT_ID:i32 = 3333;
const DEFAULT_LOCK_TIMEOUT:u32 = 10000;

const FLAG_END:i32 = 0x08;
const FLAG_TERMCHR_SET:i32 = 0x80;

const REASON_REQCNT:i32 = 0x01;
const REASON_CHR:i32 = 0x02;
const REASON_END:i32 = 0x04;

const ERR_IO_TIMEOUT:i32 = 15;

fn device_error(code:i32) -> &'static str { match code {
	1  => "Syntax error",
	3  => "Device not accessible",
	4  => "Invalid link identifier",
	5  => "Parameter error",
	6  => "Channel not established",
	8  => "Operation not supported",
	9  => "Out of resources",
	11 => "Device locked by another link",
	12 => "No lock held by this link",
	15 => "I/O timeout",
	17 => "I/O error",
	21 => "Invalid address",
	23 => "Abort",
	29 => "Channel already established",
	_  => "Unknown error",
}}

struct RpcClient {
	stream: TcpStream,
	prog: u32,
	vers: u32,
	lastxid: u32,
	timeout: Duration,
}

impl RpcClient {

	fn connect<A:ToSocketAddrs>(addr:A, prog:u32, vers:u32, timeout:Duration) -> Result<Self, TransportError> {
		let addr = addr.to_socket_addrs()?
			.next()
			.ok_or_else(|| TransportError::Rpc("address did not resolve".to_owned()))?;

		let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| TransportError::from_io(e, timeout))?;
		stream.set_read_timeout(Some(timeout))?;
		stream.set_write_timeout(Some(timeout))?;
		stream.set_nodelay(true)?;

		Ok(Self { stream, prog, vers, lastxid: 0, timeout })
	}

	fn call(&mut self, procedure:u32, args:&Packer) -> Result<Unpacker, TransportError> {
		self.lastxid += 1;
		let xid = self.lastxid;

		let mut header = Packer::new();
		header.pack_u32(xid)?;
		header.pack_i32(CALL)?;
		header.pack_u32(RPCVERSION)?;
		header.pack_u32(self.prog)?;
		header.pack_u32(self.vers)?;
		header.pack_u32(procedure)?;
		for _ in 0..2 {
			// Null credentials and verifier
			header.pack_u32(0)?;
			header.pack_u32(0)?;
		}

		let len = header.as_bytes().len() + args.as_bytes().len();
		let mut record:Vec<u8> = Vec::with_capacity(len + 4);
		record.write_u32::<BigEndian>(len as u32 | LAST_FRAGMENT)?;
		record.extend_from_slice(header.as_bytes());
		record.extend_from_slice(args.as_bytes());

		let timeout = self.timeout;
		self.stream.write_all(&record).map_err(|e| TransportError::from_io(e, timeout))?;

		loop {
			let mut reply = Unpacker::new(self.read_record()?);
			let reply_xid = reply.unpack_u32()?;

			if reply_xid < xid {
				// Late reply to an earlier call
				continue;
			}
			if reply_xid > xid {
				return Err(TransportError::Rpc(format!("reply xid {} is ahead of call {}", reply_xid, xid)));
			}

			if reply.unpack_i32()? != REPLY {
				return Err(TransportError::Rpc("expected a reply message".to_owned()));
			}
			if reply.unpack_i32()? != MSG_ACCEPTED {
				return Err(TransportError::Rpc("call was denied".to_owned()));
			}
			let _verf_flavor = reply.unpack_u32()?;
			let _verf_body = reply.unpack_opaque()?;

			let status = reply.unpack_i32()?;
			if status != SUCCESS {
				return Err(TransportError::Rpc(format!("call not executed, status {}", status)));
			}

			return Ok(reply);
		}
	}

	fn read_record(&mut self) -> Result<Vec<u8>, TransportError> {
		let timeout = self.timeout;
		let mut record:Vec<u8> = vec![];

		loop {
			let mark = self.stream.read_u32::<BigEndian>().map_err(|e| TransportError::from_io(e, timeout))?;
			let len = (mark & !LAST_FRAGMENT) as usize;

			let start = record.len();
			record.resize(start + len, 0);
			self.stream.read_exact(&mut record[start..]).map_err(|e| TransportError::from_io(e, timeout))?;

			if mark & LAST_FRAGMENT != 0 { return Ok(record); }
		}
	}
}

pub struct Vxi11Transport {
	client: RpcClient,
	link: i32,
	max_recv_size: u32,
	io_timeout_ms: u32,
	message_done: bool,
}

impl Vxi11Transport {

	pub fn connect(host:&str, device:&str, timeout:Duration) -> Result<Self, TransportError> {
		let port = core_port(host, PMAP_PORT, timeout)?;
		Self::link(host, port, device, timeout)
	}

	// Create a link on a core channel whose port is already known
	fn link(host:&str, port:u16, device:&str, timeout:Duration) -> Result<Self, TransportError> {
		let mut client = RpcClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)?;

		let mut args = Packer::new();
		args.pack_i32(CLIENT_ID)?;
		args.pack_bool(false)?;
		args.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
		args.pack_string(device)?;

		let mut reply = client.call(CREATE_LINK, &args)?;
		let error = reply.unpack_i32()?;
		let link = reply.unpack_i32()?;
		let _abort_port = reply.unpack_u32()?;
		let max_recv_size = reply.unpack_u32()?;

		if error != 0 {
			return Err(TransportError::Device { code: error, message: device_error(error) });
		}

		debug!("Created VXI-11 link {} to {} on {}:{} (max_recv_size={})", link, device, host, port, max_recv_size);

		let io_timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
		Ok(Self { client, link, max_recv_size: max_recv_size.max(1), io_timeout_ms, message_done: true })
	}

	fn check(&self, error:i32) -> Result<(), TransportError> {
		match error {
			0 => Ok(()),
			ERR_IO_TIMEOUT => Err(TransportError::Timeout(self.client.timeout)),
			code => Err(TransportError::Device { code, message: device_error(code) }),
		}
	}

	fn device_read(&mut self, request_size:u32, term_char:Option<u8>) -> Result<(Vec<u8>, i32), TransportError> {
		let mut args = Packer::new();
		args.pack_i32(self.link)?;
		args.pack_u32(request_size)?;
		args.pack_u32(self.io_timeout_ms)?;
		args.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
		args.pack_i32(if term_char.is_some() { FLAG_TERMCHR_SET } else { 0 })?;
		args.pack_i32(term_char.unwrap_or(0) as i32)?;

		let mut reply = self.client.call(DEVICE_READ, &args)?;
		let error = reply.unpack_i32()?;
		let reason = reply.unpack_i32()?;
		let data = reply.unpack_opaque()?;
		self.check(error)?;

		if reason & REASON_END != 0 { self.message_done = true; }
		trace!("device_read got {} bytes, reason {:#x}", data.len(), reason);
		Ok((data, reason))
	}
}

impl Transport for Vxi11Transport {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		let mut data = command.as_bytes().to_vec();
		data.push(TERMINATOR);

		let chunks:Vec<&[u8]> = data.chunks(self.max_recv_size as usize).collect();
		let last = chunks.len() - 1;

		for (idx, chunk) in chunks.iter().enumerate() {
			let mut args = Packer::new();
			args.pack_i32(self.link)?;
			args.pack_u32(self.io_timeout_ms)?;
			args.pack_u32(DEFAULT_LOCK_TIMEOUT)?;
			args.pack_i32(if idx == last { FLAG_END } else { 0 })?;
			args.pack_opaque(chunk)?;

			let mut reply = self.client.call(DEVICE_WRITE, &args)?;
			let error = reply.unpack_i32()?;
			let size = reply.unpack_u32()?;
			self.check(error)?;

			if size as usize != chunk.len() {
				return Err(TransportError::Rpc(format!("device accepted {} of {} bytes", size, chunk.len())));
			}
		}

		self.message_done = false;
		Ok(())
	}

	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError> {
		let mut out:Vec<u8> = Vec::with_capacity(max_bytes);

		while out.len() < max_bytes && !self.message_done {
			let wanted = (max_bytes - out.len()).min(u32::MAX as usize) as u32;
			let (data, reason) = self.device_read(wanted, None)?;
			out.extend_from_slice(&data);

			if data.is_empty() && reason & REASON_END == 0 {
				return Err(TransportError::Rpc("device_read returned no data without ending the message".to_owned()));
			}
		}

		Ok(out)
	}

	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> {
		let mut out:Vec<u8> = vec![];

		while !self.message_done {
			let (data, reason) = self.device_read(self.max_recv_size, Some(TERMINATOR))?;
			out.extend_from_slice(&data);
			if reason & (REASON_CHR | REASON_END) != 0 { break; }
			if reason & REASON_REQCNT == 0 {
				return Err(TransportError::Rpc(format!("unexpected read reason {:#x}", reason)));
			}
		}

		Ok(out)
	}
}

impl Drop for Vxi11Transport {
	fn drop(&mut self) {
		let mut args = Packer::new();
		let result = args.pack_i32(self.link)
			.map_err(TransportError::from)
			.and_then(|_| self.client.call(DESTROY_LINK, &args))
			.and_then(|mut reply| Ok(reply.unpack_i32()?));

		match result {
			Ok(0) => debug!("Destroyed VXI-11 link {}", self.link),
			Ok(code) => warn!("Destroying VXI-11 link {} failed: {}", self.link, device_error(code)),
			Err(e) => warn!("Destroying VXI-11 link {} failed: {}", self.link, e),
		}
	}
}

// Ask the portmapper which TCP port the device core program is on
fn core_port(host:&str, pmap_port:u16, timeout:Duration) -> Result<u16, TransportError> {
	let mut pmap = RpcClient::connect((host, pmap_port), PMAP_PROG, PMAP_VERS, timeout)?;

	let mut args = Packer::new();
	args.pack_u32(DEVICE_CORE_PROG)?;
	args.pack_u32(DEVICE_CORE_VERS)?;
	args.pack_u32(IPPROTO_TCP)?;
	args.pack_u32(0)?;

	let port = pmap.call(PMAPPROC_GETPORT, &args)?.unpack_u32()?;
	if port == 0 || port > u16::MAX as u32 {
		return Err(TransportError::Rpc(format!("portmapper on {} has no device core program (port {})", host, port)));
	}

	Ok(port as u16)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::net::TcpListener;
	use std::thread;

	const TIMEOUT:Duration = Duration::from_millis(2000);

	// Server side of one call: (xid, procedure, arguments)
	fn read_call(stream:&mut TcpStream) -> (u32, u32, Unpacker) {
		let mark = stream.read_u32::<BigEndian>().unwrap();
		let mut record = vec![0u8; (mark & !LAST_FRAGMENT) as usize];
		stream.read_exact(&mut record).unwrap();

		let mut call = Unpacker::new(record);
		let xid = call.unpack_u32().unwrap();
		assert_eq!(call.unpack_i32().unwrap(), CALL);
		for _ in 0..3 { call.unpack_u32().unwrap(); }
		let procedure = call.unpack_u32().unwrap();
		// Credentials and verifier
		for _ in 0..4 { call.unpack_u32().unwrap(); }

		(xid, procedure, call)
	}

	// Accepted reply carrying `body`, optionally split over two record fragments
	fn send_reply(stream:&mut TcpStream, xid:u32, body:&Packer, fragmented:bool) {
		let mut header = Packer::new();
		header.pack_u32(xid).unwrap();
		header.pack_i32(REPLY).unwrap();
		header.pack_i32(MSG_ACCEPTED).unwrap();
		header.pack_u32(0).unwrap();
		header.pack_u32(0).unwrap();
		header.pack_i32(SUCCESS).unwrap();

		let mut record = header.as_bytes().to_vec();
		record.extend_from_slice(body.as_bytes());

		let split = if fragmented { record.len() / 2 } else { record.len() };
		let mut out:Vec<u8> = vec![];
		if split < record.len() {
			out.write_u32::<BigEndian>(split as u32).unwrap();
			out.extend_from_slice(&record[..split]);
		}
		out.write_u32::<BigEndian>((record.len() - split) as u32 | LAST_FRAGMENT).unwrap();
		out.extend_from_slice(&record[split..]);

		stream.write_all(&out).unwrap();
	}

	fn listen() -> (TcpListener, u16) {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		(listener, port)
	}

	#[test]
	fn portmapper_reports_the_core_port() {
		let (listener, port) = listen();

		let server = thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();
			let (xid, procedure, mut args) = read_call(&mut stream);
			assert_eq!(procedure, PMAPPROC_GETPORT);
			assert_eq!(args.unpack_u32().unwrap(), DEVICE_CORE_PROG);
			assert_eq!(args.unpack_u32().unwrap(), DEVICE_CORE_VERS);
			assert_eq!(args.unpack_u32().unwrap(), IPPROTO_TCP);

			let mut body = Packer::new();
			body.pack_u32(4321).unwrap();
			send_reply(&mut stream, xid, &body, false);
		});

		assert_eq!(core_port("127.0.0.1", port, TIMEOUT).unwrap(), 4321);
		server.join().unwrap();
	}

	#[test]
	fn unregistered_core_program_is_an_rpc_error() {
		let (listener, port) = listen();

		let server = thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();
			let (xid, _, _) = read_call(&mut stream);
			let mut body = Packer::new();
			body.pack_u32(0).unwrap();
			send_reply(&mut stream, xid, &body, false);
		});

		assert!(matches!(core_port("127.0.0.1", port, TIMEOUT), Err(TransportError::Rpc(_))));
		server.join().unwrap();
	}

	#[test]
	fn link_write_read_and_destroy() {
		let (listener, port) = listen();

		let server = thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();
			let mut written:Vec<u8> = vec![];

			let (xid, procedure, mut args) = read_call(&mut stream);
			assert_eq!(procedure, CREATE_LINK);
			assert_eq!(args.unpack_i32().unwrap(), CLIENT_ID);
			args.unpack_i32().unwrap();
			args.unpack_u32().unwrap();
			assert_eq!(args.unpack_opaque().unwrap(), b"inst0");

			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_i32(7).unwrap();
			body.pack_u32(0).unwrap();
			body.pack_u32(1024).unwrap();
			send_reply(&mut stream, xid, &body, false);

			let (xid, procedure, mut args) = read_call(&mut stream);
			assert_eq!(procedure, DEVICE_WRITE);
			assert_eq!(args.unpack_i32().unwrap(), 7);
			args.unpack_u32().unwrap();
			args.unpack_u32().unwrap();
			assert_eq!(args.unpack_i32().unwrap(), FLAG_END);
			let data = args.unpack_opaque().unwrap();
			written.extend_from_slice(&data);

			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_u32(data.len() as u32).unwrap();
			send_reply(&mut stream, xid, &body, false);

			// First read: a late reply to the write comes first, then part of the answer in two fragments
			let (xid, procedure, _) = read_call(&mut stream);
			assert_eq!(procedure, DEVICE_READ);
			let mut stale = Packer::new();
			stale.pack_i32(0).unwrap();
			stale.pack_u32(0).unwrap();
			send_reply(&mut stream, xid - 1, &stale, false);

			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_i32(REASON_REQCNT).unwrap();
			body.pack_opaque(b"TEKTRONIX,").unwrap();
			send_reply(&mut stream, xid, &body, true);

			let (xid, procedure, _) = read_call(&mut stream);
			assert_eq!(procedure, DEVICE_READ);
			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_i32(REASON_END).unwrap();
			body.pack_opaque(b"TBS1072C\n").unwrap();
			send_reply(&mut stream, xid, &body, false);

			let (xid, procedure, mut args) = read_call(&mut stream);
			assert_eq!(procedure, DESTROY_LINK);
			assert_eq!(args.unpack_i32().unwrap(), 7);
			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			send_reply(&mut stream, xid, &body, false);

			written
		});

		let mut link = Vxi11Transport::link("127.0.0.1", port, "inst0", TIMEOUT).unwrap();
		link.write("*IDN?").unwrap();
		assert_eq!(link.read_until_terminator().unwrap(), b"TEKTRONIX,TBS1072C\n".to_vec());
		assert!(link.read_raw(16).unwrap().is_empty());
		drop(link);

		assert_eq!(server.join().unwrap(), b"*IDN?\n".to_vec());
	}

	#[test]
	fn device_error_on_read() {
		let (listener, port) = listen();

		let server = thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();

			let (xid, _, _) = read_call(&mut stream);
			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_i32(3).unwrap();
			body.pack_u32(0).unwrap();
			body.pack_u32(1024).unwrap();
			send_reply(&mut stream, xid, &body, false);

			let (xid, _, _) = read_call(&mut stream);
			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			body.pack_u32(6).unwrap();
			send_reply(&mut stream, xid, &body, false);

			let (xid, _, _) = read_call(&mut stream);
			let mut body = Packer::new();
			body.pack_i32(ERR_IO_TIMEOUT).unwrap();
			body.pack_i32(0).unwrap();
			body.pack_opaque(b"").unwrap();
			send_reply(&mut stream, xid, &body, false);

			let (xid, _, _) = read_call(&mut stream);
			let mut body = Packer::new();
			body.pack_i32(0).unwrap();
			send_reply(&mut stream, xid, &body, false);
		});

		let mut link = Vxi11Transport::link("127.0.0.1", port, "inst0", TIMEOUT).unwrap();
		link.write("*IDN?").unwrap();
		assert!(matches!(link.read_until_terminator(), Err(TransportError::Timeout(_))));
		drop(link);

		server.join().unwrap();
	}
}
