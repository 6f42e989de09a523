// IEEE 488.2 arbitrary block: '#', one digit d, d digits giving the payload length n, n payload
// bytes, then the message terminator. "#0" marks an indefinite block that runs to the terminator.

use log::trace;

use crate::error::{Result, ScopeError, TransportError};
use crate::transport::{Transport, TERMINATOR};

/// Read one block reply from the transport and return its payload.
///
/// Exactly the declared number of bytes is consumed, then the rest of the message must be the
/// terminator alone. A short payload is `TruncatedData`; anything else out of place is `Framing`.
pub fn read_block<T:Transport + ?Sized>(transport:&mut T) -> Result<Vec<u8>> {
	let header = transport.read_raw(2)?;
	if header.len() < 2 {
		return Err(ScopeError::Framing(format!("reply ended after {} bytes, before the block header", header.len())));
	}
	if header[0] != b'#' {
		return Err(ScopeError::Framing(format!("block starts with {:?} instead of '#'", header[0] as char)));
	}

	let digits = match (header[1] as char).to_digit(10) {
		Some(d) => d as usize,
		None => return Err(ScopeError::Framing(format!("invalid length digit count {:?}", header[1] as char))),
	};

	if digits == 0 {
		return read_indefinite(transport);
	}

	let length_field = transport.read_raw(digits)?;
	let declared:usize = std::str::from_utf8(&length_field).ok()
		.filter(|s| s.len() == digits && s.bytes().all(|b| b.is_ascii_digit()))
		.and_then(|s| s.parse().ok())
		.ok_or_else(|| ScopeError::Framing(format!("invalid block length field {:?}", String::from_utf8_lossy(&length_field))))?;

	trace!("Block header declares {} bytes", declared);

	let payload = transport.read_raw(declared)?;
	let swallowed = payload.last() == Some(&TERMINATOR);
	if payload.len() < declared {
		let received = if swallowed { payload.len() - 1 } else { payload.len() };
		return Err(ScopeError::TruncatedData { declared, received });
	}

	// Stream transports have no message end, so a swallowed terminator shows up as a timeout here
	let tail = match transport.read_until_terminator() {
		Err(TransportError::Timeout(_)) if swallowed => {
			return Err(ScopeError::TruncatedData { declared, received: declared - 1 });
		},
		other => other?,
	};

	match tail.as_slice() {
		[TERMINATOR] | [b'\r', TERMINATOR] => Ok(payload),

		// The instrument sent one byte less than declared and we took its terminator as data
		[] if swallowed => Err(ScopeError::TruncatedData { declared, received: declared - 1 }),

		[] => Err(ScopeError::Framing(format!("no terminator after the {}-byte block", declared))),

		extra => Err(ScopeError::Framing(format!("{} unexpected bytes after the {}-byte block", extra.len(), declared))),
	}
}

fn read_indefinite<T:Transport + ?Sized>(transport:&mut T) -> Result<Vec<u8>> {
	let mut payload = transport.read_until_terminator()?;
	if payload.last() != Some(&TERMINATOR) {
		return Err(ScopeError::Framing("indefinite block is not terminated".to_owned()));
	}
	payload.pop();
	Ok(payload)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::loopback::Loopback;

	fn reply(bytes:&[u8]) -> Loopback {
		let mut link = Loopback::new();
		link.reply("CURVe?", bytes);
		link.write("CURVe?").unwrap();
		link
	}

	#[test]
	fn definite_block() {
		let mut link = reply(b"#15hello\n");
		assert_eq!(read_block(&mut link).unwrap(), b"hello");
	}

	#[test]
	fn payload_may_contain_terminator_bytes() {
		let mut link = reply(b"#14a\nb\n\n");
		assert_eq!(read_block(&mut link).unwrap(), b"a\nb\n");
	}

	#[test]
	fn one_byte_short_is_truncated() {
		let mut link = reply(b"#15hell\n");
		match read_block(&mut link) {
			Err(ScopeError::TruncatedData { declared, received }) => assert_eq!((declared, received), (5, 4)),
			other => panic!("expected TruncatedData, got {:?}", other),
		}
	}

	#[test]
	fn two_bytes_short_does_not_count_the_terminator() {
		let mut link = reply(b"#15hel\n");
		match read_block(&mut link) {
			Err(ScopeError::TruncatedData { declared, received }) => assert_eq!((declared, received), (5, 3)),
			other => panic!("expected TruncatedData, got {:?}", other),
		}
	}

	#[test]
	fn message_ends_early() {
		let mut link = reply(b"#210abc");
		assert!(matches!(read_block(&mut link), Err(ScopeError::TruncatedData { declared: 10, received: 3 })));
	}

	#[test]
	fn one_byte_extra_is_framing() {
		let mut link = reply(b"#15hello!\n");
		assert!(matches!(read_block(&mut link), Err(ScopeError::Framing(_))));
	}

	#[test]
	fn missing_hash_is_framing() {
		let mut link = reply(b"15hello\n");
		assert!(matches!(read_block(&mut link), Err(ScopeError::Framing(_))));
	}

	#[test]
	fn indefinite_block() {
		let mut link = reply(b"#0abc\n");
		assert_eq!(read_block(&mut link).unwrap(), b"abc");
	}
}
