// Scripted in-memory transport. Each command can be given a canned reply; everything written is
// recorded so tests can check exactly what went over the wire.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use log::{trace, warn};

use crate::error::TransportError;

use super::{Transport, TERMINATOR};

#[derive(Default)]
pub struct Loopback {
	replies: HashMap<String, Vec<u8>>,
	written: Vec<String>,
	pending: VecDeque<u8>,
	answering: bool,
}

impl Loopback {

	pub fn new() -> Self { Loopback::default() }

	/// Reply to `command` with exactly these bytes, terminator included.
	pub fn reply(&mut self, command:&str, bytes:&[u8]) -> &mut Self {
		self.replies.insert(command.to_owned(), bytes.to_vec());
		self
	}

	/// Reply to `command` with one line of text.
	pub fn reply_text(&mut self, command:&str, text:&str) -> &mut Self {
		let mut bytes = text.as_bytes().to_vec();
		bytes.push(TERMINATOR);
		self.reply(command, &bytes)
	}

	pub fn written(&self) -> &[String] { &self.written }

	pub fn clear_written(&mut self) { self.written.clear(); }
}

impl Transport for Loopback {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		trace!("loopback <- {}", command);

		if !self.pending.is_empty() {
			warn!("Discarding {} unread reply bytes", self.pending.len());
			self.pending.clear();
		}

		self.written.push(command.to_owned());
		self.answering = match self.replies.get(command) {
			Some(bytes) => { self.pending.extend(bytes.iter()); true },
			None => false,
		};

		Ok(())
	}

	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError> {
		if !self.answering { return Err(TransportError::Timeout(Duration::from_millis(0))); }

		let n = max_bytes.min(self.pending.len());
		Ok(self.pending.drain(..n).collect())
	}

	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> {
		if !self.answering { return Err(TransportError::Timeout(Duration::from_millis(0))); }

		let n = match self.pending.iter().position(|b| *b == TERMINATOR) {
			Some(idx) => idx + 1,
			None => self.pending.len(),
		};
		Ok(self.pending.drain(..n).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn replies_are_per_command() {
		let mut link = Loopback::new();
		link.reply_text("*IDN?", "TEKTRONIX,TBS1072C,C0,FV");

		link.write("*IDN?").unwrap();
		assert_eq!(link.read_until_terminator().unwrap(), b"TEKTRONIX,TBS1072C,C0,FV\n");
		assert_eq!(link.read_until_terminator().unwrap(), b"");

		link.write("*CLS").unwrap();
		assert!(matches!(link.read_raw(1), Err(TransportError::Timeout(_))));
		assert_eq!(link.written(), &["*IDN?".to_owned(), "*CLS".to_owned()]);
	}

	#[test]
	fn raw_reads_stop_at_message_end() {
		let mut link = Loopback::new();
		link.reply("Q?", b"abc");
		link.write("Q?").unwrap();

		assert_eq!(link.read_raw(2).unwrap(), b"ab");
		assert_eq!(link.read_raw(5).unwrap(), b"c");
		assert_eq!(link.read_raw(5).unwrap(), b"");
	}
}
