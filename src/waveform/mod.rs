// Waveform codec: the preamble describing an acquisition, decoding of the binary sample block it
// announces, and conversion of raw samples to seconds and volts.

use byteorder::{BigEndian, LittleEndian, ByteOrder as _};
use serde::{Serialize, Deserialize};

use crate::commands::{BinaryFormat, ByteOrder, SampleWidth};
use crate::error::{Result, ScopeError};

pub mod block;

/// How the instrument should encode samples for transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFormat {
	pub width: SampleWidth,
	pub format: BinaryFormat,
	pub byte_order: ByteOrder,
}

/// Metadata for one acquisition, as reported by the instrument just before the data block.
#[derive(Debug, Clone, PartialEq)]
pub struct Preamble {
	pub points: usize,
	pub width: SampleWidth,
	pub format: BinaryFormat,
	pub byte_order: ByteOrder,
	pub x_increment: f64,
	pub x_zero: f64,
	pub x_reference: f64,
	pub y_multiplier: f64,
	pub y_zero: f64,
	pub y_reference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
	pub time: Vec<f64>,
	pub voltage: Vec<f64>,
}

impl Preamble {

	pub fn transfer_format(&self) -> TransferFormat {
		TransferFormat { width: self.width, format: self.format, byte_order: self.byte_order }
	}

	/// Reject preambles that cannot describe a real acquisition.
	pub fn validate(&self) -> Result<()> {
		if self.points == 0 {
			return Err(ScopeError::InvalidPreamble("record holds no samples".to_owned()));
		}
		if self.x_increment == 0.0 || !self.x_increment.is_finite() {
			return Err(ScopeError::InvalidPreamble(format!("sample interval is {}", self.x_increment)));
		}
		let scale = [self.x_zero, self.x_reference, self.y_multiplier, self.y_zero, self.y_reference];
		if scale.iter().any(|v| !v.is_finite()) {
			return Err(ScopeError::InvalidPreamble("non-finite scale factor".to_owned()));
		}
		Ok(())
	}

	/// Split the payload into integer samples according to width, signedness and byte order.
	pub fn decode(&self, payload:&[u8]) -> Result<Vec<i32>> {
		let width = self.width.bytes();
		if payload.len() % width != 0 {
			return Err(ScopeError::Framing(format!("{} payload bytes do not divide into {}-byte samples", payload.len(), width)));
		}

		let raw:Vec<i32> = payload.chunks_exact(width).map(|s| match (self.width, self.format, self.byte_order) {
			(SampleWidth::Byte, BinaryFormat::Signed, _)                      => s[0] as i8 as i32,
			(SampleWidth::Byte, BinaryFormat::Unsigned, _)                    => s[0] as i32,
			(SampleWidth::Word, BinaryFormat::Signed, ByteOrder::MsbFirst)    => BigEndian::read_i16(s) as i32,
			(SampleWidth::Word, BinaryFormat::Signed, ByteOrder::LsbFirst)    => LittleEndian::read_i16(s) as i32,
			(SampleWidth::Word, BinaryFormat::Unsigned, ByteOrder::MsbFirst)  => BigEndian::read_u16(s) as i32,
			(SampleWidth::Word, BinaryFormat::Unsigned, ByteOrder::LsbFirst)  => LittleEndian::read_u16(s) as i32,
		}).collect();

		if raw.len() != self.points {
			return Err(ScopeError::SampleCountMismatch { declared: self.points, decoded: raw.len() });
		}

		Ok(raw)
	}

	pub fn voltage(&self, raw:i32) -> f64 {
		(raw as f64 - self.y_reference) * self.y_multiplier + self.y_zero
	}

	pub fn time(&self, index:usize) -> f64 {
		self.x_zero + (index as f64 - self.x_reference) * self.x_increment
	}

	pub fn scale(&self, raw:&[i32]) -> Signal {
		Signal {
			time: (0..raw.len()).map(|i| self.time(i)).collect(),
			voltage: raw.iter().map(|r| self.voltage(*r)).collect(),
		}
	}

	/// Validate, decode and scale one data block.
	pub fn signal(&self, payload:&[u8]) -> Result<Signal> {
		self.validate()?;
		let raw = self.decode(payload)?;
		Ok(self.scale(&raw))
	}
}

impl Signal {

	pub fn len(&self) -> usize { self.time.len() }
	pub fn is_empty(&self) -> bool { self.time.is_empty() }

	pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.time.iter().copied().zip(self.voltage.iter().copied())
	}

	/// Seconds between consecutive samples, if there are at least two.
	pub fn sample_interval(&self) -> Option<f64> {
		if self.time.len() < 2 { None }
		else { Some(self.time[1] - self.time[0]) }
	}
}
