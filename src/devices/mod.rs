// Supported instruments. Each vendor family has one `Dialect`: its command tables, its waveform
// preamble grammar and the way it reports errors. Adding a model means adding a `Model` variant
// and registering its table in the family module.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::commands::{BinaryFormat, ByteOrder, DictionaryBuilder, SampleWidth};
use crate::error::{DictionaryError, Result};
use crate::waveform::{Preamble, TransferFormat};

pub mod keysight;
pub mod tektronix;

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
	Tbs1072c,
	Tbs2012b,
	Dsox1102a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family { Tektronix, Keysight }

pub trait Dialect: Sync {
	fn register(&self, model: Model, builder: &mut DictionaryBuilder) -> std::result::Result<(), DictionaryError>;

	/// Turn the reply to `Operation::PreambleGet` into a preamble.
	fn parse_preamble(&self, model: Model, reply: &str) -> Result<Preamble>;

	/// Reply to `Operation::ErrorQuery`; `None` when the instrument reports no error.
	fn parse_error_reply(&self, reply: &str) -> Option<String>;
}

static TEKTRONIX: tektronix::Tektronix = tektronix::Tektronix;
static KEYSIGHT: keysight::Keysight = keysight::Keysight;

impl Model {

	pub const ALL: &'static [Model] = &[Model::Tbs1072c, Model::Tbs2012b, Model::Dsox1102a];

	pub fn name(self) -> &'static str { match self {
		Model::Tbs1072c  => "TBS1072C",
		Model::Tbs2012b  => "TBS2012B",
		Model::Dsox1102a => "DSOX1102A",
	}}

	pub fn family(self) -> Family { match self {
		Model::Tbs1072c | Model::Tbs2012b => Family::Tektronix,
		Model::Dsox1102a                  => Family::Keysight,
	}}

	pub fn dialect(self) -> &'static dyn Dialect { match self.family() {
		Family::Tektronix => &TEKTRONIX,
		Family::Keysight  => &KEYSIGHT,
	}}

	pub fn channel_count(self) -> usize { 2 }

	/// Divisions spanned by the acquisition window on screen.
	pub fn horizontal_divisions(self) -> f64 { match self.family() {
		Family::Tektronix => 16.0,
		Family::Keysight  => 10.0,
	}}

	/// Smallest and largest settable seconds per division.
	pub fn horizontal_scale_range(self) -> (f64, f64) { match self {
		Model::Tbs1072c  => (5.0e-9, 100.0),
		Model::Tbs2012b  => (2.0e-9, 100.0),
		Model::Dsox1102a => (5.0e-9, 50.0),
	}}

	pub fn max_record_length(self) -> u64 { match self {
		Model::Tbs1072c  => 20_000,
		Model::Tbs2012b  => 5_000_000,
		Model::Dsox1102a => 1_000_000,
	}}

	// What the session configures on open unless told otherwise
	pub fn default_transfer(self) -> TransferFormat { match self.family() {
		Family::Tektronix => TransferFormat { width: SampleWidth::Byte, format: BinaryFormat::Signed, byte_order: ByteOrder::MsbFirst },
		Family::Keysight  => TransferFormat { width: SampleWidth::Byte, format: BinaryFormat::Unsigned, byte_order: ByteOrder::MsbFirst },
	}}

	/// Match the model field of an `*IDN?` reply, ignoring case and punctuation ("DSO-X 1102A").
	pub fn from_idn_model(field: &str) -> Option<Model> {
		let normalized: String = field.chars()
			.filter(|c| c.is_ascii_alphanumeric())
			.map(|c| c.to_ascii_uppercase())
			.collect();

		Model::ALL.iter().copied().find(|m| m.name() == normalized)
	}
}

impl fmt::Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Model {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, String> {
		Model::from_idn_model(s).ok_or_else(|| format!("unknown model '{}'", s))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial_number: String,
	pub firmware: String,
}

impl Identity {

	pub fn parse(reply: &str) -> Option<Self> {
		let caps = IDN_RE.captures(reply.trim())?;
		let field = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_owned());

		Some(Self {
			manufacturer: field(1)?,
			model: field(2)?,
			serial_number: field(3)?,
			firmware: field(4)?,
		})
	}

	pub fn supported_model(&self) -> Option<Model> { Model::from_idn_model(&self.model) }
}
