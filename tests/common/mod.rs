// A simulated oscilloscope that keeps its own timebase state, quantizes the horizontal scale the
// way real instruments do, and serves a preamble plus data block for waveform queries.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use visascope::error::TransportError;
use visascope::{Model, Transport};

pub fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Frame a payload as a definite-length block with a trailing newline.
pub fn block(payload:&[u8]) -> Vec<u8> {
	let len = payload.len().to_string();
	let mut out = format!("#{}{}", len.len(), len).into_bytes();
	out.extend_from_slice(payload);
	out.push(b'\n');
	out
}

// Nearest value in the 1-2-5 sequence
fn quantize(x:f64) -> f64 {
	let decade = 10f64.powf(x.log10().floor());
	let mantissa = x / decade;
	let step = [1.0, 2.0, 5.0, 10.0].iter()
		.copied()
		.min_by(|a:&f64, b:&f64| (mantissa - a).abs().partial_cmp(&(mantissa - b).abs()).unwrap())
		.unwrap();
	step * decade
}

pub struct SimulatedScope {
	pub model: Model,
	pub horizontal_scale: f64,
	pub record_length: u64,
	pub delay: f64,
	pub preamble: String,
	pub data: Vec<u8>,
	pub fixed: HashMap<String, String>,
	pub written: Vec<String>,
	pending: VecDeque<u8>,
	answering: bool,
}

impl SimulatedScope {

	pub fn new(model:Model) -> Self {
		SimulatedScope {
			model,
			horizontal_scale: 1.0e-3,
			record_length: if model == Model::Dsox1102a { 1000 } else { 2000 },
			delay: 0.0,
			preamble: String::new(),
			data: vec![],
			fixed: HashMap::new(),
			written: vec![],
			pending: VecDeque::new(),
			answering: false,
		}
	}

	pub fn with_waveform(mut self, preamble:&str, data:Vec<u8>) -> Self {
		self.preamble = preamble.to_owned();
		self.data = data;
		self
	}

	/// Constant reply to a query the simulation does not model.
	pub fn with_reply(mut self, query:&str, reply:&str) -> Self {
		self.fixed.insert(query.to_owned(), reply.to_owned());
		self
	}

	pub fn count_written(&self, command:&str) -> usize {
		self.written.iter().filter(|c| c.as_str() == command).count()
	}

	fn idn(&self) -> &'static str { match self.model {
		Model::Tbs1072c  => "TEKTRONIX,TBS1072C,C010123,CF:91.1CT FV:v26.01",
		Model::Tbs2012b  => "TEKTRONIX,TBS2012B,C020456,CF:91.1CT FV:v5.12",
		Model::Dsox1102a => "KEYSIGHT TECHNOLOGIES,DSO-X 1102A,CN57096130,01.20.2019061038",
	}}

	fn respond(&mut self, cmd:&str) -> Option<Vec<u8>> {
		let text = |s:String| { let mut b = s.into_bytes(); b.push(b'\n'); Some(b) };

		match cmd {
			"*IDN?" => return text(self.idn().to_owned()),
			"*ESR?" => return text("0".to_owned()),
			":SYSTem:ERRor?" => return text("+0,\"No error\"".to_owned()),
			"HEADer ON;:WFMOutpre?;:HEADer OFF" | ":WAVeform:UNSigned?;BYTeorder?;PREamble?" => return text(self.preamble.clone()),
			"CURVe?" | ":WAVeform:DATA?" => return Some(self.data.clone()),
			_ => {},
		}

		if let Some(reply) = self.fixed.get(cmd) {
			return text(reply.clone());
		}

		let (head, arg) = match cmd.find(' ') {
			Some(idx) => (&cmd[..idx], Some(cmd[idx+1..].trim())),
			None => (cmd, None),
		};

		match (head, arg) {
			("HORizontal:MAIn:SCAle?", None) | (":TIMebase:SCALe?", None) => text(format!("{:E}", self.horizontal_scale)),
			("HORizontal:MAIn:SCAle", Some(v)) | (":TIMebase:SCALe", Some(v)) => {
				self.horizontal_scale = quantize(v.parse().ok()?);
				None
			},
			("HORizontal:RECOrdlength?", None) | (":ACQuire:POINts?", None) => text(self.record_length.to_string()),
			("HORizontal:RECOrdlength", Some(v)) => {
				self.record_length = v.parse().ok()?;
				None
			},
			(":ACQuire:SRATe?", None) => text(format!("{:E}", self.record_length as f64 / (self.horizontal_scale * 10.0))),
			("HORizontal:MAIn:POSition?", None) | ("HORizontal:DELay:TIMe?", None) | (":TIMebase:POSition?", None) => {
				text(format!("{:E}", self.delay))
			},
			("HORizontal:MAIn:POSition", Some(v)) | ("HORizontal:DELay:TIMe", Some(v)) | (":TIMebase:POSition", Some(v)) => {
				self.delay = v.parse().ok()?;
				None
			},
			_ => None,
		}
	}
}

impl Transport for SimulatedScope {

	fn write(&mut self, command:&str) -> Result<(), TransportError> {
		self.written.push(command.to_owned());
		self.pending.clear();

		self.answering = match self.respond(command) {
			Some(bytes) => { self.pending.extend(bytes); true },
			None => false,
		};
		Ok(())
	}

	fn read_raw(&mut self, max_bytes:usize) -> Result<Vec<u8>, TransportError> {
		if !self.answering { return Err(TransportError::Timeout(Duration::from_millis(10))); }
		let n = max_bytes.min(self.pending.len());
		Ok(self.pending.drain(..n).collect())
	}

	fn read_until_terminator(&mut self) -> Result<Vec<u8>, TransportError> {
		if !self.answering { return Err(TransportError::Timeout(Duration::from_millis(10))); }
		let n = self.pending.iter().position(|b| *b == b'\n').map(|i| i + 1).unwrap_or(self.pending.len());
		Ok(self.pending.drain(..n).collect())
	}
}
