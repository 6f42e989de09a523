// Tektronix TBS1000C / TBS2000B series.
//
// The preamble is fetched with response headers switched on for the one query, so every field
// arrives labelled ("BYT_NR 1;BN_FMT RP;...") and is looked up by name rather than position.

use crate::bidict::matches_mnemonic;
use crate::commands::{
	AcquisitionMode, BinaryFormat, ByteOrder, Choice, Coupling, DictionaryBuilder, Encoding, Operation as Op,
	SampleWidth, Switch, TriggerMode, TriggerSlope, TriggerSource,
};
use crate::error::{DictionaryError, Result, ScopeError};
use crate::waveform::Preamble;

use super::{Dialect, Model};

pub struct Tektronix;

const COMMON:&[(Op, &str)] = &[
	(Op::Identify,            "*IDN?"),
	(Op::ClearStatus,         "*CLS"),
	(Op::Reset,               "*RST"),
	(Op::ErrorQuery,          "*ESR?"),
	(Op::ResponseHeaderSet,   "HEADer"),
	(Op::Run,                 "ACQuire:STATE RUN"),
	(Op::Stop,                "ACQuire:STATE STOP"),
	(Op::Single,              "ACQuire:STOPAfter SEQuence"),
	(Op::Continuous,          "ACQuire:STOPAfter RUNSTop"),
	(Op::Autoset,             "AUTOSet EXECute"),
	(Op::ForceTrigger,        "TRIGger FORCe"),

	(Op::HorizontalScaleGet,  "HORizontal:MAIn:SCAle?"),
	(Op::HorizontalScaleSet,  "HORizontal:MAIn:SCAle"),
	(Op::MaxSampleRateGet,    "ACQuire:MAXSamplerate?"),
	(Op::RecordLengthGet,     "HORizontal:RECOrdlength?"),
	(Op::RecordLengthSet,     "HORizontal:RECOrdlength"),
	(Op::AcquisitionModeGet,  "ACQuire:MODe?"),
	(Op::AcquisitionModeSet,  "ACQuire:MODe"),

	(Op::TriggerModeGet,      "TRIGger:A:MODe?"),
	(Op::TriggerModeSet,      "TRIGger:A:MODe"),
	(Op::TriggerSlopeGet,     "TRIGger:A:EDGE:SLOpe?"),
	(Op::TriggerSlopeSet,     "TRIGger:A:EDGE:SLOpe"),
	(Op::TriggerSourceGet,    "TRIGger:A:EDGE:SOUrce?"),
	(Op::TriggerSourceSet,    "TRIGger:A:EDGE:SOUrce"),
	(Op::TriggerLevelGet,     "TRIGger:A:LEVel:CH{ch}?"),
	(Op::TriggerLevelSet,     "TRIGger:A:LEVel:CH{ch}"),

	(Op::CouplingGet,         "CH{ch}:COUPling?"),
	(Op::CouplingSet,         "CH{ch}:COUPling"),
	(Op::VerticalScaleGet,    "CH{ch}:SCAle?"),
	(Op::VerticalScaleSet,    "CH{ch}:SCAle"),
	(Op::VerticalOffsetGet,   "CH{ch}:OFFSet?"),
	(Op::VerticalOffsetSet,   "CH{ch}:OFFSet"),
	(Op::ProbeGainGet,        "CH{ch}:PRObe:GAIN?"),
	(Op::ProbeGainSet,        "CH{ch}:PRObe:GAIN"),
	(Op::ChannelDisplayGet,   "SELect:CH{ch}?"),
	(Op::ChannelDisplaySet,   "SELect:CH{ch}"),

	(Op::DataSourceSet,       "DATa:SOUrce CH{ch}"),
	(Op::EncodingSet,         "WFMOutpre:ENCdg"),
	(Op::SampleWidthSet,      "DATa:WIDth"),
	(Op::BinaryFormatSet,     "WFMOutpre:BN_Fmt"),
	(Op::ByteOrderSet,        "WFMOutpre:BYT_Or"),
	(Op::DataStartSet,        "DATa:STARt"),
	(Op::DataStopSet,         "DATa:STOP"),
	(Op::PreambleGet,         "HEADer ON;:WFMOutpre?;:HEADer OFF"),
	(Op::WaveformDataGet,     "CURVe?"),
];

const TBS1072C:&[(Op, &str)] = &[
	(Op::HorizontalDelayGet,  "HORizontal:MAIn:POSition?"),
	(Op::HorizontalDelaySet,  "HORizontal:MAIn:POSition"),
];

const TBS2012B:&[(Op, &str)] = &[
	(Op::HorizontalDelayGet,  "HORizontal:DELay:TIMe?"),
	(Op::HorizontalDelaySet,  "HORizontal:DELay:TIMe"),
];

const COUPLING:&[(Choice, &str)] = &[
	(Choice::Coupling(Coupling::Ac),     "AC"),
	(Choice::Coupling(Coupling::Dc),     "DC"),
	(Choice::Coupling(Coupling::Ground), "GND"),
];

const TRIGGER_MODE:&[(Choice, &str)] = &[
	(Choice::TriggerMode(TriggerMode::Auto),   "AUTO"),
	(Choice::TriggerMode(TriggerMode::Normal), "NORMal"),
];

const TRIGGER_SLOPE:&[(Choice, &str)] = &[
	(Choice::TriggerSlope(TriggerSlope::Rising),  "RISe"),
	(Choice::TriggerSlope(TriggerSlope::Falling), "FALL"),
];

const TRIGGER_SOURCE:&[(Choice, &str)] = &[
	(Choice::TriggerSource(TriggerSource::Channel1), "CH1"),
	(Choice::TriggerSource(TriggerSource::Channel2), "CH2"),
	(Choice::TriggerSource(TriggerSource::Line),     "LINE"),
	(Choice::TriggerSource(TriggerSource::External), "AUX"),
];

// The TBS1000C has no high-resolution mode
const ACQUISITION_TBS1072C:&[(Choice, &str)] = &[
	(Choice::AcquisitionMode(AcquisitionMode::Sample),     "SAMple"),
	(Choice::AcquisitionMode(AcquisitionMode::PeakDetect), "PEAKdetect"),
	(Choice::AcquisitionMode(AcquisitionMode::Average),    "AVErage"),
];

const ACQUISITION_TBS2012B:&[(Choice, &str)] = &[
	(Choice::AcquisitionMode(AcquisitionMode::Sample),         "SAMple"),
	(Choice::AcquisitionMode(AcquisitionMode::PeakDetect),     "PEAKdetect"),
	(Choice::AcquisitionMode(AcquisitionMode::HighResolution), "HIRes"),
	(Choice::AcquisitionMode(AcquisitionMode::Average),        "AVErage"),
];

const DISPLAY:&[(Choice, &str)] = &[
	(Choice::Switch(Switch::On),  "1"),
	(Choice::Switch(Switch::Off), "0"),
];

const HEADER:&[(Choice, &str)] = &[
	(Choice::Switch(Switch::On),  "ON"),
	(Choice::Switch(Switch::Off), "OFF"),
];

const ENCODING:&[(Choice, &str)] = &[
	(Choice::Encoding(Encoding::Binary), "BINary"),
	(Choice::Encoding(Encoding::Ascii),  "ASCii"),
];

const WIDTH:&[(Choice, &str)] = &[
	(Choice::SampleWidth(SampleWidth::Byte), "1"),
	(Choice::SampleWidth(SampleWidth::Word), "2"),
];

const FORMAT:&[(Choice, &str)] = &[
	(Choice::BinaryFormat(BinaryFormat::Signed),   "RI"),
	(Choice::BinaryFormat(BinaryFormat::Unsigned), "RP"),
];

const ORDER:&[(Choice, &str)] = &[
	(Choice::ByteOrder(ByteOrder::MsbFirst), "MSB"),
	(Choice::ByteOrder(ByteOrder::LsbFirst), "LSB"),
];

impl Dialect for Tektronix {

	fn register(&self, model:Model, b:&mut DictionaryBuilder) -> std::result::Result<(), DictionaryError> {
		let (specific, acquisition) = match model {
			Model::Tbs1072c => (TBS1072C, ACQUISITION_TBS1072C),
			_               => (TBS2012B, ACQUISITION_TBS2012B),
		};

		for (op, cmd) in COMMON.iter().chain(specific.iter()) {
			b.register(model, *op, cmd)?;
		}

		let tables:&[(&[Op], &[(Choice, &'static str)])] = &[
			(&[Op::CouplingGet, Op::CouplingSet],               COUPLING),
			(&[Op::TriggerModeGet, Op::TriggerModeSet],         TRIGGER_MODE),
			(&[Op::TriggerSlopeGet, Op::TriggerSlopeSet],       TRIGGER_SLOPE),
			(&[Op::TriggerSourceGet, Op::TriggerSourceSet],     TRIGGER_SOURCE),
			(&[Op::AcquisitionModeGet, Op::AcquisitionModeSet], acquisition),
			(&[Op::ChannelDisplayGet, Op::ChannelDisplaySet],   DISPLAY),
			(&[Op::ResponseHeaderSet],                          HEADER),
			(&[Op::EncodingSet],                                ENCODING),
			(&[Op::SampleWidthSet],                             WIDTH),
			(&[Op::BinaryFormatSet],                            FORMAT),
			(&[Op::ByteOrderSet],                               ORDER),
		];

		for (ops, pairs) in tables.iter() {
			for op in ops.iter() {
				b.register_choices(model, *op, pairs)?;
			}
		}

		Ok(())
	}

	fn parse_preamble(&self, model:Model, reply:&str) -> Result<Preamble> {
		let fields = Fields { model, reply, entries: keyed_fields(reply) };

		let encoding = fields.text(&["ENCdg"])?;
		if !matches_mnemonic("BINary", encoding) {
			return Err(fields.malformed(format!("unsupported encoding {}", encoding)));
		}

		let width = match fields.count(&["BYT_Nr", "BYTE_Nr"])? {
			1 => SampleWidth::Byte,
			2 => SampleWidth::Word,
			n => return Err(fields.malformed(format!("unsupported sample width {}", n))),
		};

		let format = match fields.text(&["BN_Fmt"])? {
			f if matches_mnemonic("RI", f) => BinaryFormat::Signed,
			f if matches_mnemonic("RP", f) => BinaryFormat::Unsigned,
			f => return Err(fields.malformed(format!("unsupported binary format {}", f))),
		};

		let byte_order = match fields.text(&["BYT_Or", "BYTE_Or"])? {
			o if matches_mnemonic("MSB", o) => ByteOrder::MsbFirst,
			o if matches_mnemonic("LSB", o) => ByteOrder::LsbFirst,
			o => return Err(fields.malformed(format!("unknown byte order {}", o))),
		};

		let x_reference = match fields.lookup(&["PT_Off"]) {
			Some(_) => fields.count(&["PT_Off"])? as f64,
			None    => 0.0,
		};

		Ok(Preamble {
			points: fields.count(&["NR_Pt"])?,
			width,
			format,
			byte_order,
			x_increment: fields.number(&["XINcr"])?,
			x_zero: fields.number(&["XZEro"])?,
			x_reference,
			y_multiplier: fields.number(&["YMUlt"])?,
			y_zero: fields.number(&["YZEro"])?,
			y_reference: fields.number(&["YOFf"])?,
		})
	}

	fn parse_error_reply(&self, reply:&str) -> Option<String> {
		let esr:u8 = match reply.trim().parse() {
			Ok(v) => v,
			Err(_) => return Some(format!("unexpected *ESR? reply '{}'", reply.trim())),
		};

		let names:Vec<&str> = [(0x20u8, "command error"), (0x10, "execution error"), (0x08, "device error"), (0x04, "query error")]
			.iter()
			.filter(|(bit, _)| esr & *bit != 0)
			.map(|(_, name)| *name)
			.collect();

		if names.is_empty() { None }
		else { Some(format!("{} (ESR {})", names.join(", "), esr)) }
	}
}

struct Fields<'r> {
	model: Model,
	reply: &'r str,
	entries: Vec<(String, String)>,
}

impl<'r> Fields<'r> {

	fn malformed(&self, reason:String) -> ScopeError {
		ScopeError::MalformedPreamble { model: self.model, reason, reply: self.reply.trim().to_owned() }
	}

	// Any of the mnemonics, in long or short form
	fn lookup(&self, mnemonics:&[&str]) -> Option<&str> {
		self.entries.iter()
			.find(|(k, _)| mnemonics.iter().any(|m| matches_mnemonic(m, k)))
			.map(|(_, v)| v.as_str())
	}

	fn text(&self, mnemonics:&[&str]) -> Result<&str> {
		self.lookup(mnemonics).ok_or_else(|| self.malformed(format!("missing {}", mnemonics[0])))
	}

	fn number(&self, mnemonics:&[&str]) -> Result<f64> {
		let v = self.text(mnemonics)?;
		v.parse::<f64>().map_err(|_| self.malformed(format!("{} '{}' is not a number", mnemonics[0], v)))
	}

	fn count(&self, mnemonics:&[&str]) -> Result<usize> {
		let v = self.number(mnemonics)?;
		if v < 0.0 || v.fract() != 0.0 {
			return Err(self.malformed(format!("{} {} is not a count", mnemonics[0], v)));
		}
		Ok(v as usize)
	}
}

// Splits "KEY value;KEY value" at semicolons outside quotes. The first key may carry the
// full command path (":WFMOUTPRE:BYT_NR"), so only the last path element is kept.
fn keyed_fields(reply:&str) -> Vec<(String, String)> {
	let mut fields:Vec<(String, String)> = vec![];

	for part in split_unquoted(reply.trim(), ';') {
		let part = part.trim();
		let (key, value) = match part.find(char::is_whitespace) {
			Some(idx) => (&part[..idx], part[idx..].trim()),
			None => continue,
		};

		let key = key.rsplit(':').next().unwrap_or(key);
		fields.push((key.to_owned(), value.to_owned()));
	}

	fields
}

fn split_unquoted(s:&str, sep:char) -> Vec<&str> {
	let mut parts:Vec<&str> = vec![];
	let mut quoted = false;
	let mut start = 0;

	for (idx, c) in s.char_indices() {
		if c == '"' { quoted = !quoted; }
		else if c == sep && !quoted {
			parts.push(&s[start..idx]);
			start = idx + c.len_utf8();
		}
	}
	parts.push(&s[start..]);

	parts
}
