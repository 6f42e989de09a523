// Keysight InfiniiVision DSOX1000 series.
//
// The preamble itself does not say whether samples are signed or which byte comes first, so the
// query asks for both alongside it: "<unsigned>;<byte order>;<ten preamble values>".

use crate::bidict::matches_mnemonic;
use crate::commands::{
	AcquisitionMode, BinaryFormat, ByteOrder, Choice, Coupling, DictionaryBuilder, Operation as Op, PointsMode,
	SampleWidth, Switch, TriggerMode, TriggerSlope, TriggerSource,
};
use crate::error::{DictionaryError, Result, ScopeError};
use crate::waveform::Preamble;

use super::{Dialect, Model};

pub struct Keysight;

// :WAVeform:FORMat codes as they appear in the preamble
const FORMAT_BYTE:u8 = 0;
const FORMAT_WORD:u8 = 1;
const FORMAT_ASCII:u8 = 4;

const DSOX1102A:&[(Op, &str)] = &[
	(Op::Identify,            "*IDN?"),
	(Op::ClearStatus,         "*CLS"),
	(Op::Reset,               "*RST"),
	(Op::ErrorQuery,          ":SYSTem:ERRor?"),
	(Op::Run,                 ":RUN"),
	(Op::Stop,                ":STOP"),
	(Op::Single,              ":SINGle"),
	(Op::Autoset,             ":AUToscale"),
	(Op::ForceTrigger,        "*TRG"),

	(Op::HorizontalScaleGet,  ":TIMebase:SCALe?"),
	(Op::HorizontalScaleSet,  ":TIMebase:SCALe"),
	(Op::SampleRateGet,       ":ACQuire:SRATe?"),
	(Op::RecordLengthGet,     ":ACQuire:POINts?"),
	(Op::HorizontalDelayGet,  ":TIMebase:POSition?"),
	(Op::HorizontalDelaySet,  ":TIMebase:POSition"),
	(Op::AcquisitionModeGet,  ":ACQuire:TYPE?"),
	(Op::AcquisitionModeSet,  ":ACQuire:TYPE"),

	(Op::TriggerModeGet,      ":TRIGger:SWEep?"),
	(Op::TriggerModeSet,      ":TRIGger:SWEep"),
	(Op::TriggerSlopeGet,     ":TRIGger:SLOPe?"),
	(Op::TriggerSlopeSet,     ":TRIGger:SLOPe"),
	(Op::TriggerSourceGet,    ":TRIGger:EDGE:SOURce?"),
	(Op::TriggerSourceSet,    ":TRIGger:EDGE:SOURce"),
	(Op::TriggerLevelGet,     ":TRIGger:EDGE:LEVel? CHANnel{ch}"),
	(Op::TriggerLevelSet,     ":TRIGger:EDGE:LEVel {value},CHANnel{ch}"),

	(Op::CouplingGet,         ":CHANnel{ch}:COUPling?"),
	(Op::CouplingSet,         ":CHANnel{ch}:COUPling"),
	(Op::VerticalScaleGet,    ":CHANnel{ch}:SCALe?"),
	(Op::VerticalScaleSet,    ":CHANnel{ch}:SCALe"),
	(Op::VerticalOffsetGet,   ":CHANnel{ch}:OFFSet?"),
	(Op::VerticalOffsetSet,   ":CHANnel{ch}:OFFSet"),
	(Op::ProbeAttenuationGet, ":CHANnel{ch}:PROBe?"),
	(Op::ProbeAttenuationSet, ":CHANnel{ch}:PROBe"),
	(Op::ChannelDisplayGet,   ":CHANnel{ch}:DISPlay?"),
	(Op::ChannelDisplaySet,   ":CHANnel{ch}:DISPlay"),

	(Op::DataSourceSet,       ":WAVeform:SOURce CHANnel{ch}"),
	(Op::SampleWidthSet,      ":WAVeform:FORMat"),
	(Op::BinaryFormatSet,     ":WAVeform:UNSigned"),
	(Op::ByteOrderSet,        ":WAVeform:BYTeorder"),
	(Op::WaveformPointsGet,   ":WAVeform:POINts?"),
	(Op::WaveformPointsSet,   ":WAVeform:POINts"),
	(Op::WaveformPointsModeGet, ":WAVeform:POINts:MODE?"),
	(Op::WaveformPointsModeSet, ":WAVeform:POINts:MODE"),
	(Op::PreambleGet,         ":WAVeform:UNSigned?;BYTeorder?;PREamble?"),
	(Op::WaveformDataGet,     ":WAVeform:DATA?"),
];

const COUPLING:&[(Choice, &str)] = &[
	(Choice::Coupling(Coupling::Ac), "AC"),
	(Choice::Coupling(Coupling::Dc), "DC"),
];

const TRIGGER_MODE:&[(Choice, &str)] = &[
	(Choice::TriggerMode(TriggerMode::Auto),   "AUTO"),
	(Choice::TriggerMode(TriggerMode::Normal), "NORMal"),
];

const TRIGGER_SLOPE:&[(Choice, &str)] = &[
	(Choice::TriggerSlope(TriggerSlope::Rising),  "POSitive"),
	(Choice::TriggerSlope(TriggerSlope::Falling), "NEGative"),
];

const TRIGGER_SOURCE:&[(Choice, &str)] = &[
	(Choice::TriggerSource(TriggerSource::Channel1), "CHANnel1"),
	(Choice::TriggerSource(TriggerSource::Channel2), "CHANnel2"),
	(Choice::TriggerSource(TriggerSource::Line),     "LINE"),
	(Choice::TriggerSource(TriggerSource::External), "EXTernal"),
];

const POINTS_MODE:&[(Choice, &str)] = &[
	(Choice::PointsMode(PointsMode::Normal),  "NORMal"),
	(Choice::PointsMode(PointsMode::Maximum), "MAXimum"),
	(Choice::PointsMode(PointsMode::Raw),     "RAW"),
];

const ACQUISITION:&[(Choice, &str)] = &[
	(Choice::AcquisitionMode(AcquisitionMode::Sample),         "NORMal"),
	(Choice::AcquisitionMode(AcquisitionMode::PeakDetect),     "PEAK"),
	(Choice::AcquisitionMode(AcquisitionMode::HighResolution), "HRESolution"),
	(Choice::AcquisitionMode(AcquisitionMode::Average),        "AVERage"),
];

const DISPLAY:&[(Choice, &str)] = &[
	(Choice::Switch(Switch::On),  "1"),
	(Choice::Switch(Switch::Off), "0"),
];

const WIDTH:&[(Choice, &str)] = &[
	(Choice::SampleWidth(SampleWidth::Byte), "BYTE"),
	(Choice::SampleWidth(SampleWidth::Word), "WORD"),
];

const FORMAT:&[(Choice, &str)] = &[
	(Choice::BinaryFormat(BinaryFormat::Signed),   "0"),
	(Choice::BinaryFormat(BinaryFormat::Unsigned), "1"),
];

const ORDER:&[(Choice, &str)] = &[
	(Choice::ByteOrder(ByteOrder::MsbFirst), "MSBFirst"),
	(Choice::ByteOrder(ByteOrder::LsbFirst), "LSBFirst"),
];

impl Dialect for Keysight {

	fn register(&self, model:Model, b:&mut DictionaryBuilder) -> std::result::Result<(), DictionaryError> {
		for (op, cmd) in DSOX1102A.iter() {
			b.register(model, *op, cmd)?;
		}

		let tables:&[(&[Op], &[(Choice, &'static str)])] = &[
			(&[Op::CouplingGet, Op::CouplingSet],               COUPLING),
			(&[Op::TriggerModeGet, Op::TriggerModeSet],         TRIGGER_MODE),
			(&[Op::TriggerSlopeGet, Op::TriggerSlopeSet],       TRIGGER_SLOPE),
			(&[Op::TriggerSourceGet, Op::TriggerSourceSet],     TRIGGER_SOURCE),
			(&[Op::WaveformPointsModeGet, Op::WaveformPointsModeSet], POINTS_MODE),
			(&[Op::AcquisitionModeGet, Op::AcquisitionModeSet], ACQUISITION),
			(&[Op::ChannelDisplayGet, Op::ChannelDisplaySet],   DISPLAY),
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
		let malformed = |reason:String| ScopeError::MalformedPreamble { model, reason, reply: reply.trim().to_owned() };

		let parts:Vec<&str> = reply.trim().split(';').map(str::trim).collect();
		if parts.len() != 3 {
			return Err(malformed(format!("expected 3 replies, found {}", parts.len())));
		}

		let values:Vec<&str> = parts[2].split(',').map(str::trim).collect();
		if values.len() != 10 {
			return Err(malformed(format!("expected 10 preamble values, found {}", values.len())));
		}

		let mut numbers:Vec<f64> = Vec::with_capacity(values.len());
		for (idx, v) in values.iter().enumerate() {
			numbers.push(v.parse().map_err(|_| malformed(format!("value {} '{}' is not a number", idx, v)))?);
		}

		let integral = |idx:usize| -> Result<usize> {
			let v = numbers[idx];
			if v < 0.0 || v.fract() != 0.0 {
				return Err(malformed(format!("value {} ({}) is not a count", idx, v)));
			}
			Ok(v as usize)
		};

		let width = match integral(0)? {
			n if n == FORMAT_BYTE as usize => SampleWidth::Byte,
			n if n == FORMAT_WORD as usize => SampleWidth::Word,
			n if n == FORMAT_ASCII as usize => return Err(malformed("ASCII waveform format".to_owned())),
			n => return Err(malformed(format!("unknown waveform format {}", n))),
		};

		let format = match parts[0].trim_start_matches('+') {
			"0" => BinaryFormat::Signed,
			"1" => BinaryFormat::Unsigned,
			other => return Err(malformed(format!("unexpected :WAVeform:UNSigned reply '{}'", other))),
		};

		let byte_order = match parts[1] {
			o if matches_mnemonic("MSBFirst", o) => ByteOrder::MsbFirst,
			o if matches_mnemonic("LSBFirst", o) => ByteOrder::LsbFirst,
			o => return Err(malformed(format!("unknown byte order {}", o))),
		};

		Ok(Preamble {
			points: integral(2)?,
			width,
			format,
			byte_order,
			x_increment: numbers[4],
			x_zero: numbers[5],
			x_reference: numbers[6],
			y_multiplier: numbers[7],
			y_zero: numbers[8],
			y_reference: numbers[9],
		})
	}

	// "+0,\"No error\"" or "-113,\"Undefined header\""
	fn parse_error_reply(&self, reply:&str) -> Option<String> {
		let reply = reply.trim();
		let (code, message) = match reply.find(',') {
			Some(idx) => (&reply[..idx], reply[idx+1..].trim().trim_matches('"')),
			None => (reply, ""),
		};

		match code.parse::<i32>() {
			Ok(0) => None,
			Ok(n) => Some(format!("{} {}", n, message)),
			Err(_) => Some(format!("unexpected :SYSTem:ERRor? reply '{}'", reply)),
		}
	}
}
