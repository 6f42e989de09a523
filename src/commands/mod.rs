// Logical operations and the per-model table that turns them into literal SCPI strings.
//
// The built-in tables are assembled once, on first use, from the vendor modules under
// `devices` and are read-only from then on. Additional tables can be put together with
// `DictionaryBuilder`, which refuses duplicate or conflicting registrations.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::bidict::{BiMap, Conflict};
use crate::devices::Model;
use crate::error::{DictionaryError, Result, ScopeError};

mod choices;

pub use choices::{
	AcquisitionMode, BinaryFormat, ByteOrder, Choice, ChoiceKind, Coupling, Encoding, PointsMode, SampleWidth,
	Switch, TriggerMode, TriggerSlope, TriggerSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
	Identify,
	ClearStatus,
	Reset,
	ErrorQuery,
	ResponseHeaderSet,
	Run,
	Stop,
	Single,
	Continuous,
	Autoset,
	ForceTrigger,

	HorizontalScaleGet,
	HorizontalScaleSet,
	SampleRateGet,
	MaxSampleRateGet,
	RecordLengthGet,
	RecordLengthSet,
	HorizontalDelayGet,
	HorizontalDelaySet,
	AcquisitionModeGet,
	AcquisitionModeSet,

	TriggerModeGet,
	TriggerModeSet,
	TriggerSlopeGet,
	TriggerSlopeSet,
	TriggerSourceGet,
	TriggerSourceSet,
	TriggerLevelGet,
	TriggerLevelSet,

	CouplingGet,
	CouplingSet,
	VerticalScaleGet,
	VerticalScaleSet,
	VerticalOffsetGet,
	VerticalOffsetSet,
	ProbeAttenuationGet,
	ProbeAttenuationSet,
	ProbeGainGet,
	ProbeGainSet,
	ChannelDisplayGet,
	ChannelDisplaySet,

	DataSourceSet,
	EncodingSet,
	SampleWidthSet,
	BinaryFormatSet,
	ByteOrderSet,
	DataStartSet,
	DataStopSet,
	WaveformPointsGet,
	WaveformPointsSet,
	WaveformPointsModeGet,
	WaveformPointsModeSet,
	PreambleGet,
	WaveformDataGet,
}

/// What travels with an operation: nothing, a reply to read, or a value to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
	Action,
	Text,
	Number,
	Integer,
	Choice(ChoiceKind),
	Block,
}

impl Operation {

	pub const ALL: &'static [Operation] = &[
		Operation::Identify, Operation::ClearStatus, Operation::Reset, Operation::ErrorQuery,
		Operation::ResponseHeaderSet, Operation::Run, Operation::Stop, Operation::Single, Operation::Continuous,
		Operation::Autoset, Operation::ForceTrigger, Operation::HorizontalScaleGet, Operation::HorizontalScaleSet,
		Operation::SampleRateGet, Operation::MaxSampleRateGet, Operation::RecordLengthGet,
		Operation::RecordLengthSet, Operation::HorizontalDelayGet, Operation::HorizontalDelaySet,
		Operation::AcquisitionModeGet, Operation::AcquisitionModeSet, Operation::TriggerModeGet,
		Operation::TriggerModeSet, Operation::TriggerSlopeGet, Operation::TriggerSlopeSet,
		Operation::TriggerSourceGet, Operation::TriggerSourceSet,
		Operation::TriggerLevelGet, Operation::TriggerLevelSet, Operation::CouplingGet, Operation::CouplingSet,
		Operation::VerticalScaleGet, Operation::VerticalScaleSet, Operation::VerticalOffsetGet,
		Operation::VerticalOffsetSet, Operation::ProbeAttenuationGet, Operation::ProbeAttenuationSet,
		Operation::ProbeGainGet, Operation::ProbeGainSet, Operation::ChannelDisplayGet,
		Operation::ChannelDisplaySet, Operation::DataSourceSet, Operation::EncodingSet,
		Operation::SampleWidthSet, Operation::BinaryFormatSet, Operation::ByteOrderSet, Operation::DataStartSet,
		Operation::DataStopSet, Operation::WaveformPointsGet, Operation::WaveformPointsSet,
		Operation::WaveformPointsModeGet, Operation::WaveformPointsModeSet, Operation::PreambleGet,
		Operation::WaveformDataGet,
	];

	pub fn kind(self) -> ValueKind {
		use Operation::*;

		match self {
			ClearStatus | Reset | Run | Stop | Single | Continuous | Autoset | ForceTrigger
			| DataSourceSet => ValueKind::Action,
			Identify | ErrorQuery | PreambleGet => ValueKind::Text,
			WaveformDataGet => ValueKind::Block,

			RecordLengthGet | RecordLengthSet | DataStartSet | DataStopSet | WaveformPointsGet
			| WaveformPointsSet => ValueKind::Integer,

			HorizontalScaleGet | HorizontalScaleSet | SampleRateGet | MaxSampleRateGet | HorizontalDelayGet
			| HorizontalDelaySet | TriggerLevelGet | TriggerLevelSet | VerticalScaleGet | VerticalScaleSet
			| VerticalOffsetGet | VerticalOffsetSet | ProbeAttenuationGet | ProbeAttenuationSet | ProbeGainGet
			| ProbeGainSet => ValueKind::Number,

			AcquisitionModeGet | AcquisitionModeSet => ValueKind::Choice(ChoiceKind::AcquisitionMode),
			TriggerModeGet | TriggerModeSet         => ValueKind::Choice(ChoiceKind::TriggerMode),
			TriggerSlopeGet | TriggerSlopeSet       => ValueKind::Choice(ChoiceKind::TriggerSlope),
			TriggerSourceGet | TriggerSourceSet     => ValueKind::Choice(ChoiceKind::TriggerSource),
			WaveformPointsModeGet
			| WaveformPointsModeSet                 => ValueKind::Choice(ChoiceKind::PointsMode),
			CouplingGet | CouplingSet               => ValueKind::Choice(ChoiceKind::Coupling),
			ChannelDisplayGet | ChannelDisplaySet   => ValueKind::Choice(ChoiceKind::Switch),
			ResponseHeaderSet                       => ValueKind::Choice(ChoiceKind::Switch),
			EncodingSet                             => ValueKind::Choice(ChoiceKind::Encoding),
			SampleWidthSet                          => ValueKind::Choice(ChoiceKind::SampleWidth),
			BinaryFormatSet                         => ValueKind::Choice(ChoiceKind::BinaryFormat),
			ByteOrderSet                            => ValueKind::Choice(ChoiceKind::ByteOrder),
		}
	}

	/// Commands whose template carries a `{ch}` placeholder.
	pub fn per_channel(self) -> bool {
		use Operation::*;

		match self {
			TriggerLevelGet | TriggerLevelSet | CouplingGet | CouplingSet | VerticalScaleGet | VerticalScaleSet
			| VerticalOffsetGet | VerticalOffsetSet | ProbeAttenuationGet | ProbeAttenuationSet | ProbeGainGet
			| ProbeGainSet | ChannelDisplayGet | ChannelDisplaySet | DataSourceSet => true,
			_ => false,
		}
	}
}

/// Fill a command template. `{ch}` takes the 1-based channel number; the value replaces
/// `{value}` when the template has one and is appended after a space otherwise.
pub fn render(template: &str, channel: Option<u8>, value: Option<&str>) -> String {
	let mut cmd = match channel {
		Some(n) => template.replace("{ch}", &n.to_string()),
		None    => template.to_owned(),
	};

	if let Some(v) = value {
		if cmd.contains("{value}") {
			cmd = cmd.replace("{value}", v);
		} else {
			cmd.push(' ');
			cmd.push_str(v);
		}
	}

	cmd
}

#[derive(Default)]
struct ModelTable {
	commands: HashMap<Operation, &'static str>,
	choices: HashMap<Operation, BiMap<Choice>>,
}

pub struct CommandDictionary {
	tables: HashMap<Model, ModelTable>,
}

impl CommandDictionary {

	pub fn builder() -> DictionaryBuilder { DictionaryBuilder { tables: HashMap::new() } }

	pub fn resolve(&self, model: Model, operation: Operation) -> Result<&'static str> {
		self.tables.get(&model)
			.and_then(|t| t.commands.get(&operation))
			.copied()
			.ok_or(ScopeError::UnsupportedOperation { model, operation })
	}

	pub fn supports(&self, model: Model, operation: Operation) -> bool {
		self.resolve(model, operation).is_ok()
	}

	pub fn decode_reply(&self, model: Model, operation: Operation, token: &str) -> Result<Choice> {
		self.values(model, operation)?
			.logical(token)
			.ok_or_else(|| ScopeError::UnknownReply { model, operation, reply: token.trim().to_owned() })
	}

	pub fn encode_value(&self, model: Model, operation: Operation, value: Choice) -> Result<&'static str> {
		self.values(model, operation)?
			.literal(value)
			.ok_or_else(|| ScopeError::UnsupportedValue { model, operation, value: value.to_string() })
	}

	/// Every logical value the model accepts for an enumerated operation.
	pub fn choices(&self, model: Model, operation: Operation) -> Result<Vec<Choice>> {
		Ok(self.values(model, operation)?.values().collect())
	}

	pub fn operations(&self, model: Model) -> Vec<Operation> {
		let mut ops: Vec<Operation> = self.tables.get(&model)
			.map(|t| t.commands.keys().copied().collect())
			.unwrap_or_default();
		ops.sort();
		ops
	}

	fn values(&self, model: Model, operation: Operation) -> Result<&BiMap<Choice>> {
		self.resolve(model, operation)?;
		self.tables.get(&model)
			.and_then(|t| t.choices.get(&operation))
			.ok_or(ScopeError::UnsupportedOperation { model, operation })
	}
}

pub struct DictionaryBuilder {
	tables: HashMap<Model, ModelTable>,
}

impl DictionaryBuilder {

	pub fn register(&mut self, model: Model, operation: Operation, command: &'static str) -> std::result::Result<&mut Self, DictionaryError> {
		if command.trim().is_empty() {
			return Err(DictionaryError::EmptyCommand { model, operation });
		}

		let table = self.tables.entry(model).or_default();
		if table.commands.contains_key(&operation) {
			return Err(DictionaryError::DuplicateOperation { model, operation });
		}
		if let Some((first, _)) = table.commands.iter().find(|(_, c)| **c == command) {
			return Err(DictionaryError::DuplicateCommand { model, command: command.to_owned(), first: *first, second: operation });
		}

		table.commands.insert(operation, command);
		Ok(self)
	}

	pub fn register_choices(&mut self, model: Model, operation: Operation, pairs: &[(Choice, &'static str)]) -> std::result::Result<&mut Self, DictionaryError> {
		let expected = match operation.kind() {
			ValueKind::Choice(k) => k,
			_ => return Err(DictionaryError::KindMismatch { model, operation, value: "any enumerated value".to_owned() }),
		};
		if let Some((bad, _)) = pairs.iter().find(|(c, _)| c.kind() != expected) {
			return Err(DictionaryError::KindMismatch { model, operation, value: bad.to_string() });
		}

		let map = BiMap::from_pairs(pairs).map_err(|conflict| match conflict {
			Conflict::DuplicateValue(v)   => DictionaryError::DuplicateValue { model, operation, value: v.to_string() },
			Conflict::AmbiguousToken(tok) => DictionaryError::AmbiguousToken { model, operation, token: tok },
		})?;

		let table = self.tables.entry(model).or_default();
		if table.choices.contains_key(&operation) {
			return Err(DictionaryError::DuplicateOperation { model, operation });
		}
		table.choices.insert(operation, map);
		Ok(self)
	}

	pub fn build(self) -> std::result::Result<CommandDictionary, DictionaryError> {
		for (model, table) in self.tables.iter() {
			for op in table.commands.keys() {
				let enumerated = match op.kind() { ValueKind::Choice(_) => true, _ => false };
				if enumerated && !table.choices.contains_key(op) {
					return Err(DictionaryError::MissingChoices { model: *model, operation: *op });
				}
			}
		}

		Ok(CommandDictionary { tables: self.tables })
	}
}

fn builtin() -> std::result::Result<CommandDictionary, DictionaryError> {
	let mut builder = CommandDictionary::builder();
	for model in Model::ALL {
		model.dialect().register(*model, &mut builder)?;
	}
	builder.build()
}

lazy_static! {
	static ref DICTIONARY: CommandDictionary = builtin().expect("built-in command tables are consistent");
}

pub fn dictionary() -> &'static CommandDictionary { &DICTIONARY }
