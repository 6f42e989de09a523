// Enumerated settings. Each has a literal token per model in the command tables.

use std::convert::TryFrom;
use std::fmt;

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Coupling { Ac, Dc, Ground }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionMode { Sample, PeakDetect, HighResolution, Average }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerMode { Auto, Normal }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSlope { Rising, Falling }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSource { Channel1, Channel2, Line, External }

/// Which record `WaveformDataGet` transfers: the screen-sized measurement record, the full
/// acquisition record, or whichever of the two is larger in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointsMode { Normal, Maximum, Raw }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleWidth { Byte, Word }

impl SampleWidth {
	pub fn bytes(self) -> usize { match self {
		SampleWidth::Byte => 1,
		SampleWidth::Word => 2,
	}}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryFormat { Signed, Unsigned }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder { MsbFirst, LsbFirst }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding { Binary, Ascii }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Switch { On, Off }

impl From<bool> for Switch {
	fn from(b: bool) -> Self { if b { Switch::On } else { Switch::Off } }
}

impl From<Switch> for bool {
	fn from(s: Switch) -> Self { s == Switch::On }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoiceKind {
	Coupling,
	AcquisitionMode,
	TriggerMode,
	TriggerSlope,
	TriggerSource,
	PointsMode,
	SampleWidth,
	BinaryFormat,
	ByteOrder,
	Encoding,
	Switch,
}

/// Any enumerated logical value, tagged with the setting it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
	Coupling(Coupling),
	AcquisitionMode(AcquisitionMode),
	TriggerMode(TriggerMode),
	TriggerSlope(TriggerSlope),
	TriggerSource(TriggerSource),
	PointsMode(PointsMode),
	SampleWidth(SampleWidth),
	BinaryFormat(BinaryFormat),
	ByteOrder(ByteOrder),
	Encoding(Encoding),
	Switch(Switch),
}

impl fmt::Display for Choice {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Choice::Coupling(v)        => write!(f, "{:?}", v),
			Choice::AcquisitionMode(v) => write!(f, "{:?}", v),
			Choice::TriggerMode(v)     => write!(f, "{:?}", v),
			Choice::TriggerSlope(v)    => write!(f, "{:?}", v),
			Choice::TriggerSource(v)   => write!(f, "{:?}", v),
			Choice::PointsMode(v)      => write!(f, "{:?}", v),
			Choice::SampleWidth(v)     => write!(f, "{:?}", v),
			Choice::BinaryFormat(v)    => write!(f, "{:?}", v),
			Choice::ByteOrder(v)       => write!(f, "{:?}", v),
			Choice::Encoding(v)        => write!(f, "{:?}", v),
			Choice::Switch(v)          => write!(f, "{:?}", v),
		}
	}
}

macro_rules! choice_conversions {
	($($name:ident),*) => {
		impl Choice {
			pub fn kind(&self) -> ChoiceKind {
				match self { $(Choice::$name(_) => ChoiceKind::$name,)* }
			}
		}

		$(
			impl From<$name> for Choice {
				fn from(v: $name) -> Self { Choice::$name(v) }
			}

			impl TryFrom<Choice> for $name {
				type Error = Choice;

				fn try_from(c: Choice) -> Result<Self, Choice> {
					match c {
						Choice::$name(v) => Ok(v),
						other => Err(other),
					}
				}
			}
		)*
	};
}

choice_conversions!(
	Coupling, AcquisitionMode, TriggerMode, TriggerSlope, TriggerSource, PointsMode, SampleWidth, BinaryFormat,
	ByteOrder, Encoding, Switch
);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn conversions_keep_the_kind() {
		let c: Choice = Coupling::Ground.into();
		assert_eq!(c.kind(), ChoiceKind::Coupling);
		assert_eq!(Coupling::try_from(c), Ok(Coupling::Ground));
		assert_eq!(TriggerSlope::try_from(c), Err(c));
		assert_eq!(c.to_string(), "Ground");
	}
}
