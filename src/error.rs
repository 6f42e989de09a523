use std::io;
use std::time::Duration;

use crate::commands::Operation;
use crate::devices::Model;

pub type Result<T> = std::result::Result<T, ScopeError>;

// Failures below the SCPI layer: sockets, RPC framing, resource strings
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	#[error("Timed out after {0:?} waiting for the instrument")]
	Timeout(Duration),

	#[error("RPC error: {0}")]
	Rpc(String),

	#[error("VXI-11 device error {code}: {message}")]
	Device { code: i32, message: &'static str },

	#[error("Resource string '{0}' is not a valid VISA resource")]
	InvalidResource(String),

	#[error("Resource '{0}' uses an interface this driver cannot open")]
	UnsupportedResource(String),

	#[error("No link is open to the instrument")]
	NotConnected,
}

impl TransportError {
	// Read timeouts show up as WouldBlock or TimedOut depending on the platform
	pub(crate) fn from_io(e: io::Error, timeout: Duration) -> Self {
		match e.kind() {
			io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout(timeout),
			_ => TransportError::Io(e),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
	#[error("{model} already has a command registered for {operation:?}")]
	DuplicateOperation { model: Model, operation: Operation },

	#[error("{model}: command '{command}' is registered for both {first:?} and {second:?}")]
	DuplicateCommand { model: Model, command: String, first: Operation, second: Operation },

	#[error("{model} {operation:?}: token '{token}' maps to more than one value")]
	AmbiguousToken { model: Model, operation: Operation, token: String },

	#[error("{model} {operation:?}: value {value} is listed twice")]
	DuplicateValue { model: Model, operation: Operation, value: String },

	#[error("{model} {operation:?}: value {value} does not belong to this operation")]
	KindMismatch { model: Model, operation: Operation, value: String },

	#[error("{model} {operation:?}: enumerated operation has no value table")]
	MissingChoices { model: Model, operation: Operation },

	#[error("{model}: command for {operation:?} is empty")]
	EmptyCommand { model: Model, operation: Operation },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Unable to read configuration: {0}")]
	Io(#[from] io::Error),

	#[error("Invalid configuration: {0}")]
	Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
	#[error("Communication with the instrument failed: {0}")]
	Communication(#[from] TransportError),

	#[error("{model} does not support {operation:?}")]
	UnsupportedOperation { model: Model, operation: Operation },

	#[error("{model} has no setting {value} for {operation:?}")]
	UnsupportedValue { model: Model, operation: Operation, value: String },

	#[error("{model} replied '{reply}' to {operation:?}, which is not a known value")]
	UnknownReply { model: Model, operation: Operation, reply: String },

	#[error("Unable to parse reply '{reply}' to {operation:?} from {model}")]
	UnparsableReply { model: Model, operation: Operation, reply: String },

	#[error("Malformed waveform preamble from {model} ({reason}): '{reply}'")]
	MalformedPreamble { model: Model, reason: String, reply: String },

	#[error("Waveform preamble describes an unusable acquisition: {0}")]
	InvalidPreamble(String),

	#[error("Binary block framing error: {0}")]
	Framing(String),

	#[error("Binary block declared {declared} bytes but only {received} arrived before the terminator")]
	TruncatedData { declared: usize, received: usize },

	#[error("Preamble declared {declared} samples but the data block holds {decoded}")]
	SampleCountMismatch { declared: usize, decoded: usize },

	#[error("Invalid value {value} for {operation:?}: {reason}")]
	InvalidValue { operation: Operation, value: String, reason: String },

	#[error("Channel index {index} is out of range, {model} has {count} channels")]
	InvalidChannel { model: Model, index: usize, count: usize },

	#[error("Connected instrument '{0}' is not a supported model")]
	UnknownModel(String),

	#[error("Instrument reported an error: {0}")]
	Instrument(String),

	#[error(transparent)]
	Dictionary(#[from] DictionaryError),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl ScopeError {
	pub(crate) fn invalid_value<V: ToString>(operation: Operation, value: V, reason: &str) -> Self {
		ScopeError::InvalidValue { operation, value: value.to_string(), reason: reason.to_owned() }
	}
}
