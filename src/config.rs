use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::error::ConfigError;
use crate::waveform::TransferFormat;

pub const DEFAULT_TIMEOUT_MS:u64 = 10_000;

/// Session settings. Every field is optional in JSON; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// How long to wait for the instrument on each transfer.
	pub timeout_ms: u64,

	/// Pause between writing a query and reading its reply. Some USB-to-LAN bridges need one.
	pub query_delay_ms: u64,

	/// Read the instrument's error queue after every command that does not expect a reply.
	pub check_errors: bool,

	/// Sample encoding requested on open. `None` uses the model default.
	pub transfer: Option<TransferFormat>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self { timeout_ms: DEFAULT_TIMEOUT_MS, query_delay_ms: 0, check_errors: false, transfer: None }
	}
}

impl SessionConfig {

	pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
	pub fn query_delay(&self) -> Duration { Duration::from_millis(self.query_delay_ms) }

	pub fn from_json_str(s:&str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(s)?)
	}

	pub fn from_json_file<P:AsRef<Path>>(path:P) -> Result<Self, ConfigError> {
		let text = fs::read_to_string(path)?;
		Self::from_json_str(&text)
	}
}
