// A connection to one oscilloscope. Every getter is a fresh round trip to the instrument; the
// only thing kept locally is the timebase read back after the last horizontal scale change.

use std::convert::TryFrom;
use std::thread;

use log::{debug, trace, warn};
use serde::{Serialize, Deserialize};

use crate::channel::{Channel, ChannelState};
use crate::commands::{
	self, dictionary, AcquisitionMode, Choice, Encoding, Operation, PointsMode, Switch, TriggerMode, TriggerSlope,
	TriggerSource,
};
use crate::config::SessionConfig;
use crate::devices::{Identity, Model};
use crate::error::{Result, ScopeError};
use crate::transport::{self, Resource, Transport};
use crate::waveform::{block, Signal, TransferFormat};

// IEEE 488.2 common query, answered the same way by every model
const IDN_QUERY:&str = "*IDN?";

// Size of the measurement record, the one transferred in normal points mode
const MEASUREMENT_RECORD_POINTS:u64 = 62_500;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timebase {
	pub horizontal_scale: f64,
	pub sample_rate: f64,
	pub record_length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
	pub model: Model,
	pub timebase: Timebase,
	pub horizontal_delay: f64,
	pub acquisition_mode: AcquisitionMode,
	pub trigger_mode: TriggerMode,
	pub trigger_slope: TriggerSlope,
	pub trigger_source: TriggerSource,
	pub channels: Vec<ChannelState>,
}

pub struct Session<T:Transport> {
	transport: T,
	model: Model,
	config: SessionConfig,
	timebase: Option<Timebase>,
}

impl Session<Box<dyn Transport>> {

	/// Open the VISA resource, identify the instrument and prepare it for transfers.
	pub fn connect(resource:&str, config:SessionConfig) -> Result<Self> {
		let resource:Resource = resource.parse()?;
		let transport = transport::open(&resource, &config)?;
		Session::identify(transport, config)
	}
}

impl<T:Transport> Session<T> {

	/// Ask an already open transport who it is and open a session for that model.
	pub fn identify(mut transport:T, config:SessionConfig) -> Result<Self> {
		transport.write(IDN_QUERY)?;
		if config.query_delay_ms > 0 { thread::sleep(config.query_delay()); }
		let reply = String::from_utf8_lossy(&transport.read_until_terminator()?).trim().to_owned();

		let identity = Identity::parse(&reply).ok_or_else(|| ScopeError::UnknownModel(reply.clone()))?;
		let model = identity.supported_model().ok_or_else(|| ScopeError::UnknownModel(identity.model.clone()))?;

		debug!("Identified {} {} (serial {}, firmware {})", identity.manufacturer, model, identity.serial_number, identity.firmware);
		Session::open(transport, model, config)
	}

	/// Open a session for a known model. Clears status and configures the transfer format.
	pub fn open(transport:T, model:Model, config:SessionConfig) -> Result<Self> {
		let mut session = Session { transport, model, config, timebase: None };
		session.initialize()?;
		Ok(session)
	}

	fn initialize(&mut self) -> Result<()> {
		self.write(Operation::ClearStatus, None, None)?;

		if self.supports(Operation::ResponseHeaderSet) {
			self.send_choice(Operation::ResponseHeaderSet, None, Switch::Off.into())?;
		}

		let transfer = self.config.transfer.unwrap_or_else(|| self.model.default_transfer());
		self.set_transfer_format(transfer)?;

		if self.supports(Operation::DataStartSet) && self.supports(Operation::DataStopSet) {
			let record_length = self.record_length()?;
			self.send_integer(Operation::DataStartSet, None, 1)?;
			self.send_integer(Operation::DataStopSet, None, record_length)?;
		}

		debug!("{} session ready", self.model);
		Ok(())
	}

	pub fn model(&self) -> Model { self.model }
	pub fn config(&self) -> &SessionConfig { &self.config }
	pub fn transport(&self) -> &T { &self.transport }
	pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }
	pub fn into_transport(self) -> T { self.transport }

	/// Timebase read back after the last `set_horizontal_scale`, cleared by `set_record_length`.
	pub fn cached_timebase(&self) -> Option<Timebase> { self.timebase }

	pub fn supports(&self, operation:Operation) -> bool { dictionary().supports(self.model, operation) }

	// Wire helpers

	fn command(&self, operation:Operation, channel:Option<u8>, value:Option<&str>) -> Result<String> {
		let template = dictionary().resolve(self.model, operation)?;
		Ok(commands::render(template, channel, value))
	}

	fn pause(&self) {
		if self.config.query_delay_ms > 0 { thread::sleep(self.config.query_delay()); }
	}

	pub(crate) fn write(&mut self, operation:Operation, channel:Option<u8>, value:Option<&str>) -> Result<()> {
		let cmd = self.command(operation, channel, value)?;
		debug!("{} <- {}", self.model, cmd);
		self.transport.write(&cmd)?;

		if self.config.check_errors { self.check_errors()?; }
		Ok(())
	}

	pub(crate) fn query(&mut self, operation:Operation, channel:Option<u8>) -> Result<String> {
		let cmd = self.command(operation, channel, None)?;
		debug!("{} <- {}", self.model, cmd);
		self.transport.write(&cmd)?;
		self.pause();

		let reply = self.transport.read_until_terminator()?;
		let text = String::from_utf8_lossy(&reply).trim().to_owned();
		trace!("{} -> {}", self.model, text);
		Ok(text)
	}

	fn unparsable(&self, operation:Operation, reply:String) -> ScopeError {
		ScopeError::UnparsableReply { model: self.model, operation, reply }
	}

	pub(crate) fn query_number(&mut self, operation:Operation, channel:Option<u8>) -> Result<f64> {
		let reply = self.query(operation, channel)?;
		match reply.parse::<f64>() {
			Ok(v) if v.is_finite() => Ok(v),
			_ => Err(self.unparsable(operation, reply)),
		}
	}

	pub(crate) fn query_integer(&mut self, operation:Operation, channel:Option<u8>) -> Result<u64> {
		let reply = self.query(operation, channel)?;
		if let Ok(n) = reply.trim_start_matches('+').parse::<u64>() {
			return Ok(n);
		}

		// Some firmware answers counts in NR3 form ("2.0E+3")
		match reply.parse::<f64>() {
			Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(v as u64),
			_ => Err(self.unparsable(operation, reply)),
		}
	}

	pub(crate) fn query_choice<V:TryFrom<Choice>>(&mut self, operation:Operation, channel:Option<u8>) -> Result<V> {
		let reply = self.query(operation, channel)?;
		let choice = dictionary().decode_reply(self.model, operation, &reply)?;
		V::try_from(choice).map_err(|_| ScopeError::UnknownReply { model: self.model, operation, reply })
	}

	pub(crate) fn send_number(&mut self, operation:Operation, channel:Option<u8>, value:f64) -> Result<()> {
		self.write(operation, channel, Some(&format!("{:E}", value)))
	}

	pub(crate) fn send_integer(&mut self, operation:Operation, channel:Option<u8>, value:u64) -> Result<()> {
		self.write(operation, channel, Some(&value.to_string()))
	}

	pub(crate) fn send_choice(&mut self, operation:Operation, channel:Option<u8>, value:Choice) -> Result<()> {
		let token = dictionary().encode_value(self.model, operation, value)?;
		self.write(operation, channel, Some(token))
	}

	// Identification and status

	pub fn identity(&mut self) -> Result<Identity> {
		let reply = self.query(Operation::Identify, None)?;
		Identity::parse(&reply).ok_or_else(|| self.unparsable(Operation::Identify, reply))
	}

	/// Read the instrument's error status and turn a reported error into `ScopeError::Instrument`.
	pub fn check_errors(&mut self) -> Result<()> {
		let reply = self.query(Operation::ErrorQuery, None)?;
		match self.model.dialect().parse_error_reply(&reply) {
			Some(msg) => Err(ScopeError::Instrument(msg)),
			None => Ok(()),
		}
	}

	pub fn clear_status(&mut self) -> Result<()> { self.write(Operation::ClearStatus, None, None) }

	// Acquisition control
	pub fn run(&mut self)           -> Result<()> { self.write(Operation::Run, None, None) }
	pub fn stop(&mut self)          -> Result<()> { self.write(Operation::Stop, None, None) }
	pub fn single(&mut self)        -> Result<()> { self.write(Operation::Single, None, None) }

	/// Leave single-sequence mode and acquire continuously. Models whose run command already
	/// does that have no separate command for it.
	pub fn continuous(&mut self) -> Result<()> {
		if self.supports(Operation::Continuous) {
			self.write(Operation::Continuous, None, None)
		} else {
			self.run()
		}
	}

	pub fn autoset(&mut self)       -> Result<()> { self.write(Operation::Autoset, None, None) }
	pub fn force_trigger(&mut self) -> Result<()> { self.write(Operation::ForceTrigger, None, None) }

	/// Factory reset, then 1:1 probes on every channel.
	pub fn reset(&mut self) -> Result<()> {
		self.write(Operation::Reset, None, None)?;
		self.timebase = None;

		for index in 0..self.model.channel_count() {
			self.channel(index)?.set_probe_attenuation(1.0)?;
		}
		Ok(())
	}

	// Timebase

	pub fn horizontal_scale(&mut self) -> Result<f64> {
		self.query_number(Operation::HorizontalScaleGet, None)
	}

	/// Set seconds per division and return the timebase the instrument actually settled on.
	pub fn set_horizontal_scale(&mut self, seconds_per_division:f64) -> Result<Timebase> {
		let (lo, hi) = self.model.horizontal_scale_range();
		if !seconds_per_division.is_finite() || seconds_per_division < lo || seconds_per_division > hi {
			let reason = format!("{} accepts {:E} to {:E} s/div", self.model, lo, hi);
			return Err(ScopeError::invalid_value(Operation::HorizontalScaleSet, seconds_per_division, &reason));
		}

		self.send_number(Operation::HorizontalScaleSet, None, seconds_per_division)?;

		let timebase = self.timebase()?;
		self.timebase = Some(timebase);
		Ok(timebase)
	}

	/// Horizontal scale, sample rate and record length, all read from the instrument.
	pub fn timebase(&mut self) -> Result<Timebase> {
		let horizontal_scale = self.horizontal_scale()?;
		let record_length = self.record_length()?;
		let sample_rate = match self.supports(Operation::SampleRateGet) {
			true  => self.query_number(Operation::SampleRateGet, None)?,
			false => self.derived_sample_rate(horizontal_scale, record_length)?,
		};

		Ok(Timebase { horizontal_scale, sample_rate, record_length })
	}

	fn derived_sample_rate(&self, horizontal_scale:f64, record_length:u64) -> Result<f64> {
		if horizontal_scale <= 0.0 {
			return Err(self.unparsable(Operation::HorizontalScaleGet, horizontal_scale.to_string()));
		}
		Ok(record_length as f64 / (horizontal_scale * self.model.horizontal_divisions()))
	}

	pub fn sample_rate(&mut self) -> Result<f64> {
		if self.supports(Operation::SampleRateGet) {
			return self.query_number(Operation::SampleRateGet, None);
		}

		let horizontal_scale = self.horizontal_scale()?;
		let record_length = self.record_length()?;
		self.derived_sample_rate(horizontal_scale, record_length)
	}

	/// Reach a sample rate by changing the horizontal scale at the current record length.
	pub fn set_sample_rate(&mut self, samples_per_second:f64) -> Result<Timebase> {
		if !samples_per_second.is_finite() || samples_per_second <= 0.0 {
			return Err(ScopeError::invalid_value(Operation::HorizontalScaleSet, samples_per_second, "sample rate must be positive"));
		}

		let record_length = self.record_length()?;
		let scale = record_length as f64 / (samples_per_second * self.model.horizontal_divisions());
		self.set_horizontal_scale(scale)
	}

	pub fn max_sample_rate(&mut self) -> Result<f64> {
		self.query_number(Operation::MaxSampleRateGet, None)
	}

	pub fn record_length(&mut self) -> Result<u64> {
		self.query_integer(Operation::RecordLengthGet, None)
	}

	/// Change the record length. The transfer window follows it on models that have one.
	pub fn set_record_length(&mut self, samples:u64) -> Result<()> {
		dictionary().resolve(self.model, Operation::RecordLengthSet)?;

		let max = self.model.max_record_length();
		if samples == 0 || samples > max {
			let reason = format!("{} records 1 to {} samples", self.model, max);
			return Err(ScopeError::invalid_value(Operation::RecordLengthSet, samples, &reason));
		}

		self.send_integer(Operation::RecordLengthSet, None, samples)?;
		if self.supports(Operation::DataStopSet) {
			self.send_integer(Operation::DataStopSet, None, samples)?;
		}

		self.timebase = None;
		Ok(())
	}

	pub fn horizontal_delay(&mut self) -> Result<f64> {
		self.query_number(Operation::HorizontalDelayGet, None)
	}

	pub fn set_horizontal_delay(&mut self, seconds:f64) -> Result<()> {
		if !seconds.is_finite() {
			return Err(ScopeError::invalid_value(Operation::HorizontalDelaySet, seconds, "delay must be finite"));
		}
		self.send_number(Operation::HorizontalDelaySet, None, seconds)
	}

	// Record duration, record_length / sample_rate
	fn window(&mut self) -> Result<f64> {
		let timebase = self.timebase()?;
		if timebase.sample_rate <= 0.0 {
			return Err(self.unparsable(Operation::SampleRateGet, timebase.sample_rate.to_string()));
		}
		Ok(timebase.record_length as f64 / timebase.sample_rate)
	}

	/// Fraction of the record captured before the trigger.
	pub fn presample_ratio(&mut self) -> Result<f64> {
		let window = self.window()?;
		let delay = self.horizontal_delay()?;
		Ok(0.5 - delay / window)
	}

	pub fn set_presample_ratio(&mut self, ratio:f64) -> Result<()> {
		dictionary().resolve(self.model, Operation::HorizontalDelaySet)?;
		if !ratio.is_finite() || ratio < 0.0 || ratio > 1.0 {
			return Err(ScopeError::invalid_value(Operation::HorizontalDelaySet, ratio, "presample ratio must be within 0 and 1"));
		}

		let window = self.window()?;
		self.send_number(Operation::HorizontalDelaySet, None, (0.5 - ratio) * window)
	}

	/// Seconds of the record captured before the trigger.
	pub fn presample_time(&mut self) -> Result<f64> {
		let window = self.window()?;
		let delay = self.horizontal_delay()?;
		Ok((0.5 - delay / window) * window)
	}

	pub fn set_presample_time(&mut self, seconds:f64) -> Result<()> {
		dictionary().resolve(self.model, Operation::HorizontalDelaySet)?;
		if !seconds.is_finite() || seconds < 0.0 {
			return Err(ScopeError::invalid_value(Operation::HorizontalDelaySet, seconds, "presample time must not be negative"));
		}

		let window = self.window()?;
		if seconds > window {
			let reason = format!("presample time exceeds the {:E} s record", window);
			return Err(ScopeError::invalid_value(Operation::HorizontalDelaySet, seconds, &reason));
		}

		self.send_number(Operation::HorizontalDelaySet, None, (0.5 - seconds / window) * window)
	}

	// Acquisition and trigger settings

	pub fn acquisition_mode(&mut self) -> Result<AcquisitionMode> {
		self.query_choice(Operation::AcquisitionModeGet, None)
	}

	pub fn set_acquisition_mode(&mut self, mode:AcquisitionMode) -> Result<()> {
		self.send_choice(Operation::AcquisitionModeSet, None, mode.into())
	}

	pub fn trigger_mode(&mut self) -> Result<TriggerMode> {
		self.query_choice(Operation::TriggerModeGet, None)
	}

	pub fn set_trigger_mode(&mut self, mode:TriggerMode) -> Result<()> {
		self.send_choice(Operation::TriggerModeSet, None, mode.into())
	}

	pub fn trigger_slope(&mut self) -> Result<TriggerSlope> {
		self.query_choice(Operation::TriggerSlopeGet, None)
	}

	pub fn set_trigger_slope(&mut self, slope:TriggerSlope) -> Result<()> {
		self.send_choice(Operation::TriggerSlopeSet, None, slope.into())
	}

	pub fn trigger_source(&mut self) -> Result<TriggerSource> {
		self.query_choice(Operation::TriggerSourceGet, None)
	}

	pub fn set_trigger_source(&mut self, source:TriggerSource) -> Result<()> {
		self.send_choice(Operation::TriggerSourceSet, None, source.into())
	}

	// Waveform record selection

	pub fn waveform_points_mode(&mut self) -> Result<PointsMode> {
		self.query_choice(Operation::WaveformPointsModeGet, None)
	}

	pub fn set_waveform_points_mode(&mut self, mode:PointsMode) -> Result<()> {
		self.send_choice(Operation::WaveformPointsModeSet, None, mode.into())
	}

	/// Points the next transfer will return in the selected record mode.
	pub fn waveform_points(&mut self) -> Result<u64> {
		self.query_integer(Operation::WaveformPointsGet, None)
	}

	/// Largest point count the selected record mode can transfer.
	pub fn max_waveform_points(&mut self) -> Result<u64> {
		let mode = self.waveform_points_mode()?;
		self.points_limit(mode)
	}

	fn points_limit(&mut self, mode:PointsMode) -> Result<u64> {
		match mode {
			PointsMode::Normal => Ok(MEASUREMENT_RECORD_POINTS),
			_ => self.record_length(),
		}
	}

	/// Choose how many points to transfer. Counts above what the record mode holds are clamped,
	/// and acquisition stops first when the full acquisition record is selected.
	pub fn set_waveform_points(&mut self, points:u64) -> Result<()> {
		dictionary().resolve(self.model, Operation::WaveformPointsSet)?;
		if points == 0 {
			return Err(ScopeError::invalid_value(Operation::WaveformPointsSet, points, "at least one point is required"));
		}

		let mode = self.waveform_points_mode()?;
		if mode != PointsMode::Normal {
			self.stop()?;
		}

		let max = self.points_limit(mode)?;
		let points = if points > max {
			warn!("{}: {} points requested, {:?} mode holds {}", self.model, points, mode, max);
			max
		} else {
			points
		};

		self.send_integer(Operation::WaveformPointsSet, None, points)
	}

	/// Ask for samples in the given encoding. Decoding always follows the preamble.
	pub fn set_transfer_format(&mut self, format:TransferFormat) -> Result<()> {
		if self.supports(Operation::EncodingSet) {
			self.send_choice(Operation::EncodingSet, None, Encoding::Binary.into())?;
		}
		self.send_choice(Operation::SampleWidthSet, None, format.width.into())?;
		self.send_choice(Operation::BinaryFormatSet, None, format.format.into())?;
		self.send_choice(Operation::ByteOrderSet, None, format.byte_order.into())
	}

	// Channels and waveforms

	pub(crate) fn channel_number(&self, index:usize) -> Result<u8> {
		let count = self.model.channel_count();
		if index >= count {
			return Err(ScopeError::InvalidChannel { model: self.model, index, count });
		}
		Ok(index as u8 + 1)
	}

	/// Channel by 0-based index; index 0 is CH1.
	pub fn channel(&mut self, index:usize) -> Result<Channel<'_, T>> {
		let number = self.channel_number(index)?;
		Ok(Channel::new(self, number))
	}

	pub fn get_signal(&mut self, index:usize) -> Result<Signal> {
		self.channel(index)?.get_signal()
	}

	// Select the source, read a fresh preamble, then read and scale the data block
	pub(crate) fn acquire(&mut self, number:u8) -> Result<Signal> {
		self.write(Operation::DataSourceSet, Some(number), None)?;

		let reply = self.query(Operation::PreambleGet, None)?;
		let preamble = self.model.dialect().parse_preamble(self.model, &reply)?;
		preamble.validate()?;

		let cmd = self.command(Operation::WaveformDataGet, None, None)?;
		debug!("{} <- {}", self.model, cmd);
		self.transport.write(&cmd)?;
		self.pause();

		let payload = block::read_block(&mut self.transport)?;
		debug!("{} CH{}: {} samples in {} bytes", self.model, number, preamble.points, payload.len());

		preamble.signal(&payload)
	}

	pub fn snapshot(&mut self) -> Result<State> {
		let timebase = self.timebase()?;
		let horizontal_delay = self.horizontal_delay()?;
		let acquisition_mode = self.acquisition_mode()?;
		let trigger_mode = self.trigger_mode()?;
		let trigger_slope = self.trigger_slope()?;
		let trigger_source = self.trigger_source()?;

		let mut channels:Vec<ChannelState> = vec![];
		for index in 0..self.model.channel_count() {
			channels.push(self.channel(index)?.state()?);
		}

		Ok(State { model: self.model, timebase, horizontal_delay, acquisition_mode, trigger_mode, trigger_slope, trigger_source, channels })
	}
}
