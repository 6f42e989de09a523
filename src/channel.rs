use serde::{Serialize, Deserialize};

use crate::commands::{Coupling, Operation, Switch};
use crate::error::{Result, ScopeError};
use crate::session::Session;
use crate::transport::Transport;
use crate::waveform::Signal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
	pub number: u8,
	pub displayed: bool,
	pub coupling: Coupling,
	pub vertical_scale: f64,
	pub vertical_offset: f64,
	pub probe_attenuation: f64,
	pub trigger_level: f64,
}

/// One analog input of a session. Borrowing the session keeps commands strictly one at a time.
pub struct Channel<'a, T:Transport> {
	session: &'a mut Session<T>,
	number: u8,
}

impl<'a, T:Transport> Channel<'a, T> {

	pub(crate) fn new(session:&'a mut Session<T>, number:u8) -> Self { Self { session, number } }

	pub fn index(&self) -> usize { self.number as usize - 1 }

	/// Number used on the wire and the front panel (CH1 is 1).
	pub fn number(&self) -> u8 { self.number }

	pub fn get_signal(&mut self) -> Result<Signal> { self.session.acquire(self.number) }

	pub fn coupling(&mut self) -> Result<Coupling> {
		self.session.query_choice(Operation::CouplingGet, Some(self.number))
	}

	pub fn set_coupling(&mut self, coupling:Coupling) -> Result<()> {
		self.session.send_choice(Operation::CouplingSet, Some(self.number), coupling.into())
	}

	pub fn vertical_scale(&mut self) -> Result<f64> {
		self.session.query_number(Operation::VerticalScaleGet, Some(self.number))
	}

	pub fn set_vertical_scale(&mut self, volts_per_division:f64) -> Result<()> {
		if !volts_per_division.is_finite() || volts_per_division <= 0.0 {
			return Err(ScopeError::invalid_value(Operation::VerticalScaleSet, volts_per_division, "scale must be positive"));
		}
		self.session.send_number(Operation::VerticalScaleSet, Some(self.number), volts_per_division)
	}

	pub fn vertical_offset(&mut self) -> Result<f64> {
		self.session.query_number(Operation::VerticalOffsetGet, Some(self.number))
	}

	pub fn set_vertical_offset(&mut self, volts:f64) -> Result<()> {
		if !volts.is_finite() {
			return Err(ScopeError::invalid_value(Operation::VerticalOffsetSet, volts, "offset must be finite"));
		}
		self.session.send_number(Operation::VerticalOffsetSet, Some(self.number), volts)
	}

	/// Probe attenuation (10 for a 10x probe). Tektronix stores its inverse as the probe gain.
	pub fn probe_attenuation(&mut self) -> Result<f64> {
		if self.session.supports(Operation::ProbeAttenuationGet) {
			return self.session.query_number(Operation::ProbeAttenuationGet, Some(self.number));
		}

		let gain = self.session.query_number(Operation::ProbeGainGet, Some(self.number))?;
		if gain <= 0.0 {
			return Err(ScopeError::UnparsableReply {
				model: self.session.model(),
				operation: Operation::ProbeGainGet,
				reply: gain.to_string(),
			});
		}
		Ok(1.0 / gain)
	}

	pub fn set_probe_attenuation(&mut self, attenuation:f64) -> Result<()> {
		if !attenuation.is_finite() || attenuation <= 0.0 {
			return Err(ScopeError::invalid_value(Operation::ProbeAttenuationSet, attenuation, "attenuation must be positive"));
		}

		if self.session.supports(Operation::ProbeAttenuationSet) {
			self.session.send_number(Operation::ProbeAttenuationSet, Some(self.number), attenuation)
		} else {
			self.session.send_number(Operation::ProbeGainSet, Some(self.number), 1.0 / attenuation)
		}
	}

	pub fn is_displayed(&mut self) -> Result<bool> {
		let switch:Switch = self.session.query_choice(Operation::ChannelDisplayGet, Some(self.number))?;
		Ok(switch.into())
	}

	pub fn set_displayed(&mut self, displayed:bool) -> Result<()> {
		self.session.send_choice(Operation::ChannelDisplaySet, Some(self.number), Switch::from(displayed).into())
	}

	pub fn trigger_level(&mut self) -> Result<f64> {
		self.session.query_number(Operation::TriggerLevelGet, Some(self.number))
	}

	pub fn set_trigger_level(&mut self, volts:f64) -> Result<()> {
		if !volts.is_finite() {
			return Err(ScopeError::invalid_value(Operation::TriggerLevelSet, volts, "level must be finite"));
		}
		self.session.send_number(Operation::TriggerLevelSet, Some(self.number), volts)
	}

	pub fn state(&mut self) -> Result<ChannelState> {
		Ok(ChannelState {
			number: self.number,
			displayed: self.is_displayed()?,
			coupling: self.coupling()?,
			vertical_scale: self.vertical_scale()?,
			vertical_offset: self.vertical_offset()?,
			probe_attenuation: self.probe_attenuation()?,
			trigger_level: self.trigger_level()?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SessionConfig;
	use crate::devices::Model;
	use crate::transport::loopback::Loopback;

	fn keysight() -> Session<Loopback> {
		let mut session = Session::open(Loopback::new(), Model::Dsox1102a, SessionConfig::default()).unwrap();
		session.transport_mut().clear_written();
		session
	}

	#[test]
	fn commands_carry_the_channel_number() {
		let mut session = keysight();
		let mut ch2 = session.channel(1).unwrap();
		ch2.set_trigger_level(0.5).unwrap();
		ch2.set_vertical_scale(0.2).unwrap();
		ch2.set_displayed(false).unwrap();

		assert_eq!(session.transport().written(), &[
			":TRIGger:EDGE:LEVel 5E-1,CHANnel2", ":CHANnel2:SCALe 2E-1", ":CHANnel2:DISPlay 0",
		]);
	}

	#[test]
	fn tektronix_probe_uses_gain() {
		let mut link = Loopback::new();
		link.reply_text("HORizontal:RECOrdlength?", "2000").reply_text("CH1:PRObe:GAIN?", "1.0E-1");
		let mut session = Session::open(link, Model::Tbs1072c, SessionConfig::default()).unwrap();

		let mut ch1 = session.channel(0).unwrap();
		assert_eq!(ch1.probe_attenuation().unwrap(), 10.0);
		ch1.set_probe_attenuation(1.0).unwrap();
		assert_eq!(session.transport().written().last().unwrap(), "CH1:PRObe:GAIN 1E0");
	}

	#[test]
	fn ground_coupling_is_tektronix_only() {
		let mut session = keysight();
		let result = session.channel(0).unwrap().set_coupling(Coupling::Ground);
		assert!(matches!(result, Err(ScopeError::UnsupportedValue { .. })));
		assert!(session.transport().written().is_empty());
	}

	#[test]
	fn channel_out_of_range() {
		let mut session = keysight();
		assert!(matches!(session.channel(2), Err(ScopeError::InvalidChannel { index: 2, count: 2, .. })));
	}
}
