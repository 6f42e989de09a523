mod common;

use common::{init_logging, SimulatedScope};

use visascope::commands::TriggerSource;
use visascope::{Model, Operation, ScopeError, Session, SessionConfig};

fn open(model:Model) -> Session<SimulatedScope> {
	init_logging();
	Session::identify(SimulatedScope::new(model), SessionConfig::default()).unwrap()
}

fn relative_eq(a:f64, b:f64) -> bool {
	(a - b).abs() <= 1e-9 * a.abs().max(b.abs())
}

fn assert_consistent(session:&mut Session<SimulatedScope>) {
	let divisions = session.model().horizontal_divisions();
	let record_length = session.record_length().unwrap() as f64;
	let sample_rate = session.sample_rate().unwrap();
	let horizontal_scale = session.horizontal_scale().unwrap();

	assert!(relative_eq(record_length, sample_rate * horizontal_scale * divisions),
		"{} != {} * {} * {}", record_length, sample_rate, horizontal_scale, divisions);
}

#[test]
fn scale_change_is_read_back() {
	for model in Model::ALL {
		let mut session = open(*model);

		// The instrument snaps 1.3 ms/div to 1 ms/div
		let timebase = session.set_horizontal_scale(1.3e-3).unwrap();
		assert!(relative_eq(timebase.horizontal_scale, 1.0e-3), "{}: {}", model, timebase.horizontal_scale);
		assert_eq!(session.cached_timebase(), Some(timebase));

		assert_consistent(&mut session);
	}
}

#[test]
fn sample_rate_setter_goes_through_the_scale() {
	let mut session = open(Model::Tbs2012b);

	let timebase = session.set_sample_rate(2000.0 / (2.0e-3 * 16.0)).unwrap();
	assert!(relative_eq(timebase.horizontal_scale, 2.0e-3));
	assert!(relative_eq(timebase.sample_rate, 62500.0));
	assert_consistent(&mut session);
}

#[test]
fn keysight_reads_the_sample_rate_directly() {
	let mut session = open(Model::Dsox1102a);
	session.sample_rate().unwrap();
	assert_eq!(session.transport().count_written(":ACQuire:SRATe?"), 1);
}

#[test]
fn record_length_change_clears_the_cache() {
	let mut session = open(Model::Tbs1072c);
	session.set_horizontal_scale(5.0e-3).unwrap();
	assert!(session.cached_timebase().is_some());

	session.set_record_length(20_000).unwrap();
	assert_eq!(session.cached_timebase(), None);
	assert_eq!(session.transport().count_written("DATa:STOP 20000"), 1);

	// Fresh reads see the new length
	assert_eq!(session.timebase().unwrap().record_length, 20_000);
	assert_consistent(&mut session);
}

#[test]
fn record_length_above_the_model_maximum() {
	let mut session = open(Model::Tbs1072c);
	let before = session.transport().written.len();

	match session.set_record_length(5_000_000) {
		Err(ScopeError::InvalidValue { operation, .. }) => assert_eq!(operation, Operation::RecordLengthSet),
		other => panic!("expected InvalidValue, got {:?}", other),
	}
	assert_eq!(session.transport().written.len(), before);
}

#[test]
fn presample_ratio_and_time_stay_consistent() {
	for model in Model::ALL {
		let mut session = open(*model);

		session.set_presample_ratio(0.2).unwrap();
		let ratio = session.presample_ratio().unwrap();
		let time = session.presample_time().unwrap();
		let timebase = session.timebase().unwrap();
		let window = timebase.record_length as f64 / timebase.sample_rate;

		assert!((ratio - 0.2).abs() < 1e-12, "{}: ratio {}", model, ratio);
		assert!(relative_eq(time, ratio * window), "{}: time {}", model, time);

		session.set_presample_time(0.75 * window).unwrap();
		assert!((session.presample_ratio().unwrap() - 0.75).abs() < 1e-12);
	}
}

#[test]
fn presample_time_beyond_the_record() {
	let mut session = open(Model::Dsox1102a);
	assert!(matches!(session.set_presample_time(1.0), Err(ScopeError::InvalidValue { .. })));
}

#[test]
fn snapshot_collects_every_setting() {
	init_logging();

	let mut scope = SimulatedScope::new(Model::Tbs1072c)
		.with_reply("ACQuire:MODe?", "SAMPLE")
		.with_reply("TRIGger:A:MODe?", "AUTO")
		.with_reply("TRIGger:A:EDGE:SLOpe?", "RISE")
		.with_reply("TRIGger:A:EDGE:SOUrce?", "CH2");
	for ch in 1..=2 {
		scope = scope
			.with_reply(&format!("SELect:CH{}?", ch), "1")
			.with_reply(&format!("CH{}:COUPling?", ch), "DC")
			.with_reply(&format!("CH{}:SCAle?", ch), "5.0E-1")
			.with_reply(&format!("CH{}:OFFSet?", ch), "0.0E+0")
			.with_reply(&format!("CH{}:PRObe:GAIN?", ch), "1.0E-1")
			.with_reply(&format!("TRIGger:A:LEVel:CH{}?", ch), "1.2E+0");
	}

	let mut session = Session::identify(scope, SessionConfig::default()).unwrap();
	let state = session.snapshot().unwrap();

	assert_eq!(state.model, Model::Tbs1072c);
	assert_eq!(state.channels.len(), 2);
	assert_eq!(state.channels[1].number, 2);
	assert_eq!(state.channels[1].probe_attenuation, 10.0);
	assert_eq!(state.channels[0].vertical_scale, 0.5);

	let json = serde_json::to_string(&state).unwrap();
	assert!(json.contains("\"trigger_slope\":\"Rising\""));
	assert_eq!(state.trigger_source, TriggerSource::Channel2);
}
