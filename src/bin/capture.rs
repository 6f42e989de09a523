// Acquire one channel and write the scaled signal as JSON or CBOR.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use visascope::{Session, SessionConfig};

#[derive(Clone, Copy, ValueEnum)]
enum Format { Json, Cbor }

#[derive(Parser)]
#[command(name = "capture")]
#[command(about = "Read one calibrated waveform from a TBS or DSOX oscilloscope")]
struct Args {
	/// VISA resource, e.g. TCPIP::192.168.1.20::INSTR or TCPIP::192.168.1.20::5025::SOCKET
	resource: String,

	/// Channel index, 0 for CH1
	#[arg(short, long, default_value_t = 0)]
	channel: usize,

	/// Output file; standard output when omitted
	#[arg(short, long)]
	output: Option<PathBuf>,

	#[arg(short, long, value_enum, default_value = "json")]
	format: Format,

	/// JSON session configuration
	#[arg(long)]
	config: Option<PathBuf>,

	/// Print the instrument settings to stderr before capturing
	#[arg(long)]
	state: bool,

	#[arg(short, long, help = "Show debug information and detailed logs")]
	verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if args.verbose {
		env_logger::Builder::from_default_env()
			.filter_level(log::LevelFilter::Debug)
			.init();
	} else {
		env_logger::init();
	}

	let config = match &args.config {
		Some(path) => SessionConfig::from_json_file(path)?,
		None => SessionConfig::default(),
	};

	let mut scope = Session::connect(&args.resource, config)?;

	if args.state {
		eprintln!("{}", serde_json::to_string_pretty(&scope.snapshot()?)?);
	}

	let signal = scope.get_signal(args.channel)?;
	log::info!("Captured {} samples from {} CH{}", signal.len(), scope.model(), args.channel + 1);

	let bytes:Vec<u8> = match args.format {
		Format::Json => serde_json::to_vec(&signal)?,
		Format::Cbor => serde_cbor::to_vec(&signal)?,
	};

	match &args.output {
		Some(path) => fs::write(path, &bytes)?,
		None => io::stdout().write_all(&bytes)?,
	}

	Ok(())
}
