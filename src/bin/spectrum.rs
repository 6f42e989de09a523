// Acquire one channel and report the strongest frequency component.

use clap::Parser;
use rustfft::FFTplanner;
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;

use visascope::{Session, SessionConfig, Signal};

#[derive(Parser)]
#[command(name = "spectrum")]
#[command(about = "Find the dominant frequency on one oscilloscope channel")]
struct Args {
	/// VISA resource, e.g. TCPIP::192.168.1.20::INSTR
	resource: String,

	/// Channel index, 0 for CH1
	#[arg(short, long, default_value_t = 0)]
	channel: usize,

	/// Seconds per division to set before capturing
	#[arg(long)]
	scale: Option<f64>,

	/// Single-shot capture instead of free running
	#[arg(long)]
	single: bool,
}

/// Frequency (Hz) and magnitude of the largest non-DC bin.
fn dominant_frequency(signal:&Signal) -> Option<(f64, f64)> {
	let n = signal.len();
	let dt = signal.sample_interval()?;
	if n < 4 || dt <= 0.0 { return None; }

	// Remove the mean so the DC bin cannot leak into its neighbours
	let mean = signal.voltage.iter().sum::<f64>() / n as f64;
	let mut time_domain:Vec<Complex<f64>> = signal.voltage.iter().map(|v| Complex{ re: v - mean, im: 0.0 }).collect();
	let mut freq_domain:Vec<Complex<f64>> = vec![Complex::zero(); n];

	let mut planner = FFTplanner::new(false);
	let fft = planner.plan_fft(n);
	fft.process(&mut time_domain, &mut freq_domain);

	freq_domain[1..n/2].iter()
		.enumerate()
		.map(|(i, c)| ((i + 1) as f64 / (n as f64 * dt), c.norm()))
		.fold(None, |best:Option<(f64, f64)>, (f, m)| match best {
			Some((_, bm)) if bm >= m => best,
			_ => Some((f, m)),
		})
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let args = Args::parse();

	let mut scope = Session::connect(&args.resource, SessionConfig::default())?;

	if let Some(scale) = args.scale {
		let timebase = scope.set_horizontal_scale(scale)?;
		println!("Timebase: {:E} s/div, {:E} Sa/s, {} points", timebase.horizontal_scale, timebase.sample_rate, timebase.record_length);
	}

	if args.single {
		scope.single()?;
		scope.force_trigger()?;
	}

	let signal = scope.get_signal(args.channel)?;
	if args.single {
		scope.continuous()?;
	}
	match dominant_frequency(&signal) {
		Some((freq_hz, magnitude)) => println!("Dominant frequency: {:.6E} Hz (magnitude {:.3})", freq_hz, magnitude),
		None => println!("Not enough samples for a spectrum ({})", signal.len()),
	}

	Ok(())
}
