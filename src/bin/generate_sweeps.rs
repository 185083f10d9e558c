use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use radar_distance::config::ServiceProfile;
use radar_distance::service::{
    BindRequest, RawSweep, SensorService, SweepFileHeader, write_sweep_file,
};
use radar_distance::simulation::{Reflector, SceneConfig, SimulatedService};

#[derive(Parser, Debug)]
#[command(name = "generate_sweeps")]
#[command(about = "Generate synthetic envelope sweeps for distance detector testing")]
struct Args {
    /// TOML scene description
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Output sweep file (JSON lines)
    #[arg(short, long, default_value = "data/synthetic/sweeps.jsonl")]
    output: PathBuf,

    /// Number of sweeps
    #[arg(short = 'n', long, default_value_t = 100)]
    count: usize,

    /// Start of the recorded range in meters
    #[arg(long, default_value_t = 0.0)]
    start: f32,

    /// Length of the recorded range in meters
    #[arg(long, default_value_t = 2.0)]
    length: f32,

    /// Sensor profile
    #[arg(short, long, value_enum, default_value = "profile2")]
    profile: ServiceProfile,

    /// Receiver gain (0-1)
    #[arg(short, long, default_value_t = 0.7)]
    gain: f32,

    /// Seed for reproducibility (overrides scene)
    #[arg(long)]
    seed: Option<u64>,

    /// Add a point reflector at this distance (repeatable)
    #[arg(long = "point")]
    points: Vec<f32>,

    /// Amplitude at 1 m for reflectors added on the command line
    #[arg(long, default_value_t = 1000.0)]
    amplitude: f32,

    /// Move every reflector this far per sweep (m)
    #[arg(long, default_value_t = 0.0)]
    drift: f32,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_scene(args: &Args) -> Result<SceneConfig> {
    let mut scene = match &args.scene {
        Some(path) => {
            let content = fs::read_to_string(path).context("Failed to read scene file")?;
            SceneConfig::from_toml_str(&content).context("Failed to parse scene file")?
        }
        None => SceneConfig::default(),
    };
    if args.seed.is_some() {
        scene.seed = args.seed;
    }
    for &distance_m in &args.points {
        scene.reflectors.push(Reflector::Point {
            distance_m,
            amplitude: args.amplitude,
        });
    }
    Ok(scene)
}

fn drift_reflectors(scene: &mut SceneConfig, step_m: f32) {
    for reflector in &mut scene.reflectors {
        match reflector {
            Reflector::Point { distance_m, .. } | Reflector::Flat { distance_m, .. } => {
                *distance_m += step_m;
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let scene = load_scene(&args)?;
    let mut service = SimulatedService::new(scene);

    let request = BindRequest {
        sensor: 1,
        profile: args.profile,
        start_m: args.start,
        length_m: args.length,
        receiver_gain: args.gain,
        hw_accelerated_average_samples: 10,
        maximize_signal_attenuation: false,
    };
    let binding = service.bind(&request).context("Scene rejected the range")?;
    let geometry = *binding.geometry();

    let mut sweeps = Vec::with_capacity(args.count);
    let mut saturated = 0;
    for _ in 0..args.count {
        let mut sweep = RawSweep::default();
        let info = service.pull_sweep(&binding, &mut sweep)?;
        if info.saturated {
            saturated += 1;
        }
        sweeps.push(sweep);
        drift_reflectors(service.scene_mut(), args.drift);
    }
    service.unbind(binding);

    if saturated > 0 {
        log::warn!("{} of {} sweeps saturated", saturated, args.count);
    }

    if let Some(dir) = args.output.parent() {
        fs::create_dir_all(dir).context("Failed to create output directory")?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let header = SweepFileHeader {
        start_m: geometry.start_m,
        step_length_m: geometry.step_length_m,
    };
    write_sweep_file(BufWriter::new(file), &header, &sweeps)?;

    println!(
        "Wrote {} sweeps of {} bins ({:.3}-{:.3} m) to {}",
        sweeps.len(),
        geometry.data_length,
        geometry.start_m,
        geometry.end_m(),
        args.output.display()
    );
    Ok(())
}
