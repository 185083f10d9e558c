use anyhow::{Context, Result};
use clap::Parser;
use rolling_stats::Stats;
use std::fs;
use std::path::PathBuf;

use radar_distance::config::{DistanceConfig, PeakSorting, ThresholdType};
use radar_distance::output::{DistanceOutput, OutputFormat, create_formatter};
use radar_distance::service::{ReplayService, ServiceError};
use radar_distance::signal_processing::{decode_background, encode_background};
use radar_distance::{DetectorError, DistanceDetector, DistanceResult};

#[derive(Parser, Debug)]
#[command(name = "radar-distance")]
#[command(about = "Run the envelope distance detector over recorded sweeps", long_about = None)]
struct Args {
    /// Sweep file (JSON lines) to replay
    input: PathBuf,

    /// TOML detector configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Threshold method (overrides config)
    #[arg(short, long, value_enum)]
    threshold: Option<ThresholdType>,

    /// Peak ordering (overrides config)
    #[arg(short, long, value_enum)]
    sorting: Option<PeakSorting>,

    /// Record a background from the first sweeps before measuring
    #[arg(long)]
    record_background: bool,

    /// Write the recorded background to this file
    #[arg(long, requires = "record_background")]
    save_background: Option<PathBuf>,

    /// Use a background saved by an earlier run
    #[arg(long, conflicts_with = "record_background")]
    load_background: Option<PathBuf>,

    /// Output format: text, json, csv
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Maximum results reported per sweep
    #[arg(short = 'n', long, default_value_t = 10)]
    max_results: usize,

    /// Replay the file repeatedly, stopping after this many results
    #[arg(long)]
    repeat: Option<u64>,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
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

    let mut config = match &args.config {
        Some(path) => DistanceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DistanceConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold_type = threshold;
    }
    if let Some(sorting) = args.sorting {
        config.peak_sorting = sorting;
    }

    let service = ReplayService::open(&args.input)
        .with_context(|| format!("Failed to read sweeps from {}", args.input.display()))?
        .looping(args.repeat.is_some());

    let mut detector = DistanceDetector::new(&config, service);
    detector.activate().context("Failed to activate detector")?;

    let metadata = detector.metadata()?;
    eprintln!(
        "Range: {:.3}-{:.3} m, step {:.4} m, {} bins",
        metadata.start_m,
        metadata.start_m + metadata.length_m,
        metadata.step_length_m,
        metadata.background_length
    );

    if args.record_background {
        let mut background = vec![0u16; metadata.background_length];
        let info = detector
            .record_background(&mut background)
            .context("Failed to record background")?;
        eprintln!(
            "Background: {} sweeps, max amplitude {}",
            info.sweeps_used, info.max_amplitude
        );
        if let Some(path) = &args.save_background {
            fs::write(path, encode_background(&background))
                .with_context(|| format!("Failed to write background {}", path.display()))?;
        }
    } else if let Some(path) = &args.load_background {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read background {}", path.display()))?;
        detector.set_background(&decode_background(&bytes)?)?;
    }

    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let mut results = vec![DistanceResult::default(); args.max_results];
    let mut nearest_stats: Stats<f32> = Stats::new();
    let mut count_stats: Stats<f32> = Stats::new();

    loop {
        if args.repeat.is_some_and(|limit| count_stats.count as u64 >= limit) {
            break;
        }
        let info = match detector.get_next(&mut results) {
            Ok(info) => info,
            Err(DetectorError::ServiceUnavailable(ServiceError::Disconnected)) => break,
            Err(e) => return Err(e).context("Measurement failed"),
        };

        let reported = &results[..info.result_count];
        println!(
            "{}",
            formatter.format(&DistanceOutput {
                results: reported,
                info: &info,
            })
        );

        count_stats.update(info.peaks_found as f32);
        if let Some(nearest) = reported
            .iter()
            .map(|r| r.distance_m)
            .min_by(|a, b| a.total_cmp(b))
        {
            nearest_stats.update(nearest);
        }
    }

    detector.destroy()?;

    eprintln!();
    eprintln!(
        "{} sweeps, {:.2} peaks per sweep (max {})",
        count_stats.count, count_stats.mean, count_stats.max
    );
    if nearest_stats.count > 0 {
        eprintln!(
            "Nearest peak: {:.4} m mean, {:.4} m std, {:.4}-{:.4} m",
            nearest_stats.mean, nearest_stats.std_dev, nearest_stats.min, nearest_stats.max
        );
    }

    Ok(())
}
