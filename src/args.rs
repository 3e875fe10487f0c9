//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Number of channels (antennas) captured in lockstep
    #[clap(long, default_value_t = 4)]
    #[clap(value_parser = clap::value_parser!(u32).range(1..))]
    pub channels: u32,
    /// Bytes per complex sample: 4 (int16 components) or 8 (float32)
    #[clap(long, default_value_t = 4, value_parser = valid_sample_width)]
    pub bytes_per_sample: u32,
    /// Ring buffer capacity in samples per channel
    #[clap(short, long, default_value_t = 10_000)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub capacity: u64,
    /// Measurement queue depth in records
    #[clap(short, long, default_value_t = 64)]
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub queue_depth: u64,
    /// Nominal sample rate in samples per second
    #[clap(short, long, default_value_t = 200_000_000)]
    pub rate: u64,
    /// Smallest synthetic burst, in samples per channel
    #[clap(long, default_value_t = 2_000)]
    pub min_burst: u64,
    /// Largest synthetic burst, in samples per channel
    #[clap(long, default_value_t = 10_000)]
    pub max_burst: u64,
    /// How long to capture for, in seconds
    #[clap(short, long, default_value_t = 10)]
    pub duration: u64,
    /// Output file; defaults to a timestamped name in the working directory
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn valid_sample_width(s: &str) -> Result<u32, String> {
    let width: u32 = s.parse().map_err(|_| "not a number".to_string())?;
    if crate::complex::SampleFormat::from_bytes_per_sample(width).is_some() {
        Ok(width)
    } else {
        Err(format!("unsupported sample width {width}, expected 4 or 8"))
    }
}
