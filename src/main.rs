use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use chansounder::args::{convert_filter, Args};
use chansounder::complex::{fill_ramp, SampleFormat};
use chansounder::pipeline::{Pipeline, PipelineConfig};
use chansounder::ring_buffer::RingProducer;
use chansounder::shutdown::StopToken;
use chrono::{Datelike, Timelike, Utc};
use clap::Parser;
use rand::prelude::*;
use tracing::info;

/// Stand-in for the radio driver callback: delivers variable-size bursts
/// of ramp samples, pacing itself against the nominal rate, until the
/// token is raised.
fn run_synthetic_producer(
    mut producer: RingProducer,
    format: SampleFormat,
    channels: usize,
    min_burst: u64,
    max_burst: u64,
    rate: u64,
    stop: &StopToken,
) {
    let mut rng = rand::thread_rng();
    let mut count = 0u64;
    let mut pending = 0u64;
    while !stop.is_triggered() {
        let started = Instant::now();
        let mut region = producer.acquire_write_region(pending);
        let burst = rng.gen_range(min_burst..=max_burst);
        let bytes = burst as usize * format.bytes_per_sample() as usize;
        let mut next = count;
        for ch in 0..channels {
            // every channel carries the same ramp, so continuity holds
            // per channel independently
            let (a, b) = region.channel_segments(ch);
            let split = bytes.min(a.len());
            next = fill_ramp(&mut a[..split], format, count);
            next = fill_ramp(&mut b[..bytes - split], format, next);
        }
        count = next;
        pending = burst;
        drop(region);
        // chase the nominal rate; a real front-end sets this pace itself
        let budget = Duration::from_secs_f64(burst as f64 / rate as f64);
        if let Some(left) = budget.checked_sub(started.elapsed()) {
            thread::sleep(left);
        }
    }
    // report the final burst so the consumer can see it
    producer.acquire_write_region(pending);
}

fn default_output_name() -> PathBuf {
    let now = Utc::now();
    PathBuf::from(format!(
        "sounding-{}-{:02}-{:02}-{:02}:{:02}:{:02}.dat",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    ))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    anyhow::ensure!(args.min_burst <= args.max_burst, "burst range is empty");
    anyhow::ensure!(
        args.max_burst <= args.capacity,
        "largest burst exceeds the ring capacity"
    );
    let format = SampleFormat::from_bytes_per_sample(args.bytes_per_sample)
        .context("unsupported sample width")?;

    let config = PipelineConfig {
        channels: args.channels as usize,
        bytes_per_sample: args.bytes_per_sample,
        sample_rate: args.rate,
        ring_capacity: args.capacity,
        queue_depth: args.queue_depth as usize,
        output: args.output.clone().unwrap_or_else(default_output_name),
    };

    let stop = StopToken::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            if stop.trigger() {
                info!("interrupt received, stopping");
            }
        })?;
    }

    let (pipeline, producer) = Pipeline::start(&config, stop.clone())?;

    let producer_thread = {
        let stop = stop.clone();
        let channels = config.channels;
        let (min_burst, max_burst, rate) = (args.min_burst, args.max_burst, args.rate);
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || {
                run_synthetic_producer(producer, format, channels, min_burst, max_burst, rate, &stop)
            })?
    };

    // run until the timer expires, unless Ctrl-C got there first
    let deadline = Instant::now() + Duration::from_secs(args.duration);
    while Instant::now() < deadline && !stop.is_triggered() {
        thread::sleep(Duration::from_millis(50));
    }
    stop.trigger();

    producer_thread
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
    let summary = pipeline.join()?;

    info!(
        overflow = summary.ring.overflow_count,
        underflow_waits = summary.ring.underflow_wait_count,
        high_water = summary.ring.high_water_mark,
        "ring buffer counters"
    );
    info!(
        depth = summary.queue.current_depth,
        high_water = summary.queue.high_water_mark,
        dropped = summary.queue.dropped_count,
        "measurement queue counters"
    );
    info!(
        records = summary.writer.records_written,
        gaps = summary.writer.gaps_marked,
        "capture complete"
    );
    Ok(())
}
