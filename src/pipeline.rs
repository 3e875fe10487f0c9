//! Pipeline supervision: builds the buffering stages, runs the processor
//! and writer on their own threads, and tears everything down
//! deterministically.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::info;

use crate::error::PipelineError;
use crate::process::run_processor;
use crate::queue::{MeasurementQueue, QueueSnapshot};
use crate::ring_buffer::{sample_ring, RingMetrics, RingProducer, RingSnapshot};
use crate::shutdown::StopToken;
use crate::write::{run_writer, FileHeader, WriterStats};

/// Static configuration for one capture run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub channels: usize,
    pub bytes_per_sample: u32,
    pub sample_rate: u64,
    pub ring_capacity: u64,
    pub queue_depth: usize,
    pub output: PathBuf,
}

/// Final accounting reported by [`Pipeline::join`].
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    pub ring: RingSnapshot,
    pub queue: QueueSnapshot,
    pub writer: WriterStats,
    pub records_processed: u64,
}

/// A running capture pipeline. The producer half of the ring goes to the
/// driver callback; everything else stays here until [`Pipeline::join`].
pub struct Pipeline {
    stop: StopToken,
    queue: Arc<MeasurementQueue>,
    ring_metrics: RingMetrics,
    processor: JoinHandle<u64>,
    writer: JoinHandle<Result<WriterStats, std::io::Error>>,
}

impl Pipeline {
    /// Build the stages and spawn the processor and writer threads.
    /// Returns the pipeline handle plus the ring producer for the driver.
    pub fn start(
        config: &PipelineConfig,
        stop: StopToken,
    ) -> Result<(Self, RingProducer), PipelineError> {
        let (producer, consumer, ring_metrics) = sample_ring(
            config.channels,
            config.bytes_per_sample,
            config.ring_capacity,
        )?;
        let queue = Arc::new(MeasurementQueue::with_depth(
            config.queue_depth,
            stop.clone(),
        )?);

        let file = File::create(&config.output).map_err(PipelineError::Create)?;
        let header = FileHeader {
            channels: config.channels as u32,
            bytes_per_sample: config.bytes_per_sample,
            sample_rate: config.sample_rate,
        };

        let processor = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("processor".into())
                .spawn(move || run_processor(consumer, &queue, &stop))
                .map_err(|source| PipelineError::Spawn {
                    stage: "processor",
                    source,
                })?
        };
        let writer = {
            let queue = queue.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("writer".into())
                .spawn(move || run_writer(BufWriter::new(file), header, &queue, &stop))
                .map_err(|source| PipelineError::Spawn {
                    stage: "writer",
                    source,
                })?
        };

        info!(output = %config.output.display(), "pipeline started");
        Ok((
            Self {
                stop,
                queue,
                ring_metrics,
                processor,
                writer,
            },
            producer,
        ))
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Deterministic teardown: raise the stop token, let the processor
    /// finish draining the ring, finalize the queue, then let the writer
    /// drain the backlog and close the file.
    pub fn join(self) -> Result<RunSummary, PipelineError> {
        self.stop.trigger();
        let records_processed = self
            .processor
            .join()
            .map_err(|_| PipelineError::Panicked { stage: "processor" })?;
        self.queue.close();
        let writer = self
            .writer
            .join()
            .map_err(|_| PipelineError::Panicked { stage: "writer" })?
            .map_err(PipelineError::Write)?;
        Ok(RunSummary {
            ring: self.ring_metrics.snapshot(),
            queue: self.queue.snapshot(),
            writer,
            records_processed,
        })
    }
}
