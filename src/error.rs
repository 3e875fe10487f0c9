//! Error types shared across the pipeline stages.
//!
//! Hot-path conditions (overflow, underflow waits, queue drops) are never
//! errors; they are counters on the component that observed them. The
//! types here cover the fatal cases: bad configuration at startup and I/O
//! or teardown failures at runtime.

use thiserror::Error;

/// Invalid initialization parameters. Construction fails before anything
/// is allocated, so nothing is left behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("channel count must be nonzero")]
    NoChannels,
    #[error("ring capacity must be nonzero")]
    ZeroCapacity,
    #[error("unsupported sample width: {0} bytes (expected 4 or 8)")]
    UnsupportedWidth(u32),
    #[error("queue depth must be nonzero")]
    ZeroQueueDepth,
}

/// The measurement queue has been finalized: pushes are rejected, and pops
/// report this once the backlog is drained.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("measurement queue closed")]
pub struct QueueClosed;

/// Pipeline construction and teardown failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not create output file: {0}")]
    Create(std::io::Error),
    #[error("could not spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        source: std::io::Error,
    },
    #[error("{stage} thread panicked")]
    Panicked { stage: &'static str },
    #[error("writer failed: {0}")]
    Write(std::io::Error),
}
