//! Concurrent capture pipeline for multi-channel channel-sounding runs.
//!
//! Data path: driver callback -> [`ring_buffer`] -> [`process`] ->
//! [`queue`] -> [`write`] -> capture file. Control path: a
//! [`shutdown::StopToken`] fans out to every stage.

use std::time::Duration;

pub mod args;
pub mod complex;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod ring_buffer;
pub mod shutdown;
pub mod write;

/// Upper bound on any blocking wait in the pipeline. Every stage re-checks
/// the stop token at least this often, which is what bounds shutdown
/// latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Consecutive empty polls the processor tolerates after the stop token is
/// raised before it considers the ring drained.
pub const DRAIN_POLLS: u32 = 8;
