//! Processing stage: drains the sample ring at the pace bursts arrive and
//! turns each consumed span into one measurement record.

use tracing::info;

use crate::queue::{MeasurementQueue, MeasurementRecord};
use crate::ring_buffer::{ReadRegion, RingConsumer};
use crate::shutdown::StopToken;
use crate::{DRAIN_POLLS, POLL_INTERVAL};

/// Build the record for one consumed span: a copy-out of every channel
/// plus ordering metadata. The numeric channel measurement itself is a
/// downstream concern; the record carries the block untouched.
pub fn derive_record(
    region: &ReadRegion<'_>,
    channels: usize,
    bytes_per_sample: usize,
    seq: u64,
) -> MeasurementRecord {
    let n = region.len() as usize;
    let mut payloads = Vec::with_capacity(channels);
    for ch in 0..channels {
        let mut buf = vec![0u8; n * bytes_per_sample];
        region.copy_channel(ch, &mut buf);
        payloads.push(buf);
    }
    MeasurementRecord {
        seq,
        n_samples: n as u32,
        channels: payloads,
    }
}

/// Consumer loop, intended for its own thread. Runs until the stop token
/// is raised and the ring has drained; returns the record count.
pub fn run_processor(mut consumer: RingConsumer, queue: &MeasurementQueue, stop: &StopToken) -> u64 {
    let channels = consumer.channels();
    let bytes_per_sample = consumer.bytes_per_sample();
    let mut seq = 0u64;
    let mut empty_polls = 0u32;
    info!("processor running");
    loop {
        let region = consumer.acquire_read_region();
        if region.is_empty() {
            drop(region);
            if stop.is_triggered() {
                empty_polls += 1;
                if empty_polls >= DRAIN_POLLS {
                    break;
                }
            }
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        empty_polls = 0;
        let n = region.len();
        let record = derive_record(&region, channels, bytes_per_sample, seq);
        drop(region);
        consumer.advance_read(n);
        seq += 1;
        if queue.push(record).is_err() {
            // Finalized under us; nothing downstream wants more records.
            break;
        }
    }
    info!(records = seq, "processor drained");
    seq
}
