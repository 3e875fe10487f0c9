//! Multi-channel sample ring buffer between the driver callback and the
//! processing thread.
//!
//! Single producer, single consumer. The write cursor is owned by the
//! producer half and the read cursor by the consumer half; each side
//! publishes its cursor with release ordering and observes the other's
//! with acquire ordering, so neither side takes a lock. Cursors are
//! monotonically increasing sample counts; the backing offset of sample
//! `i` is `i % capacity`, identical across channels (all channels advance
//! in lockstep).
//!
//! The producer never waits. If a burst lands on unread samples, the
//! oldest data is overwritten, the loss is added to `overflow_count`, and
//! the consumer transparently skips the overwritten span on its next
//! read. Overwritten bytes can tear if the consumer is mid-copy; that
//! span is already accounted as lost, so torn contents are never
//! mistaken for valid data.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::complex::SampleFormat;
use crate::error::ConfigError;

type ChannelBuf = Box<[UnsafeCell<u8>]>;

fn zeroed_channel(len: usize) -> ChannelBuf {
    std::iter::repeat_with(|| UnsafeCell::new(0u8))
        .take(len)
        .collect()
}

struct RingState {
    channels: usize,
    bytes_per_sample: usize,
    capacity: u64,
    /// Next sample index the producer will write. Producer-owned.
    write_cursor: AtomicU64,
    /// Next sample index the consumer will read. Consumer-owned.
    read_cursor: AtomicU64,
    overflow: AtomicU64,
    underflow_waits: AtomicU64,
    high_water: AtomicU64,
    /// One flat scalar array per channel, `capacity * bytes_per_sample`
    /// bytes each. Allocated once at construction and only ever touched
    /// through the cursor protocol above.
    storage: Box<[ChannelBuf]>,
}

// SAFETY: storage bytes are only written through `WriteRegion` (producer
// side) and read through `ReadRegion` (consumer side). The cursor
// protocol keeps the two sides on disjoint spans except while the
// producer is overrunning, and an overrun span is counted as lost before
// the consumer could observe it as valid.
unsafe impl Sync for RingState {}

impl RingState {
    /// Byte view into one channel.
    ///
    /// # Safety
    /// `[start, start + len)` must lie inside the channel buffer and the
    /// caller must be the side that owns that span under the cursor
    /// protocol.
    unsafe fn channel_slice(&self, channel: usize, start: usize, len: usize) -> &[u8] {
        let base = self.storage[channel].as_ptr() as *const u8;
        std::slice::from_raw_parts(base.add(start), len)
    }

    /// Mutable byte view into one channel.
    ///
    /// # Safety
    /// Same span requirements as [`channel_slice`], producer side only.
    #[allow(clippy::mut_from_ref)]
    unsafe fn channel_slice_mut(&self, channel: usize, start: usize, len: usize) -> &mut [u8] {
        let base = self.storage[channel].as_ptr() as *const u8 as *mut u8;
        std::slice::from_raw_parts_mut(base.add(start), len)
    }
}

/// Build a ring, returning the producer half, the consumer half, and a
/// metrics handle that stays readable after both halves are gone.
pub fn sample_ring(
    channels: usize,
    bytes_per_sample: u32,
    capacity_samples: u64,
) -> Result<(RingProducer, RingConsumer, RingMetrics), ConfigError> {
    if channels == 0 {
        return Err(ConfigError::NoChannels);
    }
    if capacity_samples == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    let format = SampleFormat::from_bytes_per_sample(bytes_per_sample)
        .ok_or(ConfigError::UnsupportedWidth(bytes_per_sample))?;
    let channel_bytes = capacity_samples as usize * format.bytes_per_sample() as usize;
    let storage = (0..channels).map(|_| zeroed_channel(channel_bytes)).collect();
    let state = Arc::new(RingState {
        channels,
        bytes_per_sample: format.bytes_per_sample() as usize,
        capacity: capacity_samples,
        write_cursor: AtomicU64::new(0),
        read_cursor: AtomicU64::new(0),
        overflow: AtomicU64::new(0),
        underflow_waits: AtomicU64::new(0),
        high_water: AtomicU64::new(0),
        storage,
    });
    Ok((
        RingProducer {
            state: state.clone(),
            loss_floor: 0,
        },
        RingConsumer {
            state: state.clone(),
        },
        RingMetrics { state },
    ))
}

/// Producer half, owned by the driver callback thread.
pub struct RingProducer {
    state: Arc<RingState>,
    /// Highest sample index below which losses have been accounted.
    loss_floor: u64,
}

impl RingProducer {
    /// Report the previous burst (`n_consumed` samples per channel
    /// written into the last region) and obtain the region for the next
    /// one. The first call reports 0.
    ///
    /// Reporting after the fact keeps the write path free of per-sample
    /// bounds checks; overflow is therefore detected one burst late, but
    /// the counter still comes out exact because losses are measured
    /// against the read cursor.
    pub fn acquire_write_region(&mut self, n_consumed: u64) -> WriteRegion<'_> {
        let state = &*self.state;
        let write = state.write_cursor.load(Ordering::Relaxed) + n_consumed;
        state.write_cursor.store(write, Ordering::Release);
        let read = state.read_cursor.load(Ordering::Acquire);

        // Everything older than write - capacity has been overwritten.
        let floor = write.saturating_sub(state.capacity);
        if floor > self.loss_floor {
            let lost = floor.saturating_sub(self.loss_floor.max(read));
            if lost > 0 {
                state.overflow.fetch_add(lost, Ordering::Relaxed);
            }
            self.loss_floor = floor;
        }

        // May exceed capacity while the producer is overrunning.
        state.high_water.fetch_max(write - read, Ordering::Relaxed);

        let start = (write % state.capacity) as usize;
        WriteRegion {
            state,
            start,
            first: state.capacity as usize - start,
            second: start,
        }
    }
}

/// One wrap-split window of writable storage, valid until the next
/// `acquire_write_region` call. The window spans a full capacity's worth
/// of samples beginning at the write cursor; a burst longer than the
/// first segment continues in the second.
pub struct WriteRegion<'a> {
    state: &'a RingState,
    start: usize,
    first: usize,
    second: usize,
}

impl WriteRegion<'_> {
    /// True when a maximal burst would straddle the wrap point.
    pub fn wraps(&self) -> bool {
        self.second > 0
    }

    /// Samples in the first contiguous segment.
    pub fn first_len(&self) -> usize {
        self.first
    }

    /// Mutable byte views of both segments for one channel.
    pub fn channel_segments(&mut self, channel: usize) -> (&mut [u8], &mut [u8]) {
        let bps = self.state.bytes_per_sample;
        // SAFETY: the span starts at the write cursor this region was
        // acquired with; the consumer only reads below that cursor.
        unsafe {
            (
                self.state
                    .channel_slice_mut(channel, self.start * bps, self.first * bps),
                self.state.channel_slice_mut(channel, 0, self.second * bps),
            )
        }
    }

    /// Copy `bytes` into one channel starting at the region head,
    /// splitting across the wrap point as needed.
    pub fn write_channel(&mut self, channel: usize, bytes: &[u8]) {
        let bps = self.state.bytes_per_sample;
        assert_eq!(bytes.len() % bps, 0, "partial sample write");
        assert!(
            bytes.len() <= (self.first + self.second) * bps,
            "burst exceeds ring capacity"
        );
        let split = bytes.len().min(self.first * bps);
        let (head, tail) = bytes.split_at(split);
        let (a, b) = self.channel_segments(channel);
        a[..head.len()].copy_from_slice(head);
        b[..tail.len()].copy_from_slice(tail);
    }
}

/// Consumer half, owned by the processing thread.
pub struct RingConsumer {
    state: Arc<RingState>,
}

impl RingConsumer {
    pub fn channels(&self) -> usize {
        self.state.channels
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.state.bytes_per_sample
    }

    /// The span of unread samples. Does not advance the read cursor; call
    /// [`advance_read`](Self::advance_read) once the span is consumed.
    /// An empty span is a normal underflow wait and is counted for
    /// diagnostics.
    pub fn acquire_read_region(&mut self) -> ReadRegion<'_> {
        let write = self.state.write_cursor.load(Ordering::Acquire);
        let mut read = self.state.read_cursor.load(Ordering::Relaxed);

        // Skip whatever the producer has already overwritten; the loss is
        // accounted on the producer side.
        if write - read > self.state.capacity {
            read = write - self.state.capacity;
            self.state.read_cursor.store(read, Ordering::Release);
        }

        let len = write - read;
        if len == 0 {
            self.state.underflow_waits.fetch_add(1, Ordering::Relaxed);
        }
        let start = (read % self.state.capacity) as usize;
        let first = len.min(self.state.capacity - start as u64) as usize;
        ReadRegion {
            state: &self.state,
            start,
            first,
            second: len as usize - first,
        }
    }

    /// Mark `n` samples (per channel) as consumed.
    pub fn advance_read(&mut self, n: u64) {
        let read = self.state.read_cursor.load(Ordering::Relaxed);
        debug_assert!(
            read + n <= self.state.write_cursor.load(Ordering::Acquire),
            "advanced past the write cursor"
        );
        self.state.read_cursor.store(read + n, Ordering::Release);
    }
}

/// A wrap-split span of unread samples, identical across channels.
pub struct ReadRegion<'a> {
    state: &'a RingState,
    start: usize,
    first: usize,
    second: usize,
}

impl ReadRegion<'_> {
    /// Unread samples per channel in this span.
    pub fn len(&self) -> u64 {
        (self.first + self.second) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.first == 0 && self.second == 0
    }

    pub fn wraps(&self) -> bool {
        self.second > 0
    }

    /// Byte views of both segments for one channel.
    pub fn channel_segments(&self, channel: usize) -> (&[u8], &[u8]) {
        let bps = self.state.bytes_per_sample;
        // SAFETY: the span lies below the write cursor observed with
        // acquire ordering; the producer only writes at or above it.
        unsafe {
            (
                self.state
                    .channel_slice(channel, self.start * bps, self.first * bps),
                self.state.channel_slice(channel, 0, self.second * bps),
            )
        }
    }

    /// Copy one channel's span into `dst`, which must hold
    /// `len * bytes_per_sample` bytes.
    pub fn copy_channel(&self, channel: usize, dst: &mut [u8]) {
        let (a, b) = self.channel_segments(channel);
        dst[..a.len()].copy_from_slice(a);
        dst[a.len()..a.len() + b.len()].copy_from_slice(b);
    }
}

/// Read-only diagnostics handle; stays valid after the halves are dropped
/// so end-of-run snapshots survive shutdown.
#[derive(Clone)]
pub struct RingMetrics {
    state: Arc<RingState>,
}

/// Counters published by the ring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RingSnapshot {
    /// Samples overwritten before they were read.
    pub overflow_count: u64,
    /// Times the consumer polled an empty ring.
    pub underflow_wait_count: u64,
    /// Maximum unread fill observed, in samples. Exceeds the capacity
    /// when the producer has overrun.
    pub high_water_mark: u64,
}

impl RingMetrics {
    pub fn snapshot(&self) -> RingSnapshot {
        RingSnapshot {
            overflow_count: self.state.overflow.load(Ordering::Relaxed),
            underflow_wait_count: self.state.underflow_waits.load(Ordering::Relaxed),
            high_water_mark: self.state.high_water.load(Ordering::Relaxed),
        }
    }

    /// Samples currently buffered and unread.
    pub fn unread_samples(&self) -> u64 {
        let write = self.state.write_cursor.load(Ordering::Acquire);
        let read = self.state.read_cursor.load(Ordering::Acquire);
        write.saturating_sub(read)
    }
}
