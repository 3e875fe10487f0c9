//! Bounded FIFO of measurement records between the processor and the
//! writer.
//!
//! Backed by a crossbeam bounded channel; every wait is capped at
//! [`POLL_INTERVAL`](crate::POLL_INTERVAL) so a raised stop token is
//! observed promptly. While running, a full queue back-pressures the
//! processor. Once the stop token is raised, blocking further would
//! stretch shutdown past the poll bound, so the push path evicts the
//! oldest queued record instead; evictions are counted and leave a
//! sequence gap the writer turns into an explicit marker.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::error::{ConfigError, QueueClosed};
use crate::shutdown::StopToken;
use crate::POLL_INTERVAL;

/// One per-block measurement produced by the processor. Opaque to the
/// queue and the writer: the payload is persisted without
/// reinterpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementRecord {
    /// Production order, assigned by the processor. A gap in the
    /// persisted stream means records were dropped.
    pub seq: u64,
    /// Samples per channel in this block.
    pub n_samples: u32,
    /// One interleaved re/im byte payload per channel.
    pub channels: Vec<Vec<u8>>,
}

pub struct MeasurementQueue {
    tx: Sender<MeasurementRecord>,
    rx: Receiver<MeasurementRecord>,
    stop: StopToken,
    closed: AtomicBool,
    high_water: AtomicUsize,
    dropped: AtomicU64,
}

/// Counters published by the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current_depth: usize,
    pub high_water_mark: usize,
    pub dropped_count: u64,
}

impl MeasurementQueue {
    pub fn with_depth(depth: usize, stop: StopToken) -> Result<Self, ConfigError> {
        if depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        let (tx, rx) = bounded(depth);
        Ok(Self {
            tx,
            rx,
            stop,
            closed: AtomicBool::new(false),
            high_water: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Append a record, blocking while the queue is full. Each wait is
    /// bounded by the poll interval; once the stop token is raised the
    /// oldest queued record is evicted instead, so the processor can
    /// finish draining within the shutdown bound.
    pub fn push(&self, record: MeasurementRecord) -> Result<(), QueueClosed> {
        let mut record = record;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueClosed);
            }
            match self.tx.send_timeout(record, POLL_INTERVAL) {
                Ok(()) => {
                    self.high_water.fetch_max(self.rx.len(), Ordering::Relaxed);
                    return Ok(());
                }
                Err(SendTimeoutError::Timeout(r)) => {
                    record = r;
                    if self.stop.is_triggered() && self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(QueueClosed),
            }
        }
    }

    /// Remove the oldest record, blocking while the queue is empty. Each
    /// wait is bounded by the poll interval; fails once the queue has
    /// been closed and fully drained.
    pub fn pop(&self) -> Result<MeasurementRecord, QueueClosed> {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(record) => return Ok(record),
                Err(RecvTimeoutError::Timeout) => {
                    if self.closed.load(Ordering::Acquire) && self.rx.is_empty() {
                        return Err(QueueClosed);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(QueueClosed),
            }
        }
    }

    /// Finalize the queue once the processor has stopped producing.
    /// Later pushes fail; pops keep draining the backlog.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current_depth: self.rx.len(),
            high_water_mark: self.high_water.load(Ordering::Relaxed),
            dropped_count: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn record(seq: u64) -> MeasurementRecord {
        MeasurementRecord {
            seq,
            n_samples: 1,
            channels: vec![vec![0u8; 4]],
        }
    }

    #[test]
    fn rejects_zero_depth() {
        assert!(MeasurementQueue::with_depth(0, StopToken::new()).is_err());
    }

    #[test]
    fn pops_in_push_order() {
        let queue = MeasurementQueue::with_depth(16, StopToken::new()).unwrap();
        for seq in 0..10 {
            queue.push(record(seq)).unwrap();
        }
        for seq in 0..10 {
            assert_eq!(queue.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn full_queue_blocks_until_a_pop() {
        let queue = Arc::new(MeasurementQueue::with_depth(8, StopToken::new()).unwrap());
        for seq in 0..8 {
            queue.push(record(seq)).unwrap();
        }
        assert_eq!(queue.snapshot().current_depth, 8);

        let q = queue.clone();
        let pusher = std::thread::spawn(move || q.push(record(8)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!pusher.is_finished());

        assert_eq!(queue.pop().unwrap().seq, 0);
        pusher.join().unwrap().unwrap();
        let snap = queue.snapshot();
        assert_eq!(snap.current_depth, 8);
        assert_eq!(snap.dropped_count, 0);
    }

    #[test]
    fn raised_stop_evicts_the_oldest() {
        let stop = StopToken::new();
        let queue = MeasurementQueue::with_depth(4, stop.clone()).unwrap();
        for seq in 0..4 {
            queue.push(record(seq)).unwrap();
        }
        stop.trigger();
        queue.push(record(4)).unwrap();

        let snap = queue.snapshot();
        assert_eq!(snap.dropped_count, 1);
        assert_eq!(snap.current_depth, 4);
        // record 0 is gone, the rest stay in order
        for seq in 1..=4 {
            assert_eq!(queue.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn close_stops_pushes_and_drains_pops() {
        let queue = MeasurementQueue::with_depth(4, StopToken::new()).unwrap();
        queue.push(record(0)).unwrap();
        queue.push(record(1)).unwrap();
        queue.close();
        assert_eq!(queue.push(record(2)), Err(QueueClosed));
        assert_eq!(queue.pop().unwrap().seq, 0);
        assert_eq!(queue.pop().unwrap().seq, 1);
        assert_eq!(queue.pop(), Err(QueueClosed));
    }

    #[test]
    fn tracks_high_water() {
        let queue = MeasurementQueue::with_depth(8, StopToken::new()).unwrap();
        for seq in 0..5 {
            queue.push(record(seq)).unwrap();
        }
        for _ in 0..5 {
            queue.pop().unwrap();
        }
        queue.push(record(5)).unwrap();
        let snap = queue.snapshot();
        assert_eq!(snap.high_water_mark, 5);
        assert_eq!(snap.current_depth, 1);
    }
}
