//! Persistence stage: appends measurement records to the capture file in
//! arrival order.
//!
//! File layout: a fixed header (channel count u32, bytes-per-sample u32,
//! nominal sample rate u64, little-endian) followed by tagged entries.
//! Tag 0 introduces a data record: sequence u64, samples-per-channel u32,
//! then per channel the channel index u32 and the raw interleaved
//! payload. Tag 1 introduces a gap marker carrying the u64 count of
//! records dropped at that point in the stream. Sample payloads keep the
//! byte order the front-end delivered them in.

use std::io::Write;

use tracing::{error, info, warn};

use crate::queue::{MeasurementQueue, MeasurementRecord};
use crate::shutdown::StopToken;

/// Entry tag for a measurement record.
pub const TAG_RECORD: u32 = 0;
/// Entry tag for a dropped-span marker.
pub const TAG_GAP: u32 = 1;

/// Static stream parameters persisted at the head of the file.
#[derive(Clone, Copy, Debug)]
pub struct FileHeader {
    pub channels: u32,
    pub bytes_per_sample: u32,
    pub sample_rate: u64,
}

impl FileHeader {
    pub fn write_to<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
        sink.write_all(&self.channels.to_le_bytes())?;
        sink.write_all(&self.bytes_per_sample.to_le_bytes())?;
        sink.write_all(&self.sample_rate.to_le_bytes())
    }
}

fn write_record<W: Write>(sink: &mut W, record: &MeasurementRecord) -> std::io::Result<()> {
    sink.write_all(&TAG_RECORD.to_le_bytes())?;
    sink.write_all(&record.seq.to_le_bytes())?;
    sink.write_all(&record.n_samples.to_le_bytes())?;
    for (ch, payload) in record.channels.iter().enumerate() {
        sink.write_all(&(ch as u32).to_le_bytes())?;
        sink.write_all(payload)?;
    }
    Ok(())
}

fn write_gap<W: Write>(sink: &mut W, missing: u64) -> std::io::Result<()> {
    sink.write_all(&TAG_GAP.to_le_bytes())?;
    sink.write_all(&missing.to_le_bytes())
}

/// Totals reported once the writer finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub gaps_marked: u64,
}

/// Writer loop, intended for its own thread. Runs until the queue is
/// closed and drained. An I/O failure is fatal to this stage only: the
/// error is returned and the stop token raised so the rest of the
/// pipeline unwinds instead of piling up backlog.
pub fn run_writer<W: Write>(
    mut sink: W,
    header: FileHeader,
    queue: &MeasurementQueue,
    stop: &StopToken,
) -> Result<WriterStats, std::io::Error> {
    let result = write_loop(&mut sink, header, queue);
    if let Err(err) = &result {
        error!(%err, "writer failed, shutting the pipeline down");
        stop.trigger();
    }
    result
}

fn write_loop<W: Write>(
    sink: &mut W,
    header: FileHeader,
    queue: &MeasurementQueue,
) -> Result<WriterStats, std::io::Error> {
    header.write_to(sink)?;
    let mut stats = WriterStats::default();
    let mut next_seq = 0u64;
    while let Ok(record) = queue.pop() {
        if record.seq != next_seq {
            let missing = record.seq - next_seq;
            warn!(missing, "records dropped upstream, marking gap");
            write_gap(sink, missing)?;
            stats.gaps_marked += 1;
        }
        write_record(sink, &record)?;
        stats.records_written += 1;
        next_seq = record.seq + 1;
    }
    sink.flush()?;
    info!(
        records = stats.records_written,
        gaps = stats.gaps_marked,
        "capture file closed"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct Reader<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> Reader<'a> {
        fn new(buf: &'a [u8]) -> Self {
            Self { buf, pos: 0 }
        }

        fn bytes(&mut self, n: usize) -> &'a [u8] {
            let out = &self.buf[self.pos..self.pos + n];
            self.pos += n;
            out
        }

        fn u32(&mut self) -> u32 {
            u32::from_le_bytes(self.bytes(4).try_into().unwrap())
        }

        fn u64(&mut self) -> u64 {
            u64::from_le_bytes(self.bytes(8).try_into().unwrap())
        }

        fn at_end(&self) -> bool {
            self.pos == self.buf.len()
        }
    }

    fn header() -> FileHeader {
        FileHeader {
            channels: 2,
            bytes_per_sample: 4,
            sample_rate: 1_000,
        }
    }

    fn record(seq: u64) -> MeasurementRecord {
        MeasurementRecord {
            seq,
            n_samples: 2,
            channels: vec![vec![seq as u8; 8], vec![0xAA; 8]],
        }
    }

    #[test]
    fn drains_queued_records_before_closing() {
        let stop = StopToken::new();
        let queue = MeasurementQueue::with_depth(8, stop.clone()).unwrap();
        for seq in 0..3 {
            queue.push(record(seq)).unwrap();
        }
        queue.close();
        // stop already raised: the backlog still has to reach the file
        stop.trigger();

        let mut out = Vec::new();
        let stats = run_writer(&mut out, header(), &queue, &stop).unwrap();
        assert_eq!(stats.records_written, 3);
        assert_eq!(stats.gaps_marked, 0);

        let mut r = Reader::new(&out);
        assert_eq!(r.u32(), 2);
        assert_eq!(r.u32(), 4);
        assert_eq!(r.u64(), 1_000);
        for seq in 0..3u64 {
            assert_eq!(r.u32(), TAG_RECORD);
            assert_eq!(r.u64(), seq);
            assert_eq!(r.u32(), 2);
            assert_eq!(r.u32(), 0);
            assert_eq!(r.bytes(8), &[seq as u8; 8]);
            assert_eq!(r.u32(), 1);
            assert_eq!(r.bytes(8), &[0xAA; 8]);
        }
        assert!(r.at_end());
    }

    #[test]
    fn marks_sequence_gaps() {
        let stop = StopToken::new();
        let queue = MeasurementQueue::with_depth(8, stop.clone()).unwrap();
        queue.push(record(0)).unwrap();
        queue.push(record(3)).unwrap();
        queue.close();

        let mut out = Vec::new();
        let stats = run_writer(&mut out, header(), &queue, &stop).unwrap();
        assert_eq!(stats.records_written, 2);
        assert_eq!(stats.gaps_marked, 1);

        let mut r = Reader::new(&out);
        r.bytes(16); // header
        assert_eq!(r.u32(), TAG_RECORD);
        assert_eq!(r.u64(), 0);
        r.bytes(4 + 2 * (4 + 8));
        assert_eq!(r.u32(), TAG_GAP);
        assert_eq!(r.u64(), 2);
        assert_eq!(r.u32(), TAG_RECORD);
        assert_eq!(r.u64(), 3);
    }

    #[test]
    fn io_failure_raises_stop() {
        struct FailingSink;

        impl io::Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let stop = StopToken::new();
        let queue = MeasurementQueue::with_depth(4, stop.clone()).unwrap();
        assert!(run_writer(FailingSink, header(), &queue, &stop).is_err());
        assert!(stop.is_triggered());
    }

    #[test]
    fn appends_to_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.dat");

        let stop = StopToken::new();
        let queue = MeasurementQueue::with_depth(4, stop.clone()).unwrap();
        queue.push(record(0)).unwrap();
        queue.close();

        let file = std::fs::File::create(&path).unwrap();
        let stats = run_writer(io::BufWriter::new(file), header(), &queue, &stop).unwrap();
        assert_eq!(stats.records_written, 1);

        let bytes = std::fs::read(&path).unwrap();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.u32(), 2);
        assert_eq!(r.u32(), 4);
        assert_eq!(r.u64(), 1_000);
        assert_eq!(r.u32(), TAG_RECORD);
    }
}
