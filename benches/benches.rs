use chansounder::complex::{fill_ramp, SampleFormat};
use chansounder::queue::{MeasurementQueue, MeasurementRecord};
use chansounder::ring_buffer::sample_ring;
use chansounder::shutdown::StopToken;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;

const BURST: u64 = 4096;

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let mut payload = vec![0u8; BURST as usize * 4];
    rng.fill(&mut payload[..]);

    c.bench_function("ramp fill", |b| {
        let mut buf = vec![0u8; BURST as usize * 4];
        b.iter(|| fill_ramp(black_box(&mut buf), SampleFormat::Ci16, black_box(0)))
    });

    c.bench_function("ring burst round trip", |b| {
        let (mut producer, mut consumer, _metrics) = sample_ring(4, 4, 4 * BURST).unwrap();
        let mut out = vec![0u8; BURST as usize * 4];
        b.iter(|| {
            let mut region = producer.acquire_write_region(BURST);
            for ch in 0..4 {
                region.write_channel(ch, black_box(&payload));
            }
            drop(region);
            let region = consumer.acquire_read_region();
            let n = region.len();
            region.copy_channel(0, &mut out);
            drop(region);
            consumer.advance_read(black_box(n));
        })
    });

    c.bench_function("queue push pop", |b| {
        let queue = MeasurementQueue::with_depth(64, StopToken::new()).unwrap();
        let record = MeasurementRecord {
            seq: 0,
            n_samples: BURST as u32,
            channels: vec![payload.clone(); 4],
        };
        b.iter(|| {
            queue.push(black_box(record.clone())).unwrap();
            black_box(queue.pop().unwrap());
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
