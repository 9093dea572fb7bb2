use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use datacarrier::{
    Buffer, BufferStrategy, CarrierConfig, ConsumeError, Consumer, ConsumerSource, DataCarrier,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const MSG_PER_PRODUCER: u64 = 100_000;

/// Counts delivered items so the bench knows when everything arrived.
struct Counting(Arc<AtomicU64>);

impl Consumer<u64> for Counting {
    fn consume(&mut self, batch: &[u64]) -> Result<(), ConsumeError> {
        for item in batch {
            black_box(item);
        }
        self.0.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");
    group.throughput(Throughput::Elements(1024));

    group.bench_function("write_drain_1024", |b| {
        let buffer = Buffer::<u64>::new(1024);
        let mut out = Vec::with_capacity(1024);
        b.iter(|| {
            for i in 0..1024 {
                buffer.push(i, BufferStrategy::IfPossible);
            }
            out.clear();
            buffer.drain_into(&mut out, 1024);
            black_box(&out);
        });
    });

    group.bench_function("skip_to_latest_overwrite", |b| {
        let buffer = Buffer::<u64>::new(64);
        b.iter(|| {
            for i in 0..1024 {
                buffer.push(i, BufferStrategy::SkipToLatest);
            }
        });
    });

    group.finish();
}

fn bench_carrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("carrier");
    group.sample_size(10);

    for producers in [1u64, 2, 4, 8] {
        let total = MSG_PER_PRODUCER * producers;
        group.throughput(Throughput::Elements(total));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{producers}P_4C_2W")),
            &producers,
            |b, &n| {
                b.iter(|| {
                    let config = CarrierConfig::new(4, 4096).with_consume_cycle(Duration::from_millis(1));
                    let carrier = Arc::new(DataCarrier::with_config("bench", config).unwrap());
                    let delivered = Arc::new(AtomicU64::new(0));
                    let sink = Arc::clone(&delivered);
                    carrier
                        .consume(ConsumerSource::factory(move || Counting(Arc::clone(&sink))), 2)
                        .unwrap();

                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let carrier = Arc::clone(&carrier);
                            thread::spawn(move || {
                                for i in 0..MSG_PER_PRODUCER {
                                    carrier.produce(i);
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.join().unwrap();
                    }

                    while delivered.load(Ordering::Relaxed) < n * MSG_PER_PRODUCER {
                        thread::yield_now();
                    }
                    carrier.shutdown_consumers_and_wait();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_buffer, bench_carrier);
criterion_main!(benches);
