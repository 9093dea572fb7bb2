//! # Telemetry Carrier Demo
//!
//! Several receiver threads push decoded trace segments into one carrier;
//! a small consumer pool aggregates them per service.
//!
//! ## Phases
//!
//! 1. Producers write under `Blocking` while a two-worker pool drains
//! 2. The pool is replaced mid-stream by a three-worker pool
//! 3. The strategy is switched to `IfPossible` and producers start seeing
//!    capacity rejections
//! 4. Consumers are shut down; later writes degrade immediately
//!
//! ## Running
//!
//! ```bash
//! # Quick mode (2 producers, 500 segments each)
//! cargo run -p datacarrier --features demo --bin demo --release -- --quick
//!
//! # Full mode, with worker lifecycle logs
//! RUST_LOG=datacarrier=debug cargo run -p datacarrier --features demo --bin demo --release
//! ```

use datacarrier::{
    BufferStrategy, CarrierConfig, ConsumeError, Consumer, ConsumerSource, DataCarrier,
    KeyPartitioner, PoolRegistry,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const SERVICES: [&str; 4] = ["gateway", "orders", "payments", "inventory"];

/// A decoded trace segment as a receiver would hand it over.
#[derive(Debug, Clone)]
struct Segment {
    service: &'static str,
    trace_id: u64,
    duration_us: u64,
    is_error: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct ServiceStats {
    segments: u64,
    errors: u64,
    total_us: u64,
}

/// Aggregates segments per service. One instance per worker; results are
/// merged into `totals` on exit.
struct Aggregator {
    local: BTreeMap<&'static str, ServiceStats>,
    totals: Arc<Mutex<BTreeMap<&'static str, ServiceStats>>>,
    batches: Arc<AtomicU64>,
}

impl Consumer<Segment> for Aggregator {
    fn consume(&mut self, batch: &[Segment]) -> Result<(), ConsumeError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        for segment in batch {
            let stats = self.local.entry(segment.service).or_default();
            stats.segments += 1;
            stats.total_us += segment.duration_us;
            if segment.is_error {
                stats.errors += 1;
            }
        }
        Ok(())
    }

    fn on_exit(&mut self) {
        let mut totals = self.totals.lock();
        for (service, stats) in std::mem::take(&mut self.local) {
            let merged = totals.entry(service).or_default();
            merged.segments += stats.segments;
            merged.errors += stats.errors;
            merged.total_us += stats.total_us;
        }
    }
}

/// Deterministic pseudo-random sequence, one per producer.
struct Lcg(u64);

impl Lcg {
    fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

fn aggregators(
    totals: &Arc<Mutex<BTreeMap<&'static str, ServiceStats>>>,
    batches: &Arc<AtomicU64>,
) -> ConsumerSource<Segment> {
    let totals = Arc::clone(totals);
    let batches = Arc::clone(batches);
    ConsumerSource::factory(move || Aggregator {
        local: BTreeMap::new(),
        totals: Arc::clone(&totals),
        batches: Arc::clone(&batches),
    })
}

fn run_producers(
    carrier: &Arc<DataCarrier<Segment>>,
    producers: u64,
    per_producer: u64,
    accepted: &Arc<AtomicU64>,
    refused: &Arc<AtomicU64>,
) -> io::Result<()> {
    let handles = (0..producers)
        .map(|p| {
            let carrier = Arc::clone(carrier);
            let accepted = Arc::clone(accepted);
            let refused = Arc::clone(refused);
            thread::Builder::new()
                .name(format!("receiver-{p}"))
                .spawn(move || {
                    let mut rng = Lcg(p + 1);
                    for _ in 0..per_producer {
                        let segment = Segment {
                            service: SERVICES[(rng.next_u64() % SERVICES.len() as u64) as usize],
                            trace_id: rng.next_u64(),
                            duration_us: 50 + rng.next_u64() % 5_000,
                            is_error: rng.next_u64() % 10 == 0,
                        };
                        if carrier.produce(segment) {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        } else {
                            refused.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
        })
        .collect::<io::Result<Vec<_>>>()?;

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("receiver thread panicked");
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("datacarrier=info")),
        )
        .with_thread_names(true)
        .init();

    let quick = std::env::args().any(|arg| arg == "--quick");
    let (producers, per_producer) = if quick { (2, 500) } else { (8, 5_000) };

    println!("DataCarrier telemetry demo");
    println!("   Mode: {}", if quick { "quick" } else { "full" });
    println!("   Producers: {producers}");
    println!("   Segments per producer: {per_producer}");
    println!();

    let registry = Arc::new(PoolRegistry::new());
    let config = CarrierConfig::new(4, 256)
        .with_strategy(BufferStrategy::Blocking)
        .with_batch_size(64)
        .with_consume_cycle(Duration::from_millis(10))
        .with_metrics(true);
    let carrier = Arc::new(
        DataCarrier::with_config("segments", config)?.with_registry(Arc::clone(&registry)),
    );
    carrier.set_partitioner(KeyPartitioner::new(|s: &Segment| s.trace_id));

    let totals = Arc::new(Mutex::new(BTreeMap::new()));
    let batches = Arc::new(AtomicU64::new(0));
    let accepted = Arc::new(AtomicU64::new(0));
    let refused = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    // Phase 1
    println!("Phase 1: blocking writes, 2 workers");
    carrier.consume(aggregators(&totals, &batches), 2)?;
    run_producers(&carrier, producers, per_producer / 2, &accepted, &refused)?;

    // Phase 2
    println!("Phase 2: replacing the pool with 3 workers");
    carrier.consume(aggregators(&totals, &batches), 3)?;
    run_producers(&carrier, producers, per_producer / 2, &accepted, &refused)?;

    // Phase 3
    println!("Phase 3: IfPossible, refusing when a channel is full");
    carrier.set_buffer_strategy(BufferStrategy::IfPossible);
    run_producers(&carrier, producers, per_producer / 4, &accepted, &refused)?;

    // Phase 4
    println!("Phase 4: shutting consumers down");
    carrier.shutdown_consumers_and_wait();
    let late = Arc::new(AtomicU64::new(0));
    run_producers(&carrier, 1, 100, &Arc::new(AtomicU64::new(0)), &late)?;
    println!("   late writes refused: {}", late.load(Ordering::Relaxed));

    // Teardown for anything still registered. The retired phase-1 pool
    // finishes its final drain on its own threads.
    registry.close_all();
    thread::sleep(Duration::from_millis(50));

    let elapsed = started.elapsed();
    println!();
    println!("Per-service totals");
    for (service, stats) in totals.lock().iter() {
        let avg = stats.total_us.checked_div(stats.segments).unwrap_or(0);
        println!(
            "   {service:<10} segments={:<7} errors={:<6} avg={avg}us",
            stats.segments, stats.errors
        );
    }

    println!();
    println!("Carrier");
    println!("   accepted: {}", accepted.load(Ordering::Relaxed));
    println!("   refused:  {}", refused.load(Ordering::Relaxed));
    println!("   batches:  {}", batches.load(Ordering::Relaxed));
    if let Some(metrics) = carrier.metrics() {
        println!("   {metrics:?}");
        let rate = metrics.produced as f64 / elapsed.as_secs_f64();
        println!("   throughput: {rate:.0} segments/s over {elapsed:.2?}");
    }

    carrier.close();
    Ok(())
}
