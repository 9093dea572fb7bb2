//! Worker threads that drain channels into consumers on a timed cycle.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──begin()──▶ Running ──close()──▶ Closed
//!    └─────────────────close()────────────────▲
//! ```
//!
//! `Closed` is terminal. `close()` only flips the state and unparks the
//! workers; each worker notices at the top of its next cycle, performs one
//! final drain of its channels, calls `on_exit`, and ends.
//!
//! # Admission
//!
//! A carrier's producers enter the pool through [`PoolSignal::admit`] and
//! stay admitted until their write lands. Workers wait for the admitted count
//! to reach zero before their final drain, so an item accepted while the pool
//! was running is never left behind in a channel nobody reads.
//!
//! # Channel ownership
//!
//! Channel `i` belongs to worker `i % num`. No two workers of a pool ever
//! read the same channel, so per-channel FIFO holds all the way into the
//! consumer.

#[cfg(debug_assertions)]
use crate::invariants::debug_assert_assignment_complete;
use crate::channels::Channels;
use crate::consumer::{ConsumeError, Consumer, ConsumerSource, WorkerConsumer};
use crate::error::{CarrierError, ConfigError};
use crate::metrics::CarrierMetrics;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Consecutive non-empty cycles after which a worker yields its time slice.
const YIELD_EVERY: u32 = 16;

/// Lifecycle state of a [`ConsumerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Built but not started.
    Created,
    /// Workers are draining.
    Running,
    /// Close was signaled. Terminal.
    Closed,
}

impl PoolState {
    fn from_u8(tag: u8) -> Self {
        match tag {
            CREATED => Self::Created,
            RUNNING => Self::Running,
            _ => Self::Closed,
        }
    }
}

/// State shared between a pool, its workers and every [`PoolSignal`].
#[derive(Debug)]
struct PoolShared {
    name: String,
    state: AtomicU8,
    /// Producers that saw the pool running and have not finished writing.
    admitted: AtomicUsize,
    /// Worker threads, kept so `close()` can cut their sleep short.
    threads: Mutex<Vec<Thread>>,
}

impl PoolShared {
    #[inline]
    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Producers still between admission and the end of their write.
    #[inline]
    fn admitted(&self) -> usize {
        self.admitted.load(Ordering::SeqCst)
    }

    fn close(&self) {
        // SeqCst pairs with `admit`: a producer either sees CLOSED or its
        // admission is visible to workers after they observe CLOSED.
        let previous = self.state.swap(CLOSED, Ordering::SeqCst);
        if previous == CLOSED {
            return;
        }
        tracing::info!(carrier = %self.name, "closing consumer pool");
        for thread in self.threads.lock().iter() {
            thread.unpark();
        }
    }
}

/// A cloneable handle that can close a pool from anywhere.
///
/// Closing through any clone has the same effect as [`ConsumerPool::close`];
/// only the first call does anything.
#[derive(Debug, Clone)]
pub struct PoolSignal {
    shared: Arc<PoolShared>,
}

impl PoolSignal {
    /// Signals the pool's workers to finish.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns `true` while the pool is running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Returns the pool's lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    /// Name of the carrier the pool drains.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns `true` if both handles refer to the same pool.
    pub fn same_pool(&self, other: &PoolSignal) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Admits one producer write if the pool is running.
    ///
    /// Workers do not start their final drain while an [`Admission`] is
    /// alive, so the write made under it is delivered even if the pool is
    /// closed in the meantime. Keep it only for the duration of one write.
    pub fn admit(&self) -> Option<Admission<'_>> {
        self.shared.admitted.fetch_add(1, Ordering::SeqCst);
        if self.shared.state.load(Ordering::SeqCst) == RUNNING {
            Some(Admission {
                shared: &self.shared,
            })
        } else {
            self.shared.admitted.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }
}

/// A producer's pass into a running pool, released on drop.
#[derive(Debug)]
pub struct Admission<'a> {
    shared: &'a PoolShared,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.shared.admitted.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fixed set of worker threads draining a [`Channels`] into consumers.
pub struct ConsumerPool<T> {
    shared: Arc<PoolShared>,
    channels: Arc<Channels<T>>,
    source: ConsumerSource<T>,
    assignments: Vec<Vec<usize>>,
    consume_cycle: Duration,
    batch_limit: usize,
    metrics: Option<Arc<CarrierMetrics>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> ConsumerPool<T> {
    /// Builds a pool of `num` workers over `channels`. Nothing runs until
    /// [`begin`](Self::begin).
    pub fn new(
        name: impl Into<String>,
        channels: Arc<Channels<T>>,
        source: ConsumerSource<T>,
        num: usize,
        consume_cycle: Duration,
        batch_limit: usize,
    ) -> Result<Self, ConfigError> {
        if num == 0 {
            return Err(ConfigError::ZeroConsumers);
        }
        if batch_limit == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        let mut assignments = vec![Vec::new(); num];
        for channel in 0..channels.channel_size() {
            assignments[channel % num].push(channel);
        }

        #[cfg(debug_assertions)]
        debug_assert_assignment_complete!(assignments, channels.channel_size());

        Ok(Self {
            shared: Arc::new(PoolShared {
                name: name.into(),
                state: AtomicU8::new(CREATED),
                admitted: AtomicUsize::new(0),
                threads: Mutex::new(Vec::with_capacity(num)),
            }),
            channels,
            source,
            assignments,
            consume_cycle,
            batch_limit,
            metrics: None,
            handles: Vec::with_capacity(num),
        })
    }

    /// Records delivered batches and consumer errors into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<CarrierMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Starts every worker. Does nothing unless the pool is `Created`.
    ///
    /// If a thread fails to spawn, the pool is closed (workers that did start
    /// run their final drain) and the error is returned.
    pub fn begin(&mut self) -> Result<(), CarrierError> {
        if self
            .shared
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        for (index, assigned) in self.assignments.iter().enumerate() {
            let worker = Worker {
                index,
                shared: Arc::clone(&self.shared),
                channels: Arc::clone(&self.channels),
                assigned: assigned.clone(),
                consumer: self.source.instantiate(),
                consume_cycle: self.consume_cycle,
                batch_limit: self.batch_limit,
                metrics: self.metrics.clone(),
            };

            let spawned = thread::Builder::new()
                .name(format!("DataCarrier.{}.Consumer.{}.Thread", self.shared.name, index))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => {
                    self.shared.threads.lock().push(handle.thread().clone());
                    self.handles.push(handle);
                }
                Err(source) => {
                    tracing::error!(
                        carrier = %self.shared.name,
                        worker = index,
                        error = %source,
                        "failed to spawn consumer worker"
                    );
                    self.shared.close();
                    return Err(CarrierError::Spawn { index, source });
                }
            }
        }

        tracing::info!(
            carrier = %self.shared.name,
            workers = self.assignments.len(),
            channels = self.channels.channel_size(),
            cycle_ms = self.consume_cycle.as_millis() as u64,
            "consumer pool started"
        );
        Ok(())
    }
}

impl<T> ConsumerPool<T> {
    /// Signals every worker to finish. Idempotent and non-blocking.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns `true` between `begin()` and `close()`.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    /// Returns a cloneable handle that can close this pool.
    pub fn signal(&self) -> PoolSignal {
        PoolSignal {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.assignments.len()
    }

    /// Channels owned by worker `index`, in drain order.
    pub fn assignment(&self, index: usize) -> Option<&[usize]> {
        self.assignments.get(index).map(Vec::as_slice)
    }

    /// Closes the pool and waits until every worker has finished its final
    /// drain and `on_exit`.
    pub fn close_and_join(&mut self) {
        self.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!(carrier = %self.shared.name, "consumer worker terminated abnormally");
            }
        }
    }
}

impl<T> Drop for ConsumerPool<T> {
    /// Dropping a pool closes it without waiting; workers finish on their own.
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// One worker loop and everything it owns.
struct Worker<T> {
    index: usize,
    shared: Arc<PoolShared>,
    channels: Arc<Channels<T>>,
    assigned: Vec<usize>,
    consumer: WorkerConsumer<T>,
    consume_cycle: Duration,
    batch_limit: usize,
    metrics: Option<Arc<CarrierMetrics>>,
}

impl<T> Worker<T> {
    fn run(mut self) {
        tracing::debug!(
            carrier = %self.shared.name,
            worker = self.index,
            channels = ?self.assigned,
            "consumer worker started"
        );
        self.hook("on_start", |c| c.on_start());

        let mut batch = Vec::with_capacity(self.batch_limit.saturating_mul(self.assigned.len()).min(4096));
        let mut busy_rounds = 0u32;

        while self.shared.is_running() {
            let started = Instant::now();

            if self.drain_and_deliver(&mut batch, self.batch_limit) {
                // Keep draining while there is backlog, but let others run.
                busy_rounds = busy_rounds.wrapping_add(1);
                if busy_rounds % YIELD_EVERY == 0 {
                    thread::yield_now();
                }
                continue;
            }

            busy_rounds = 0;
            match self.consume_cycle.checked_sub(started.elapsed()) {
                Some(remaining) if !remaining.is_zero() => thread::park_timeout(remaining),
                _ => thread::yield_now(),
            }
        }

        // Producers admitted before close may still be writing. Keep draining
        // so one blocked on a full channel can finish.
        while self.shared.admitted() > 0 {
            if !self.drain_and_deliver(&mut batch, self.batch_limit) {
                thread::yield_now();
            }
        }

        // Final pass: everything buffered once no admitted write is pending.
        self.drain_and_deliver(&mut batch, usize::MAX);

        self.hook("on_exit", |c| c.on_exit());
        tracing::debug!(carrier = %self.shared.name, worker = self.index, "consumer worker exited");
    }

    /// Drains up to `limit` items from each assigned channel and hands the
    /// batch over. Returns `false` if there was nothing to deliver.
    fn drain_and_deliver(&mut self, batch: &mut Vec<T>, limit: usize) -> bool {
        batch.clear();
        for &channel in &self.assigned {
            if let Some(buffer) = self.channels.buffer(channel) {
                buffer.drain_into(batch, limit);
            }
        }
        if batch.is_empty() {
            return false;
        }
        self.deliver(batch);
        batch.clear();
        true
    }

    fn deliver(&mut self, batch: &[T]) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.consumer.with(|c| c.consume(batch))
        }))
        .unwrap_or_else(|payload| Err(ConsumeError::from_panic(payload)));

        if let Err(error) = outcome {
            if error.is_panic() {
                tracing::error!(
                    carrier = %self.shared.name,
                    worker = self.index,
                    batch_len = batch.len(),
                    %error,
                    "consumer panicked"
                );
            } else {
                tracing::warn!(
                    carrier = %self.shared.name,
                    worker = self.index,
                    batch_len = batch.len(),
                    %error,
                    "consumer failed"
                );
            }
            if let Some(metrics) = &self.metrics {
                metrics.add_consume_error();
            }
            self.hook("on_error", |c| c.on_error(batch, &error));
        } else if let Some(metrics) = &self.metrics {
            metrics.add_batch(batch.len());
        }
    }

    /// Runs a lifecycle hook, containing any panic so the worker survives.
    fn hook(&mut self, name: &'static str, f: impl FnOnce(&mut dyn Consumer<T>)) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.consumer.with(f)));
        if let Err(payload) = result {
            let error = ConsumeError::from_panic(payload);
            tracing::error!(
                carrier = %self.shared.name,
                worker = self.index,
                hook = name,
                %error,
                "consumer hook panicked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BufferStrategy;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Sink {
        items: Arc<Mutex<Vec<u32>>>,
    }

    impl Consumer<u32> for Sink {
        fn consume(&mut self, batch: &[u32]) -> Result<(), ConsumeError> {
            self.items.lock().extend_from_slice(batch);
            Ok(())
        }
    }

    fn channels(n: usize) -> Arc<Channels<u32>> {
        Arc::new(Channels::new(n, 16, BufferStrategy::IfPossible))
    }

    #[test]
    fn test_assignment_is_modulo() {
        let pool = ConsumerPool::new(
            "t",
            channels(5),
            ConsumerSource::factory(Sink::default),
            2,
            Duration::from_millis(5),
            16,
        )
        .unwrap();

        assert_eq!(pool.size(), 2);
        assert_eq!(pool.assignment(0), Some(&[0, 2, 4][..]));
        assert_eq!(pool.assignment(1), Some(&[1, 3][..]));
        assert_eq!(pool.assignment(2), None);
    }

    #[test]
    fn test_more_workers_than_channels() {
        let pool = ConsumerPool::new(
            "t",
            channels(2),
            ConsumerSource::factory(Sink::default),
            3,
            Duration::from_millis(5),
            16,
        )
        .unwrap();
        assert_eq!(pool.assignment(2), Some(&[][..]));
    }

    #[test]
    fn test_rejects_zero_workers_and_batch() {
        let zero_workers = ConsumerPool::new(
            "t",
            channels(1),
            ConsumerSource::factory(Sink::default),
            0,
            Duration::from_millis(5),
            16,
        );
        assert!(matches!(zero_workers, Err(ConfigError::ZeroConsumers)));

        let zero_batch = ConsumerPool::new(
            "t",
            channels(1),
            ConsumerSource::factory(Sink::default),
            1,
            Duration::from_millis(5),
            0,
        );
        assert!(matches!(zero_batch, Err(ConfigError::ZeroBatchSize)));
    }

    #[test]
    fn test_state_machine() {
        let mut pool = ConsumerPool::new(
            "t",
            channels(1),
            ConsumerSource::factory(Sink::default),
            1,
            Duration::from_millis(5),
            16,
        )
        .unwrap();

        assert_eq!(pool.state(), PoolState::Created);
        assert!(!pool.is_running());

        pool.begin().unwrap();
        assert_eq!(pool.state(), PoolState::Running);
        assert!(pool.is_running());

        pool.close();
        pool.close();
        assert_eq!(pool.state(), PoolState::Closed);
        assert!(!pool.is_running());

        // Closed is terminal.
        pool.begin().unwrap();
        assert_eq!(pool.state(), PoolState::Closed);
        pool.close_and_join();
    }

    #[test]
    fn test_close_before_begin_never_starts() {
        let started = Arc::new(AtomicUsize::new(0));

        struct Starter(Arc<AtomicUsize>);
        impl Consumer<u32> for Starter {
            fn on_start(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn consume(&mut self, _batch: &[u32]) -> Result<(), ConsumeError> {
                Ok(())
            }
        }

        let counter = Arc::clone(&started);
        let mut pool = ConsumerPool::new(
            "t",
            channels(1),
            ConsumerSource::factory(move || Starter(Arc::clone(&counter))),
            2,
            Duration::from_millis(5),
            16,
        )
        .unwrap();

        pool.close();
        pool.begin().unwrap();
        pool.close_and_join();
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_final_drain_on_close() {
        let ch = channels(2);
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink_items = Arc::clone(&items);
        let mut pool = ConsumerPool::new(
            "t",
            Arc::clone(&ch),
            ConsumerSource::factory(move || Sink {
                items: Arc::clone(&sink_items),
            }),
            1,
            // Long cycle: only the close-time drain can pick these up.
            Duration::from_secs(60),
            16,
        )
        .unwrap();
        pool.begin().unwrap();

        // Let the worker run its first (empty) cycle and go to sleep.
        thread::sleep(Duration::from_millis(50));
        for i in 0..6 {
            assert!(ch.save(i));
        }

        pool.close_and_join();
        let mut got = items.lock().clone();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_signal_closes_pool() {
        let mut pool = ConsumerPool::new(
            "signal",
            channels(1),
            ConsumerSource::factory(Sink::default),
            1,
            Duration::from_millis(5),
            16,
        )
        .unwrap();
        pool.begin().unwrap();

        let signal = pool.signal();
        assert_eq!(signal.name(), "signal");
        assert!(signal.same_pool(&pool.signal()));
        assert!(signal.is_running());

        signal.clone().close();
        assert!(!pool.is_running());
        assert_eq!(signal.state(), PoolState::Closed);
        pool.close_and_join();
    }

    #[test]
    fn test_admit_only_while_running() {
        let mut pool = ConsumerPool::new(
            "admit",
            channels(1),
            ConsumerSource::factory(Sink::default),
            1,
            Duration::from_millis(5),
            16,
        )
        .unwrap();
        let signal = pool.signal();
        assert!(signal.admit().is_none());

        pool.begin().unwrap();
        let admission = signal.admit();
        assert!(admission.is_some());
        assert_eq!(pool.shared.admitted(), 1);
        drop(admission);
        assert_eq!(pool.shared.admitted(), 0);

        pool.close();
        assert!(signal.admit().is_none());
        assert_eq!(pool.shared.admitted(), 0);
        pool.close_and_join();
    }

    #[test]
    fn test_final_drain_waits_for_admitted_write() {
        let ch = channels(2);
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink_items = Arc::clone(&items);
        let mut pool = ConsumerPool::new(
            "t",
            Arc::clone(&ch),
            ConsumerSource::factory(move || Sink {
                items: Arc::clone(&sink_items),
            }),
            2,
            Duration::from_millis(5),
            16,
        )
        .unwrap();
        pool.begin().unwrap();

        let signal = pool.signal();
        let admission = signal.admit().unwrap();
        pool.close();

        // Workers have had time to see the close; the write still counts.
        thread::sleep(Duration::from_millis(50));
        assert!(ch.save(7));
        assert!(ch.save(8));
        drop(admission);

        pool.close_and_join();
        let mut got = items.lock().clone();
        got.sort_unstable();
        assert_eq!(got, vec![7, 8]);
        assert!(ch.is_empty());
    }

    #[test]
    fn test_final_pass_ignores_batch_limit() {
        let ch = channels(1);
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink_items = Arc::clone(&items);
        let mut pool = ConsumerPool::new(
            "t",
            Arc::clone(&ch),
            ConsumerSource::factory(move || Sink {
                items: Arc::clone(&sink_items),
            }),
            1,
            Duration::from_secs(60),
            2,
        )
        .unwrap();
        pool.begin().unwrap();
        thread::sleep(Duration::from_millis(50));
        for i in 0..10 {
            assert!(ch.save(i));
        }

        pool.close_and_join();
        assert_eq!(items.lock().len(), 10);
    }

    #[test]
    fn test_zero_cycle_still_delivers_and_stops() {
        let ch = channels(1);
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink_items = Arc::clone(&items);
        let mut pool = ConsumerPool::new(
            "t",
            Arc::clone(&ch),
            ConsumerSource::factory(move || Sink {
                items: Arc::clone(&sink_items),
            }),
            1,
            Duration::ZERO,
            16,
        )
        .unwrap();
        pool.begin().unwrap();

        assert!(ch.save(1));
        let deadline = Instant::now() + Duration::from_secs(2);
        while items.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*items.lock(), vec![1]);

        pool.close_and_join();
        assert_eq!(pool.state(), PoolState::Closed);
    }
}
