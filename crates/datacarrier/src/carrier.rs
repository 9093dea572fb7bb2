use crate::buffer::WriteOutcome;
use crate::channels::Channels;
use crate::config::CarrierConfig;
use crate::consumer::ConsumerSource;
use crate::error::{CarrierError, ConfigError, RejectReason, Rejected};
use crate::metrics::{CarrierMetrics, MetricsSnapshot};
use crate::partition::Partitioner;
use crate::pool::{ConsumerPool, PoolSignal};
use crate::registry::PoolRegistry;
use crate::strategy::BufferStrategy;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Name used when a carrier is built without one.
pub const DEFAULT_NAME: &str = "default";

/// Producer/consumer facade over one [`Channels`] and at most one
/// [`ConsumerPool`].
///
/// `produce` may be called from any number of threads through a shared
/// reference (typically `Arc<DataCarrier<T>>`). It never takes the lifecycle
/// lock: the active pool's state is read through an atomically swapped
/// handle.
///
/// # Degrade on no consumer
///
/// Once a pool has been installed, `produce` refuses items whenever that pool
/// is not running, instead of buffering into channels nobody will drain.
/// With no pool ever installed, items are buffered so a pool attached later
/// can pick them up.
pub struct DataCarrier<T> {
    name: String,
    config: CarrierConfig,
    channels: Arc<Channels<T>>,
    /// Close handle of the installed pool, read lock-free by producers.
    active: ArcSwapOption<PoolSignal>,
    /// The installed pool itself; only `consume`/`shutdown*` touch it.
    pool: Mutex<Option<ConsumerPool<T>>>,
    metrics: Option<Arc<CarrierMetrics>>,
    registry: Option<Arc<PoolRegistry>>,
}

impl<T: Send + 'static> DataCarrier<T> {
    /// Creates a carrier named `"default"` with `channel_size` channels of
    /// `buffer_size` slots, round-robin routing and `Blocking` overflow.
    pub fn new(channel_size: usize, buffer_size: usize) -> Result<Self, ConfigError> {
        Self::with_config(DEFAULT_NAME, CarrierConfig::new(channel_size, buffer_size))
    }

    /// Creates a named carrier from a full configuration.
    pub fn with_config(name: impl Into<String>, config: CarrierConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = name.into();
        let channels = Channels::new(config.channel_size, config.buffer_size, config.strategy);

        tracing::debug!(
            carrier = %name,
            channels = config.channel_size,
            buffer_size = config.buffer_size,
            strategy = ?config.strategy,
            "carrier created"
        );

        Ok(Self {
            name,
            config,
            channels: Arc::new(channels),
            active: ArcSwapOption::empty(),
            pool: Mutex::new(None),
            metrics: config.enable_metrics.then(|| Arc::new(CarrierMetrics::new())),
            registry: None,
        })
    }

    /// Registers every pool this carrier installs in `registry`.
    pub fn with_registry(mut self, registry: Arc<PoolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the partitioner (default: round-robin). Affects later writes.
    pub fn set_partitioner<P>(&self, partitioner: P) -> &Self
    where
        P: Partitioner<T> + 'static,
    {
        self.channels.set_partitioner(partitioner);
        self
    }

    // ---------------------------------------------------------------------
    // CONSUMER LIFECYCLE
    // ---------------------------------------------------------------------

    /// Installs a pool of `num` workers using the configured consume cycle.
    pub fn consume(&self, source: ConsumerSource<T>, num: usize) -> Result<(), CarrierError> {
        self.consume_with_cycle(source, num, self.config.consume_cycle)
    }

    /// Installs a pool of `num` workers draining every `consume_cycle`.
    ///
    /// The new pool starts before the previous one is closed, so producers
    /// never observe a gap with no running pool. The previous pool is only
    /// signaled: its in-flight batch and final drain finish on their own
    /// threads while the new pool already reads the same channels.
    pub fn consume_with_cycle(
        &self,
        source: ConsumerSource<T>,
        num: usize,
        consume_cycle: Duration,
    ) -> Result<(), CarrierError> {
        let mut pool = ConsumerPool::new(
            self.name.clone(),
            Arc::clone(&self.channels),
            source,
            num,
            consume_cycle,
            self.config.batch_limit(),
        )?;
        if let Some(metrics) = &self.metrics {
            pool = pool.with_metrics(Arc::clone(metrics));
        }

        let mut installed = self.pool.lock();
        pool.begin()?;

        let signal = pool.signal();
        self.active.store(Some(Arc::new(signal.clone())));
        if let Some(previous) = installed.replace(pool) {
            if let Some(registry) = &self.registry {
                registry.unregister(&self.name, &previous.signal());
            }
            previous.close();
            tracing::info!(carrier = %self.name, workers = num, "replaced consumer pool");
        }
        if let Some(registry) = &self.registry {
            registry.register(self.name.clone(), signal);
        }
        Ok(())
    }
}

impl<T> DataCarrier<T> {
    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Buffers `item`; returns `false` if it was refused.
    ///
    /// A `false` means the item will not be consumed. It does not say why;
    /// use [`try_produce`](Self::try_produce) for the reason.
    #[inline]
    pub fn produce(&self, item: T) -> bool {
        self.try_produce(item).is_ok()
    }

    /// Buffers `item`, or hands it back with the reason it was refused.
    pub fn try_produce(&self, item: T) -> Result<(), Rejected<T>> {
        let active = self.active.load_full();
        // Held across the write so the pool cannot finish its final drain
        // before this item lands.
        let _admission = match &active {
            Some(pool) => match pool.admit() {
                Some(admission) => Some(admission),
                None => {
                    self.record_rejected(RejectReason::NoConsumer);
                    return Err(Rejected::new(RejectReason::NoConsumer, item));
                }
            },
            None => None,
        };

        match self.channels.try_save(item) {
            Ok(outcome) => {
                if let Some(metrics) = &self.metrics {
                    metrics.add_produced();
                    if outcome == WriteOutcome::Evicted {
                        metrics.add_overwritten();
                    }
                }
                Ok(())
            }
            Err(rejected) => {
                self.record_rejected(rejected.reason());
                Err(rejected)
            }
        }
    }

    #[inline]
    fn record_rejected(&self, reason: RejectReason) {
        if let Some(metrics) = &self.metrics {
            metrics.add_rejected(reason);
        }
    }

    /// Replaces the overflow policy for later writes.
    pub fn set_buffer_strategy(&self, strategy: BufferStrategy) -> &Self {
        self.channels.set_strategy(strategy);
        self
    }

    /// Forces `Blocking` and returns a producer-only view of the same
    /// channels, for callers that drain synchronously instead of through a
    /// pool.
    pub fn to_blocking(&self) -> BlockingDataCarrier<T> {
        self.channels.set_strategy(BufferStrategy::Blocking);
        BlockingDataCarrier {
            channels: Arc::clone(&self.channels),
        }
    }

    // ---------------------------------------------------------------------
    // SHUTDOWN
    // ---------------------------------------------------------------------

    /// Signals the installed pool to stop. Later `produce` calls fail fast.
    ///
    /// Items already buffered are still delivered once by each worker's
    /// final drain. Workers keep draining until every `produce` call that
    /// got in before the signal has written, so an accepted item is always
    /// delivered, including one that was blocked under `Blocking`.
    pub fn shutdown_consumers(&self) {
        if let Some(pool) = self.pool.lock().as_ref() {
            pool.close();
            if let Some(registry) = &self.registry {
                registry.unregister(&self.name, &pool.signal());
            }
        }
    }

    /// Like [`shutdown_consumers`](Self::shutdown_consumers), then waits for
    /// every worker's final drain and `on_exit`.
    ///
    /// Must not be called from inside a consumer of this carrier.
    pub fn shutdown_consumers_and_wait(&self) {
        let mut installed = self.pool.lock();
        if let Some(pool) = installed.as_mut() {
            if let Some(registry) = &self.registry {
                registry.unregister(&self.name, &pool.signal());
            }
            pool.close_and_join();
        }
    }

    /// Terminal shutdown: stops consumers and closes every channel, waking
    /// blocked producers. All later `produce` calls return `false`.
    pub fn close(&self) {
        self.shutdown_consumers();
        self.channels.close();
        tracing::debug!(carrier = %self.name, "carrier closed");
    }

    // ---------------------------------------------------------------------
    // INTROSPECTION
    // ---------------------------------------------------------------------

    /// The carrier's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration the carrier was built with.
    pub fn config(&self) -> &CarrierConfig {
        &self.config
    }

    /// Number of channels.
    pub fn channel_size(&self) -> usize {
        self.channels.channel_size()
    }

    /// Capacity of each channel.
    pub fn buffer_size(&self) -> usize {
        self.channels.buffer_size()
    }

    /// Current overflow policy.
    pub fn buffer_strategy(&self) -> BufferStrategy {
        self.channels.strategy()
    }

    /// Returns `true` if a pool is installed and running.
    pub fn is_consuming(&self) -> bool {
        match &*self.active.load() {
            Some(pool) => pool.is_running(),
            None => false,
        }
    }

    /// Approximate number of buffered items across all channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no channel held an item when checked.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Counters, if the carrier was built with `enable_metrics`.
    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.metrics.as_ref().map(|m| m.snapshot())
    }
}

impl<T> Drop for DataCarrier<T> {
    fn drop(&mut self) {
        self.shutdown_consumers();
    }
}

/// Producer-only view of a carrier's channels that always blocks when full.
///
/// It writes with `Blocking` regardless of later strategy changes on the
/// originating carrier, and does not look at any consumer pool: whoever
/// holds it is expected to drain the channels directly.
pub struct BlockingDataCarrier<T> {
    channels: Arc<Channels<T>>,
}

impl<T> BlockingDataCarrier<T> {
    /// Buffers `item`, waiting for space if its channel is full. Returns
    /// `false` only if the channels were closed.
    pub fn produce(&self, item: T) -> bool {
        self.try_produce(item).is_ok()
    }

    /// Like [`produce`](Self::produce) but hands the item back on failure.
    pub fn try_produce(&self, item: T) -> Result<(), Rejected<T>> {
        self.channels
            .try_save_with(item, BufferStrategy::Blocking)
            .map(|_| ())
    }

    /// Takes up to `max` items from channel `index`, oldest first.
    ///
    /// Returns an empty vector for an unknown channel. Draining a channel a
    /// running pool also reads breaks that pool's per-channel ordering.
    pub fn drain(&self, index: usize, max: usize) -> Vec<T> {
        self.channels
            .buffer(index)
            .map(|buffer| buffer.drain(max))
            .unwrap_or_default()
    }

    /// Number of channels.
    pub fn channel_size(&self) -> usize {
        self.channels.channel_size()
    }
}

impl<T> Clone for BlockingDataCarrier<T> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}
