#[cfg(debug_assertions)]
use crate::invariants::debug_assert_partition_in_range;
use crate::buffer::{Buffer, WriteOutcome};
use crate::error::Rejected;
use crate::partition::{Partitioner, RollingPartitioner};
use crate::strategy::BufferStrategy;
use arc_swap::ArcSwap;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A fixed set of independent bounded channels behind one partitioner.
///
/// There is no lock spanning channels. Each channel serializes its own
/// readers and writers, and the partitioner and strategy are read without
/// locking on every save, so any number of producer threads may call
/// [`save`](Self::save) concurrently.
pub struct Channels<T> {
    buffers: Box<[CachePadded<Buffer<T>>]>,
    partitioner: ArcSwap<Box<dyn Partitioner<T>>>,
    strategy: AtomicU8,
    buffer_size: usize,
}

impl<T: Send + 'static> Channels<T> {
    /// Creates `channel_size` channels of `buffer_size` slots, routed
    /// round-robin.
    pub fn new(channel_size: usize, buffer_size: usize, strategy: BufferStrategy) -> Self {
        Self::with_partitioner(channel_size, buffer_size, RollingPartitioner::new(), strategy)
    }

    /// Creates channels routed by `partitioner`.
    pub fn with_partitioner<P>(
        channel_size: usize,
        buffer_size: usize,
        partitioner: P,
        strategy: BufferStrategy,
    ) -> Self
    where
        P: Partitioner<T> + 'static,
    {
        let buffers = (0..channel_size)
            .map(|_| CachePadded::new(Buffer::new(buffer_size)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let partitioner: Box<dyn Partitioner<T>> = Box::new(partitioner);

        Self {
            buffers,
            partitioner: ArcSwap::from_pointee(partitioner),
            strategy: AtomicU8::new(strategy.as_u8()),
            buffer_size,
        }
    }

    /// Replaces the partitioner. Already-buffered items stay where they are.
    pub fn set_partitioner<P>(&self, partitioner: P)
    where
        P: Partitioner<T> + 'static,
    {
        let partitioner: Box<dyn Partitioner<T>> = Box::new(partitioner);
        self.partitioner.store(Arc::new(partitioner));
    }
}

impl<T> Channels<T> {
    /// Routes `item` to one channel and writes it under the current strategy.
    pub fn try_save(&self, item: T) -> Result<WriteOutcome, Rejected<T>> {
        self.try_save_with(item, self.strategy())
    }

    /// Routes `item` and writes it under `strategy`, ignoring the set's own.
    pub fn try_save_with(
        &self,
        item: T,
        strategy: BufferStrategy,
    ) -> Result<WriteOutcome, Rejected<T>> {
        let total = self.buffers.len();
        let index = self.partitioner.load().partition(total, &item);

        #[cfg(debug_assertions)]
        debug_assert_partition_in_range!(index, total);

        self.buffers[index % total].try_write(item, strategy)
    }

    /// Routes and writes `item`; returns whether it was accepted.
    #[inline]
    pub fn save(&self, item: T) -> bool {
        self.try_save(item).is_ok()
    }

    /// Replaces the overflow policy for subsequent writes.
    ///
    /// A producer already waiting under `Blocking` keeps waiting; the new
    /// policy applies from its next write.
    pub fn set_strategy(&self, strategy: BufferStrategy) {
        self.strategy.store(strategy.as_u8(), Ordering::Release);
    }

    /// Returns the current overflow policy.
    #[inline]
    pub fn strategy(&self) -> BufferStrategy {
        BufferStrategy::from_u8(self.strategy.load(Ordering::Acquire))
    }

    /// Number of channels.
    #[inline]
    pub fn channel_size(&self) -> usize {
        self.buffers.len()
    }

    /// Capacity of each channel.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Direct access to one channel, e.g. for a dedicated reader.
    ///
    /// Returns `None` if `index >= channel_size`.
    pub fn buffer(&self, index: usize) -> Option<&Buffer<T>> {
        self.buffers.get(index).map(|b| &**b)
    }

    /// Sum of unread items. Channels are read one at a time, so this is only
    /// a rough figure while producers or consumers are active.
    pub fn len(&self) -> usize {
        self.buffers.iter().map(|b| b.len()).sum()
    }

    /// Returns true if every channel was empty when checked.
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(|b| b.is_empty())
    }

    /// Closes every channel, waking blocked producers.
    pub fn close(&self) {
        for buffer in self.buffers.iter() {
            buffer.close();
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.buffers.iter().all(|b| b.is_closed())
    }
}
