//! Strategies for routing an item to one channel of the set.
//!
//! A partitioner must return an index in `0..total` and may be called
//! concurrently from any number of producer threads.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Maps an item to a channel index in `0..total`.
pub trait Partitioner<T>: Send + Sync {
    /// Chooses the channel for `item` out of `total` channels.
    fn partition(&self, total: usize, item: &T) -> usize;
}

/// Round-robin over an internal counter, ignoring item content.
///
/// This is the default. Over `n` sequential calls each channel receives
/// either `n / total` or `n / total + 1` items.
#[derive(Debug, Default)]
pub struct RollingPartitioner {
    next: AtomicUsize,
}

impl RollingPartitioner {
    /// Creates a partitioner whose first pick is channel 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Partitioner<T> for RollingPartitioner {
    #[inline]
    fn partition(&self, total: usize, _item: &T) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % total
    }
}

/// Routes by the identity of the producing thread.
///
/// Every item from one thread lands in the same channel, so a single
/// producer's items keep their relative order end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPartitioner;

impl<T> Partitioner<T> for ThreadPartitioner {
    fn partition(&self, total: usize, _item: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        (hasher.finish() % total as u64) as usize
    }
}

/// Routes by the hash of a key extracted from the item.
///
/// Items sharing a key always share a channel, which keeps per-key FIFO.
///
/// ```
/// use datacarrier::{KeyPartitioner, Partitioner};
///
/// struct Segment { trace_id: u64 }
///
/// let by_trace = KeyPartitioner::new(|s: &Segment| s.trace_id);
/// let a = by_trace.partition(4, &Segment { trace_id: 42 });
/// let b = by_trace.partition(4, &Segment { trace_id: 42 });
/// assert_eq!(a, b);
/// ```
pub struct KeyPartitioner<F> {
    key: F,
}

impl<F> KeyPartitioner<F> {
    /// Wraps a key extractor.
    pub fn new(key: F) -> Self {
        Self { key }
    }
}

impl<T, K, F> Partitioner<T> for KeyPartitioner<F>
where
    F: Fn(&T) -> K + Send + Sync,
    K: Hash,
{
    fn partition(&self, total: usize, item: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        (self.key)(item).hash(&mut hasher);
        (hasher.finish() % total as u64) as usize
    }
}
