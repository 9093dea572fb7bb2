use crate::error::RejectReason;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by producers and consumer workers.
///
/// Producer-side and consumer-side counters sit on separate cache lines so
/// the two sides do not invalidate each other.
#[derive(Debug, Default)]
pub struct CarrierMetrics {
    producer: CachePadded<ProducerCounters>,
    consumer: CachePadded<ConsumerCounters>,
}

#[derive(Debug, Default)]
struct ProducerCounters {
    produced: AtomicU64,
    rejected_full: AtomicU64,
    rejected_no_consumer: AtomicU64,
    rejected_closed: AtomicU64,
    overwritten: AtomicU64,
}

#[derive(Debug, Default)]
struct ConsumerCounters {
    consumed: AtomicU64,
    batches: AtomicU64,
    consume_errors: AtomicU64,
}

/// Point-in-time copy of [`CarrierMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub produced: u64,
    pub rejected_full: u64,
    pub rejected_no_consumer: u64,
    pub rejected_closed: u64,
    pub overwritten: u64,
    /// Items in batches the consumer accepted.
    pub consumed: u64,
    /// Batches the consumer accepted.
    pub batches: u64,
    /// Batches the consumer failed or panicked on. Not counted as consumed.
    pub consume_errors: u64,
}

impl MetricsSnapshot {
    /// Total items refused for any reason.
    pub fn rejected(&self) -> u64 {
        self.rejected_full + self.rejected_no_consumer + self.rejected_closed
    }
}

impl CarrierMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_produced(&self) {
        self.producer.produced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_rejected(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::Full => &self.producer.rejected_full,
            RejectReason::NoConsumer => &self.producer.rejected_no_consumer,
            RejectReason::Closed => &self.producer.rejected_closed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_overwritten(&self) {
        self.producer.overwritten.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_batch(&self, items: usize) {
        self.consumer.consumed.fetch_add(items as u64, Ordering::Relaxed);
        self.consumer.batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_consume_error(&self) {
        self.consumer.consume_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter. Counters are loaded one by one, so the snapshot
    /// is not atomic across fields.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.producer.produced.load(Ordering::Relaxed),
            rejected_full: self.producer.rejected_full.load(Ordering::Relaxed),
            rejected_no_consumer: self.producer.rejected_no_consumer.load(Ordering::Relaxed),
            rejected_closed: self.producer.rejected_closed.load(Ordering::Relaxed),
            overwritten: self.producer.overwritten.load(Ordering::Relaxed),
            consumed: self.consumer.consumed.load(Ordering::Relaxed),
            batches: self.consumer.batches.load(Ordering::Relaxed),
            consume_errors: self.consumer.consume_errors.load(Ordering::Relaxed),
        }
    }
}
