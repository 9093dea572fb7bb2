#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_monotonic,
};
use crate::error::{RejectReason, Rejected};
use crate::strategy::BufferStrategy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// SYNCHRONIZATION
// =============================================================================
//
// A channel is written by any number of producers and read by exactly one
// consumer worker at a time, so unlike an SPSC ring it cannot rely on
// single-writer cursors. Both cursors live behind one short-held mutex:
//
// - Writers lock, check free space, store into `ring[tail % capacity]` and
//   bump `tail`. Under `Blocking` a writer facing a full ring waits on
//   `not_full`; the mutex is released while it sleeps.
// - The reader locks, moves up to N items out starting at `head`, bumps
//   `head`, unlocks, then wakes blocked writers if it freed anything.
// - `close()` flips `closed` while holding the mutex so a writer cannot check
//   the flag, miss the store, and then sleep forever.
//
// Cursors are unbounded u64 sequence numbers, as in a classic ring; the slot
// index is `sequence % capacity`. Capacity need not be a power of two.
//
// =============================================================================

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The item went into a free slot.
    Stored,
    /// The channel was full; the oldest unread item was dropped for this one.
    Evicted,
}

/// One bounded FIFO channel.
pub struct Buffer<T> {
    slots: Mutex<Slots<T>>,
    not_full: Condvar,
    closed: AtomicBool,
    capacity: usize,
}

struct Slots<T> {
    /// Fixed storage; `Some` exactly for sequences in `[head, tail)`.
    ring: Box<[Option<T>]>,
    /// Read cursor.
    head: u64,
    /// Write cursor.
    tail: u64,
}

impl<T> Slots<T> {
    #[inline]
    fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) as usize
    }

    #[inline]
    fn index(&self, sequence: u64) -> usize {
        (sequence % self.ring.len() as u64) as usize
    }

    fn push(&mut self, item: T) {
        let idx = self.index(self.tail);
        self.ring[idx] = Some(item);
        let new_tail = self.tail.wrapping_add(1);

        #[cfg(debug_assertions)]
        debug_assert_monotonic!("write", self.tail, new_tail);

        self.tail = new_tail;

        #[cfg(debug_assertions)]
        debug_assert_bounded_count!(self.len(), self.ring.len());
    }

    fn pop(&mut self) -> Option<T> {
        if self.head == self.tail {
            return None;
        }
        let idx = self.index(self.head);
        let item = self.ring[idx].take();
        let new_head = self.head.wrapping_add(1);

        #[cfg(debug_assertions)]
        {
            debug_assert_head_not_past_tail!(new_head, self.tail);
            debug_assert_monotonic!("read", self.head, new_head);
        }

        self.head = new_head;
        item
    }
}

impl<T> Buffer<T> {
    /// Creates an open channel with room for `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Carrier construction validates this
    /// before any buffer is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be greater than zero");
        let ring = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            slots: Mutex::new(Slots {
                ring,
                head: 0,
                tail: 0,
            }),
            not_full: Condvar::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Returns the fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of unread items.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if there is nothing to read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the channel is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the channel and wakes every blocked writer.
    ///
    /// Later writes fail with [`RejectReason::Closed`]. Items already buffered
    /// stay drainable.
    pub fn close(&self) {
        {
            let _slots = self.slots.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.not_full.notify_all();
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Writes `item` according to `strategy`.
    ///
    /// - `Blocking` waits for a free slot; fails only once closed.
    /// - `IfPossible` fails with `Full` when no slot is free.
    /// - `SkipToLatest` evicts the oldest unread item when full.
    ///
    /// On failure the item is handed back inside [`Rejected`].
    pub fn try_write(&self, item: T, strategy: BufferStrategy) -> Result<WriteOutcome, Rejected<T>> {
        let mut slots = self.slots.lock();
        loop {
            if self.is_closed() {
                return Err(Rejected::new(RejectReason::Closed, item));
            }
            if slots.len() < self.capacity {
                slots.push(item);
                return Ok(WriteOutcome::Stored);
            }
            match strategy {
                BufferStrategy::IfPossible => {
                    return Err(Rejected::new(RejectReason::Full, item));
                }
                BufferStrategy::SkipToLatest => {
                    let evicted = slots.pop();
                    slots.push(item);
                    // Run the evicted item's destructor outside the lock.
                    drop(slots);
                    drop(evicted);
                    return Ok(WriteOutcome::Evicted);
                }
                BufferStrategy::Blocking => self.not_full.wait(&mut slots),
            }
        }
    }

    /// Convenience wrapper returning only whether the item was accepted.
    #[inline]
    pub fn push(&self, item: T, strategy: BufferStrategy) -> bool {
        self.try_write(item, strategy).is_ok()
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Moves up to `max` oldest items into `out`, in write order.
    ///
    /// Never blocks waiting for data. Returns the number of items moved.
    pub fn drain_into(&self, out: &mut Vec<T>, max: usize) -> usize {
        let moved = {
            let mut slots = self.slots.lock();
            let n = slots.len().min(max);
            out.reserve(n);
            for _ in 0..n {
                match slots.pop() {
                    Some(item) => out.push(item),
                    None => break,
                }
            }
            n
        };
        if moved > 0 {
            self.not_full.notify_all();
        }
        moved
    }

    /// Removes and returns up to `max` oldest items.
    pub fn drain(&self, max: usize) -> Vec<T> {
        let mut out = Vec::new();
        self.drain_into(&mut out, max);
        out
    }
}
