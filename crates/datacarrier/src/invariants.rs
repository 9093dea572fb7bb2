//! Debug assertion macros for buffer and pool invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so release builds
//! pay nothing for them.

// =============================================================================
// Bounded count
// =============================================================================

/// Assert that occupied slots never exceed capacity.
///
/// **Invariant**: `0 ≤ (tail - head) ≤ capacity`
///
/// Used in: `Buffer` after every write
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: {} occupied slots exceed capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that the read cursor never passes the write cursor.
///
/// **Invariant**: `head ≤ tail` (after advance)
///
/// Used in: `Buffer::drain_into()` before moving head
macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $tail:expr) => {
        debug_assert!(
            $new_head <= $tail,
            "read cursor {} advanced beyond write cursor {}",
            $new_head,
            $tail
        )
    };
}

// =============================================================================
// Monotonic cursors
// =============================================================================

/// Assert that a cursor only moves forward.
///
/// Used in: `Buffer` for both cursors
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} cursor decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Routing
// =============================================================================

/// Assert that a partitioner picked an existing channel.
///
/// **Invariant**: `0 ≤ index < total`
///
/// Used in: `Channels::save()`
macro_rules! debug_assert_partition_in_range {
    ($index:expr, $total:expr) => {
        debug_assert!(
            $index < $total,
            "partitioner returned channel {} but only {} channels exist",
            $index,
            $total
        )
    };
}

// =============================================================================
// Channel ownership
// =============================================================================

/// Assert that the pool assigned every channel to exactly one worker.
///
/// Used in: `ConsumerPool::new()` after building assignments
macro_rules! debug_assert_assignment_complete {
    ($assignments:expr, $total:expr) => {
        debug_assert!(
            {
                let mut seen = vec![0usize; $total];
                for channels in $assignments.iter() {
                    for &ch in channels.iter() {
                        seen[ch] += 1;
                    }
                }
                seen.iter().all(|&n| n == 1)
            },
            "channel assignment does not cover each of {} channels exactly once",
            $total
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_assignment_complete;
pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_partition_in_range;
