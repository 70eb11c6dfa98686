//! Debug assertion macros for the batch buffer's ring protocol.
//!
//! Only active in debug builds (`debug_assertions`); zero overhead in release.

/// `0 ≤ head − tail ≤ capacity − 1` at all times.
///
/// Used in: `BatchBuffer::advance_head`, `BatchBuffer::advance_tail`.
macro_rules! debug_assert_bounded_occupancy {
    ($head:expr, $tail:expr, $capacity:expr) => {
        debug_assert!(
            $head >= $tail && $head - $tail <= $capacity - 1,
            "occupancy out of range: head {} tail {} capacity {}",
            $head,
            $tail,
            $capacity
        )
    };
}

/// A sequence counter (`head`/`tail`/`batch_id`) only ever increases.
///
/// Used in: `BatchBuffer::advance_head`, `BatchBuffer::advance_tail`.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

/// A non-sentinel batch's `count` lies in `[1, capacity]`; a `COMPLETE` batch has `count == 0`.
///
/// Used in: `BatchBuffer::submit`.
macro_rules! debug_assert_batch_shape {
    ($count:expr, $capacity:expr, $is_complete:expr) => {
        debug_assert!(
            if $is_complete {
                $count == 0
            } else {
                $count >= 1 && $count <= $capacity
            },
            "batch shape invalid: count {} capacity {} complete {}",
            $count,
            $capacity,
            $is_complete
        )
    };
}

/// Output timestamps from an aligned grid fall exactly on the grid.
///
/// Used in: `aligner::emit`.
macro_rules! debug_assert_aligned {
    ($t_ns:expr, $period_ns:expr) => {
        debug_assert!(
            $t_ns % $period_ns == 0,
            "timestamp {} not aligned to period {}",
            $t_ns,
            $period_ns
        )
    };
}

pub(crate) use debug_assert_aligned;
pub(crate) use debug_assert_batch_shape;
pub(crate) use debug_assert_bounded_occupancy;
pub(crate) use debug_assert_monotonic;
