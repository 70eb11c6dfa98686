//! The SPSC ring of `Batch` slots connecting one producer to one consumer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::batch::Batch;
use crate::config::{BufferConfig, OverflowPolicy};
use crate::error::BufferError;
use crate::invariants::{
    debug_assert_batch_shape, debug_assert_bounded_occupancy, debug_assert_monotonic,
};
use crate::sample::Sample;

/// Buffer lifecycle. Transitions only flow left to right; `stop` and `deinit`
/// are each idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
    Deinit,
}

struct RingState {
    head: u64,
    tail: u64,
    lifecycle: Lifecycle,
}

/// Aggregate counters for a `BatchBuffer`, snapshotted via `BatchBuffer::metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferMetrics {
    pub dropped_by_producer: u64,
    pub timeouts: u64,
}

/// A single-producer/single-consumer ring of preallocated `Batch<T>` slots.
///
/// Concurrency is `Mutex`-protected `{head, tail, lifecycle}` plus two
/// `Condvar`s (`not_full`, `not_empty`); the mutex is never held while a
/// producer or consumer touches sample data, matching the "atomics/condvars
/// for bookkeeping, mutex never on the data path" split in the design.
pub struct BatchBuffer<T: Sample> {
    config: BufferConfig,
    mask: u64,
    slots: UnsafeCell<Box<[Batch<T>]>>,
    state: Mutex<RingState>,
    not_full: Condvar,
    not_empty: Condvar,
    dropped_by_producer: AtomicU64,
    timeouts: AtomicU64,
}

// SAFETY: `slots` is only ever accessed through the head/tail protocol below:
// a producer reads/writes only the slot at `head % capacity`, a consumer only
// the slot at `tail % capacity`. `submit`/`del_tail` only advance an index
// after the corresponding access completes, and `submit` never advances head
// past `tail + (capacity - 1)`, so the two indices never name the same slot
// while both sides are live. There is exactly one producer and one consumer
// per buffer (spec §3 invariant), so this protocol is race-free.
unsafe impl<T: Sample> Send for BatchBuffer<T> {}
unsafe impl<T: Sample> Sync for BatchBuffer<T> {}

impl<T: Sample> BatchBuffer<T> {
    pub fn new(config: BufferConfig) -> Self {
        let capacity = config.ring_capacity();
        let batch_capacity = config.batch_capacity();
        let slots: Box<[Batch<T>]> = (0..capacity)
            .map(|_| Batch::with_capacity(batch_capacity))
            .collect();
        Self {
            config,
            mask: capacity as u64 - 1,
            slots: UnsafeCell::new(slots),
            state: Mutex::new(RingState {
                head: 0,
                tail: 0,
                lifecycle: Lifecycle::Created,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            dropped_by_producer: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn start(&self) {
        let mut st = self.state.lock().unwrap();
        if st.lifecycle == Lifecycle::Created {
            st.lifecycle = Lifecycle::Running;
            tracing::debug!(capacity = self.config.ring_capacity(), "buffer started");
        }
    }

    /// Idempotent. Wakes every blocked producer and consumer exactly once.
    pub fn stop(&self) {
        let mut st = self.state.lock().unwrap();
        if matches!(st.lifecycle, Lifecycle::Stopped | Lifecycle::Deinit) {
            return;
        }
        st.lifecycle = Lifecycle::Stopped;
        drop(st);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        tracing::debug!("buffer stopped");
    }

    pub fn deinit(&self) {
        let mut st = self.state.lock().unwrap();
        st.lifecycle = Lifecycle::Deinit;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().lifecycle == Lifecycle::Running
    }

    pub fn occupancy(&self) -> usize {
        let st = self.state.lock().unwrap();
        (st.head - st.tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == self.config.ring_capacity() - 1
    }

    pub fn metrics(&self) -> BufferMetrics {
        BufferMetrics {
            dropped_by_producer: self.dropped_by_producer.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    /// Reference to the next writable slot. Never fails — the slot is
    /// preallocated and always exists, per spec's `get_head` contract.
    pub fn get_head(&self) -> &mut Batch<T> {
        let head = self.state.lock().unwrap().head;
        let idx = (head & self.mask) as usize;
        // SAFETY: see the impl block's race-freedom comment; `idx` is the
        // producer's own slot and no consumer can be touching it concurrently.
        unsafe { &mut (*self.slots.get())[idx] }
    }

    /// Advances `head`, applying the buffer's configured overflow policy on a
    /// full ring.
    pub fn submit(&self, timeout: Duration) -> Result<(), BufferError> {
        self.submit_with_policy(timeout, self.config.overflow_behaviour)
    }

    /// Submits the current head slot as a `COMPLETE` sentinel, always under
    /// BLOCK semantics regardless of the buffer's configured overflow policy,
    /// so the sentinel is never silently dropped by DROP_HEAD/DROP_TAIL.
    pub fn submit_complete(&self, timeout: Duration) -> Result<(), BufferError> {
        self.submit_with_policy(timeout, OverflowPolicy::Block)
    }

    fn submit_with_policy(
        &self,
        timeout: Duration,
        policy: OverflowPolicy,
    ) -> Result<(), BufferError> {
        let capacity = self.config.ring_capacity() as u64;
        let mut st = self.state.lock().unwrap();
        if st.lifecycle != Lifecycle::Running {
            return Err(BufferError::Stopped);
        }
        debug_assert_bounded_occupancy!(st.head, st.tail, capacity);
        {
            let idx = (st.head & self.mask) as usize;
            // SAFETY: see the impl block's race-freedom comment; `idx` is the
            // producer's own slot, being submitted by its own caller.
            let slot = unsafe { &(*self.slots.get())[idx] };
            debug_assert_batch_shape!(slot.count, slot.capacity(), slot.is_complete());
        }
        if st.head - st.tail < capacity - 1 {
            let new_head = st.head + 1;
            debug_assert_monotonic!("head", st.head, new_head);
            st.head = new_head;
            drop(st);
            self.not_empty.notify_one();
            return Ok(());
        }

        match policy {
            OverflowPolicy::DropHead => {
                self.dropped_by_producer.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("DROP_HEAD: discarding newest batch on full buffer");
                Ok(())
            }
            OverflowPolicy::DropTail => {
                st.tail += 1;
                st.head += 1;
                self.dropped_by_producer.fetch_add(1, Ordering::Relaxed);
                drop(st);
                self.not_empty.notify_one();
                tracing::warn!("DROP_TAIL: discarded oldest batch to make room");
                Ok(())
            }
            OverflowPolicy::Block => {
                let (mut guard, _timed_out) = self
                    .not_full
                    .wait_timeout_while(st, timeout, |s| {
                        s.lifecycle == Lifecycle::Running && s.head - s.tail >= capacity - 1
                    })
                    .unwrap();
                if guard.lifecycle != Lifecycle::Running {
                    return Err(BufferError::Stopped);
                }
                if guard.head - guard.tail >= capacity - 1 {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    return Err(BufferError::Timeout);
                }
                let new_head = guard.head + 1;
                debug_assert_monotonic!("head", guard.head, new_head);
                guard.head = new_head;
                drop(guard);
                self.not_empty.notify_one();
                Ok(())
            }
        }
    }

    /// Reference to the oldest valid slot, blocking up to `timeout` while empty.
    pub fn get_tail(&self, timeout: Duration) -> Result<&Batch<T>, BufferError> {
        let mut st = self.state.lock().unwrap();
        if st.lifecycle != Lifecycle::Running {
            return Err(BufferError::Stopped);
        }
        if st.head == st.tail {
            let (guard, _timed_out) = self
                .not_empty
                .wait_timeout_while(st, timeout, |s| {
                    s.lifecycle == Lifecycle::Running && s.head == s.tail
                })
                .unwrap();
            st = guard;
            if st.lifecycle != Lifecycle::Running {
                return Err(BufferError::Stopped);
            }
            if st.head == st.tail {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::Timeout);
            }
        }
        let idx = (st.tail & self.mask) as usize;
        drop(st);
        // SAFETY: see the impl block's race-freedom comment; `idx` is the
        // consumer's own slot and no producer can be touching it concurrently.
        Ok(unsafe { &(*self.slots.get())[idx] })
    }

    /// Advances `tail`, wakes a waiting producer.
    pub fn del_tail(&self) {
        let mut st = self.state.lock().unwrap();
        let new_tail = st.tail + 1;
        debug_assert_monotonic!("tail", st.tail, new_tail);
        st.tail = new_tail;
        drop(st);
        self.not_full.notify_one();
    }
}
