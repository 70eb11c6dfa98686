//! Configuration records for buffers and filters.

use crate::sample::DType;

/// Policy applied by a producer when `submit` finds the ring full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Block the producer (up to the caller's timeout) until the consumer makes room.
    Block,
    /// Discard the batch being submitted; the oldest batches in the ring are kept.
    DropHead,
    /// Discard the oldest batch in the ring to make room for the new one.
    DropTail,
}

/// Shared shape/overflow configuration for a `BatchBuffer`.
///
/// Mirrors the teacher's `Config`: small, `Copy`, validated at construction rather
/// than at every use.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Declared element type; immutable after init.
    pub dtype: DType,
    /// `log2` of the per-batch sample capacity. Must be in `[1, 16]`.
    pub batch_capacity_expo: u8,
    /// `log2` of the ring slot count. Must be in `[1, 16]`.
    pub ring_capacity_expo: u8,
    /// Policy applied on a full ring.
    pub overflow_behaviour: OverflowPolicy,
}

impl BufferConfig {
    /// Creates a new configuration, validating the capacity exponents.
    ///
    /// # Panics
    ///
    /// Panics if either exponent is 0 or greater than 16, matching the teacher's
    /// `Config::new` fail-fast-on-construction convention.
    pub const fn new(
        dtype: DType,
        batch_capacity_expo: u8,
        ring_capacity_expo: u8,
        overflow_behaviour: OverflowPolicy,
    ) -> Self {
        assert!(
            batch_capacity_expo > 0 && batch_capacity_expo <= 16,
            "batch_capacity_expo must be between 1 and 16"
        );
        assert!(
            ring_capacity_expo > 0 && ring_capacity_expo <= 16,
            "ring_capacity_expo must be between 1 and 16"
        );
        Self {
            dtype,
            batch_capacity_expo,
            ring_capacity_expo,
            overflow_behaviour,
        }
    }

    /// Per-batch sample capacity, `2^batch_capacity_expo`.
    #[inline]
    pub const fn batch_capacity(&self) -> usize {
        1 << self.batch_capacity_expo
    }

    /// Ring slot count, `2^ring_capacity_expo`. One slot is always reserved empty.
    #[inline]
    pub const fn ring_capacity(&self) -> usize {
        1 << self.ring_capacity_expo
    }

    /// Returns `true` if `other` is shape-compatible for `sink_connect`:
    /// same dtype and the same `batch_capacity_expo`.
    #[inline]
    pub const fn shape_matches(&self, other: &BufferConfig) -> bool {
        self.batch_capacity_expo == other.batch_capacity_expo
            && dtype_eq(self.dtype, other.dtype)
    }
}

const fn dtype_eq(a: DType, b: DType) -> bool {
    matches!(
        (a, b),
        (DType::F32, DType::F32)
            | (DType::F64, DType::F64)
            | (DType::I32, DType::I32)
            | (DType::U32, DType::U32)
    )
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(DType::F32, 8, 4, OverflowPolicy::Block)
    }
}

/// A low-latency preset: small batches, a small ring, blocking backpressure.
pub const LOW_LATENCY_BUFFER: BufferConfig = BufferConfig::new(DType::F32, 6, 3, OverflowPolicy::Block);

/// A high-throughput preset: large batches, a deep ring, drop-tail under overload.
pub const HIGH_THROUGHPUT_BUFFER: BufferConfig =
    BufferConfig::new(DType::F32, 10, 6, OverflowPolicy::DropTail);

/// Shared fields every filter configuration carries.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub name: String,
    pub buff_config: BufferConfig,
    pub timeout_us: u64,
    pub max_sinks: usize,
    /// Whether `Filter::start` requires at least one sink already connected.
    /// `true` for SOURCE/MAP/MULTI_IN filters, which exist to produce
    /// output; a terminal SINK filter sets this `false` via
    /// [`FilterConfig::terminal`].
    pub requires_sink: bool,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>, buff_config: BufferConfig) -> Self {
        Self {
            name: name.into(),
            buff_config,
            timeout_us: 10_000,
            max_sinks: 4,
            requires_sink: true,
        }
    }

    /// A terminal (SINK-type) filter config: `max_sinks` is 0 and `start`
    /// does not require a sink to already be connected.
    pub fn terminal(name: impl Into<String>, buff_config: BufferConfig) -> Self {
        Self {
            max_sinks: 0,
            requires_sink: false,
            ..Self::new(name, buff_config)
        }
    }

    #[must_use]
    pub fn with_timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = timeout_us;
        self
    }

    #[must_use]
    pub fn with_max_sinks(mut self, max_sinks: usize) -> Self {
        self.max_sinks = max_sinks;
        self
    }
}

/// Interpolation method used between the two bracketing input samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMethod {
    /// Pick whichever bracketing sample is temporally closer.
    Nearest,
    /// Linearly interpolate between the bracketing samples.
    Linear,
}

/// How the first aligned output timestamp is derived from the first input's `t_ns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignGrid {
    Nearest,
    Backward,
    Forward,
}

/// What to emit before the first usable input pair is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Repeat the first observed value.
    Hold,
    /// Emit nothing until a real pair is available.
    Drop,
}

/// Configuration for `SampleAligner`.
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    pub filter: FilterConfig,
    pub method: AlignMethod,
    pub alignment: AlignGrid,
    pub boundary: Boundary,
}

impl AlignerConfig {
    pub fn new(filter: FilterConfig) -> Self {
        Self {
            filter,
            method: AlignMethod::Linear,
            alignment: AlignGrid::Nearest,
            boundary: Boundary::Hold,
        }
    }
}

/// Configuration for the zero-order-hold multi-input resampler.
#[derive(Debug, Clone)]
pub struct ZohConfig {
    pub filter: FilterConfig,
    pub output_period_ns: u64,
    pub n_inputs: usize,
    pub drop_on_underrun: bool,
}

/// Upper bound on `ZohConfig::n_inputs`, matching spec's `MAX_SOURCES`.
pub const MAX_SOURCES: usize = 32;

impl ZohConfig {
    pub fn new(filter: FilterConfig, output_period_ns: u64, n_inputs: usize) -> Self {
        Self {
            filter,
            output_period_ns,
            n_inputs,
            drop_on_underrun: false,
        }
    }

    #[must_use]
    pub fn with_drop_on_underrun(mut self, drop: bool) -> Self {
        self.drop_on_underrun = drop;
        self
    }
}
