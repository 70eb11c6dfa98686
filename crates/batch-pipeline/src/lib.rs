//! batch-pipeline — a real-time, in-process pipeline runtime for
//! sample-oriented numeric data streams.
//!
//! Producers, transforms and sinks ("filters") exchange fixed-shape batches
//! of samples through bounded single-producer/single-consumer ring buffers.
//! Each filter runs its own worker thread; filters compose only through
//! shared [`BatchBuffer`]s, with no central scheduler.
//!
//! # Example
//!
//! ```no_run
//! use batch_pipeline::{
//!     AlignGrid, AlignMethod, AlignerConfig, BufferConfig, DType, Filter,
//!     FilterConfig, OverflowPolicy, SampleAligner,
//! };
//! use std::sync::Arc;
//!
//! let buff = BufferConfig::new(DType::F32, 8, 4, OverflowPolicy::Block);
//! let aligner_cfg = AlignerConfig::new(FilterConfig::new("aligner", buff));
//! let (worker, _metrics) = SampleAligner::<f32>::new(&aligner_cfg);
//! let mut aligner = Filter::init(aligner_cfg.filter.clone(), 1, Box::new(worker)).unwrap();
//!
//! let sink_buf = Arc::new(batch_pipeline::BatchBuffer::<f32>::new(buff));
//! aligner.sink_connect(sink_buf).unwrap();
//! aligner.start().unwrap();
//! aligner.stop();
//! ```

mod aligner;
mod batch;
mod buffer;
mod config;
mod error;
mod filter;
mod invariants;
mod sample;
mod zoh;

pub use aligner::{AlignerMetrics, AlignerMetricsSnapshot, SampleAligner};
pub use batch::{Batch, Ec};
pub use buffer::{BatchBuffer, BufferMetrics};
pub use config::{
    AlignGrid, AlignMethod, AlignerConfig, Boundary, BufferConfig, FilterConfig,
    OverflowPolicy, ZohConfig, HIGH_THROUGHPUT_BUFFER, LOW_LATENCY_BUFFER, MAX_SOURCES,
};
pub use error::{BufferError, PipelineError, WorkerError, WorkerErrorKind};
pub use filter::{Filter, FilterHandle, FilterWorker};
pub use sample::{DType, Sample};
pub use zoh::{PerInputSnapshot, ZohMetrics, ZohResampler};
