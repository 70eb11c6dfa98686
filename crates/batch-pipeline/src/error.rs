//! Error taxonomy for the buffer transport, filter configuration and worker loops.

use thiserror::Error;

/// Errors returned by `BatchBuffer::submit`/`get_tail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The operation did not complete within the requested timeout.
    #[error("operation timed out")]
    Timeout,

    /// The buffer was stopped while the caller was waiting, or is already stopped.
    #[error("buffer is stopped")]
    Stopped,
}

impl BufferError {
    /// Timeouts are expected and recoverable; callers retry or continue their loop.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// `Stopped` is terminal for a waiter: the buffer will never unblock it again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Configuration-time errors, returned synchronously from `Filter::init`/`sink_connect`.
///
/// `spec.md`'s `NULL_POINTER` kind has no referent here: a downstream buffer is an
/// `Arc<BatchBuffer<T>>`, so there is no null-pointer state to observe or reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// `n_inputs`, `max_sinks`, or a buffer's capacity exponents were out of range.
    #[error("invalid configuration")]
    InvalidConfig,

    /// A dtype was requested that the aligner/ZOH cannot operate on (non-numeric).
    #[error("invalid element dtype for this filter")]
    InvalidDtype,

    /// A `sink_connect` target's `batch_capacity_expo` did not match the declared output shape.
    #[error("sink shape mismatch")]
    TypeMismatch,

    /// `start()` called on a filter that is already running.
    #[error("filter is already running")]
    AlreadyRunning,

    /// A worker that requires at least one sink was started with none connected.
    #[error("filter has no sink connected")]
    NoSink,
}

/// The kind of a fatal error observed by a filter worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    /// `period_ns == 0`, or differing `period_ns` observed across inputs of a multi-input filter.
    InvalidPeriod,
    /// An internal invariant (e.g. `head − tail` out of range) was violated.
    InvariantViolation,
    /// The worker's output path observed a buffer stop and had no sink to forward to.
    Unrecoverable,
}

impl std::fmt::Display for WorkerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidPeriod => "invalid or inconsistent sample period",
            Self::InvariantViolation => "internal invariant violated",
            Self::Unrecoverable => "unrecoverable worker condition",
        };
        f.write_str(msg)
    }
}

/// The first fatal error a filter's worker observed, latched into `Filter::worker_err`.
///
/// Captured with `#[track_caller]` at the call site so `file`/`line` name the actual
/// assertion that failed, per spec's "first error observed, with source location."
#[derive(Debug, Clone, Copy, Error)]
#[error("{kind} at {file}:{line}")]
pub struct WorkerError {
    pub kind: WorkerErrorKind,
    pub file: &'static str,
    pub line: u32,
}

impl WorkerError {
    #[track_caller]
    pub fn new(kind: WorkerErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            file: loc.file(),
            line: loc.line(),
        }
    }
}
