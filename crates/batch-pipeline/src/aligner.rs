//! Phase-correcting interpolator: re-grids an arbitrarily phased input stream
//! onto a timestamp grid aligned to `t_ns mod period_ns == 0`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::batch::{Batch, Ec};
use crate::config::{AlignGrid, AlignMethod, AlignerConfig, Boundary};
use crate::error::{BufferError, WorkerError, WorkerErrorKind};
use crate::filter::{FilterHandle, FilterWorker};
use crate::invariants::debug_assert_aligned;
use crate::sample::Sample;

/// `max_phase_correction_ns`, `samples_interpolated`, `samples_emitted`,
/// atomic so a caller can poll them from outside the worker thread without
/// contending with the worker's own hot path.
pub struct AlignerMetrics {
    max_phase_correction_ns: AtomicI64,
    samples_interpolated: AtomicU64,
    samples_emitted: AtomicU64,
}

impl AlignerMetrics {
    fn new() -> Self {
        Self {
            max_phase_correction_ns: AtomicI64::new(0),
            samples_interpolated: AtomicU64::new(0),
            samples_emitted: AtomicU64::new(0),
        }
    }

    /// CAS-loop update: the spec requires monotonic convergence to the true
    /// max, not lock-freedom per se, so a plain loop over `compare_exchange_weak`
    /// is sufficient.
    fn record_phase_correction(&self, offset_ns: i64) {
        let target = offset_ns.abs();
        let mut observed = self.max_phase_correction_ns.load(Ordering::Relaxed);
        while target > observed {
            match self.max_phase_correction_ns.compare_exchange_weak(
                observed,
                target,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }
    }

    pub fn snapshot(&self) -> AlignerMetricsSnapshot {
        AlignerMetricsSnapshot {
            max_phase_correction_ns: self.max_phase_correction_ns.load(Ordering::Relaxed),
            samples_interpolated: self.samples_interpolated.load(Ordering::Relaxed),
            samples_emitted: self.samples_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlignerMetricsSnapshot {
    pub max_phase_correction_ns: i64,
    pub samples_interpolated: u64,
    pub samples_emitted: u64,
}

fn first_aligned(t_ns: u64, period_ns: u64, alignment: AlignGrid) -> u64 {
    let floor = (t_ns / period_ns) * period_ns;
    match alignment {
        AlignGrid::Backward => floor,
        AlignGrid::Forward => {
            if floor == t_ns {
                floor
            } else {
                floor + period_ns
            }
        }
        AlignGrid::Nearest => {
            let rem = t_ns - floor;
            if rem * 2 >= period_ns {
                floor + period_ns
            } else {
                floor
            }
        }
    }
}

/// Single-input `FilterWorker` that emits an aligned-grid copy of its input.
pub struct SampleAligner<T: Sample> {
    method: AlignMethod,
    alignment: AlignGrid,
    boundary: Boundary,
    period_ns: u64,
    prev: Option<(T, u64)>,
    cur: Option<(T, u64)>,
    next_out: Option<u64>,
    out: Batch<T>,
    next_batch_id: u64,
    metrics: Arc<AlignerMetrics>,
}

impl<T: Sample> SampleAligner<T> {
    /// Builds the worker and a cloneable metrics handle the caller can poll
    /// independently of the worker thread.
    pub fn new(config: &AlignerConfig) -> (Self, Arc<AlignerMetrics>) {
        let metrics = Arc::new(AlignerMetrics::new());
        let out = Batch::with_capacity(config.filter.buff_config.batch_capacity());
        let worker = Self {
            method: config.method,
            alignment: config.alignment,
            boundary: config.boundary,
            period_ns: 0,
            prev: None,
            cur: None,
            next_out: None,
            out,
            next_batch_id: 0,
            metrics: Arc::clone(&metrics),
        };
        (worker, metrics)
    }

    fn ingest(&mut self, batch: &Batch<T>, handle: &FilterHandle<T>) {
        self.period_ns = batch.period_ns;
        for i in 0..batch.count {
            let t = batch.t_ns + i as u64 * batch.period_ns;
            let v = batch.samples()[i];
            match self.cur {
                None => {
                    self.cur = Some((v, t));
                    let next = first_aligned(t, batch.period_ns, self.alignment);
                    self.metrics
                        .record_phase_correction(t as i64 - next as i64);
                    self.next_out = Some(next);
                    match self.boundary {
                        Boundary::Hold => {
                            self.prev = Some((v, t));
                            self.drain(handle);
                        }
                        Boundary::Drop => {
                            // No real two-sample window exists yet — discard
                            // every grid point at or before this first
                            // sample instead of interpolating/extrapolating
                            // against it once `prev` is eventually set.
                            while let Some(next_out) = self.next_out {
                                if next_out > t {
                                    break;
                                }
                                self.next_out = Some(next_out + self.period_ns);
                            }
                        }
                    }
                }
                Some(cur) => {
                    self.prev = Some(cur);
                    self.cur = Some((v, t));
                    self.drain(handle);
                }
            }
        }
    }

    fn drain(&mut self, handle: &FilterHandle<T>) {
        let Some((cur_v, cur_t)) = self.cur else {
            return;
        };
        let Some((prev_v, prev_t)) = self.prev else {
            return;
        };
        while let Some(next_out) = self.next_out {
            if next_out > cur_t {
                break;
            }
            debug_assert_aligned!(next_out, self.period_ns);
            let out_v = match self.method {
                AlignMethod::Nearest => {
                    let to_prev = (next_out as i64 - prev_t as i64).abs();
                    let to_cur = (cur_t as i64 - next_out as i64).abs();
                    if to_prev <= to_cur {
                        prev_v
                    } else {
                        cur_v
                    }
                }
                AlignMethod::Linear => {
                    if cur_t == prev_t {
                        cur_v
                    } else {
                        let frac = (next_out - prev_t) as f64 / (cur_t - prev_t) as f64;
                        self.metrics
                            .samples_interpolated
                            .fetch_add(1, Ordering::Relaxed);
                        T::lerp(prev_v, cur_v, frac)
                    }
                }
            };
            self.emit_sample(out_v, next_out, handle);
            self.next_out = Some(next_out + self.period_ns);
        }
    }

    fn emit_sample(&mut self, value: T, t_ns: u64, handle: &FilterHandle<T>) {
        if self.out.count == 0 {
            self.out.t_ns = t_ns;
        }
        let idx = self.out.count;
        self.out.data_mut()[idx] = value;
        self.out.count += 1;
        self.out.period_ns = self.period_ns;
        self.metrics.samples_emitted.fetch_add(1, Ordering::Relaxed);
        if self.out.count == self.out.capacity() {
            self.flush(handle);
        }
    }

    fn flush(&mut self, handle: &FilterHandle<T>) {
        if self.out.count == 0 {
            return;
        }
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        for sink in &handle.sinks {
            let slot = sink.get_head();
            slot.count = self.out.count;
            slot.t_ns = self.out.t_ns;
            slot.period_ns = self.out.period_ns;
            slot.batch_id = batch_id;
            slot.ec = Ec::Ok;
            slot.data_mut()[..self.out.count].copy_from_slice(self.out.samples());
            if sink.submit(handle.timeout).is_err() {
                tracing::debug!(filter = %handle.name, "sink stopped while aligner was writing");
            }
        }
        self.out.count = 0;
    }
}

impl<T: Sample> FilterWorker<T> for SampleAligner<T> {
    fn run(&mut self, handle: &FilterHandle<T>) -> Result<(), WorkerError> {
        let input = handle
            .inputs
            .first()
            .expect("SampleAligner requires exactly one input");
        loop {
            if !handle.is_running() {
                break;
            }
            match input.get_tail(handle.timeout) {
                Err(BufferError::Timeout) => continue,
                Err(BufferError::Stopped) => break,
                Ok(batch) => {
                    if batch.is_complete() {
                        input.del_tail();
                        break;
                    }
                    if batch.period_ns == 0 {
                        input.del_tail();
                        return Err(WorkerError::new(WorkerErrorKind::InvalidPeriod));
                    }
                    self.ingest(batch, handle);
                    input.del_tail();
                }
            }
        }
        self.flush(handle);
        handle.forward_complete(self.next_batch_id, self.period_ns.max(1));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferConfig, FilterConfig, OverflowPolicy};
    use crate::sample::DType;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn aligner_config(method: AlignMethod, alignment: AlignGrid) -> AlignerConfig {
        let buff = BufferConfig::new(DType::F32, 6, 4, OverflowPolicy::Block);
        let mut cfg = AlignerConfig::new(FilterConfig::new("aligner", buff));
        cfg.method = method;
        cfg.alignment = alignment;
        cfg
    }

    fn handle_with_sink(sink: Arc<crate::buffer::BatchBuffer<f32>>) -> FilterHandle<f32> {
        FilterHandle {
            name: "aligner".to_string(),
            inputs: Vec::new(),
            sinks: vec![sink],
            running: Arc::new(AtomicBool::new(true)),
            timeout: Duration::from_millis(5),
        }
    }

    #[test]
    fn zero_phase_nearest_is_identity() {
        let cfg = aligner_config(AlignMethod::Nearest, AlignGrid::Nearest);
        let (mut worker, metrics) = SampleAligner::<f32>::new(&cfg);
        let sink = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        sink.start();
        let handle = handle_with_sink(Arc::clone(&sink));

        let mut batch = Batch::<f32>::with_capacity(64);
        batch.t_ns = 0;
        batch.period_ns = 1_000_000;
        batch.count = 4;
        batch.data_mut()[..4].copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        worker.ingest(&batch, &handle);

        assert_eq!(metrics.snapshot().max_phase_correction_ns, 0);
    }

    #[test]
    fn linear_interpolation_stays_within_bounds() {
        let cfg = aligner_config(AlignMethod::Linear, AlignGrid::Nearest);
        let (mut worker, _metrics) = SampleAligner::<f32>::new(&cfg);
        let sink = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        sink.start();
        let handle = handle_with_sink(Arc::clone(&sink));

        let mut batch = Batch::<f32>::with_capacity(64);
        batch.t_ns = 345_000;
        batch.period_ns = 1_000_000;
        batch.count = 4;
        batch.data_mut()[..4].copy_from_slice(&[10.0, 20.0, 30.0, 40.0]);
        worker.ingest(&batch, &handle);
        worker.flush(&handle);

        let out = sink.get_tail(Duration::from_millis(5)).unwrap();
        assert_eq!(out.t_ns % out.period_ns, 0);
        for &v in out.samples() {
            assert!((10.0..=40.0).contains(&v));
        }
    }

    #[test]
    fn boundary_drop_emits_nothing_before_a_real_window_and_never_extrapolates() {
        // period_ns=1_000_000, alignment=Backward, boundary=Drop, sample0
        // v=10@t=345_000, sample1 v=20@t=1_345_000: the pre-window grid point
        // at t_ns=0 must be dropped, not extrapolated to a value outside
        // [10, 20].
        let mut cfg = aligner_config(AlignMethod::Linear, AlignGrid::Backward);
        cfg.boundary = Boundary::Drop;
        let (mut worker, _metrics) = SampleAligner::<f32>::new(&cfg);
        let sink = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        sink.start();
        let handle = handle_with_sink(Arc::clone(&sink));

        let mut batch = Batch::<f32>::with_capacity(64);
        batch.t_ns = 345_000;
        batch.period_ns = 1_000_000;
        batch.count = 2;
        batch.data_mut()[..2].copy_from_slice(&[10.0, 20.0]);
        worker.ingest(&batch, &handle);
        worker.flush(&handle);

        let out = sink.get_tail(Duration::from_millis(5)).unwrap();
        assert_eq!(out.t_ns, 1_000_000, "t_ns=0 must be dropped, not emitted");
        for &v in out.samples() {
            assert!(
                (10.0..=20.0).contains(&v),
                "value {v} escaped the [prev, cur] bound"
            );
        }
    }

    #[test]
    fn boundary_drop_emits_nothing_when_only_one_sample_seen() {
        let mut cfg = aligner_config(AlignMethod::Nearest, AlignGrid::Backward);
        cfg.boundary = Boundary::Drop;
        let (mut worker, _metrics) = SampleAligner::<f32>::new(&cfg);
        let sink = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        sink.start();
        let handle = handle_with_sink(Arc::clone(&sink));

        let mut batch = Batch::<f32>::with_capacity(64);
        batch.t_ns = 345_000;
        batch.period_ns = 1_000_000;
        batch.count = 1;
        batch.data_mut()[0] = 10.0;
        worker.ingest(&batch, &handle);
        worker.flush(&handle);

        assert_eq!(sink.get_tail(Duration::from_millis(5)).unwrap_err(), BufferError::Timeout);
    }
}
