//! Zero-order-hold multi-input resampler: merges N independently timed input
//! streams into one interleaved output stream at a configured output rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::batch::{Batch, Ec};
use crate::config::ZohConfig;
use crate::error::{BufferError, WorkerError, WorkerErrorKind};
use crate::filter::{FilterHandle, FilterWorker};
use crate::sample::Sample;

/// Per-input counters, atomic so `ZohMetrics::snapshot` can be polled from
/// outside the worker thread.
pub struct PerInputMetrics {
    samples_processed: AtomicU64,
    underrun_count: AtomicU64,
    discontinuity_count: AtomicU64,
    avg_input_rate_bits: AtomicU64,
}

impl PerInputMetrics {
    fn new() -> Self {
        Self {
            samples_processed: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            discontinuity_count: AtomicU64::new(0),
            avg_input_rate_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn set_rate_hz(&self, hz: f64) {
        self.avg_input_rate_bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> PerInputSnapshot {
        PerInputSnapshot {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            discontinuity_count: self.discontinuity_count.load(Ordering::Relaxed),
            avg_input_rate_hz: f64::from_bits(self.avg_input_rate_bits.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerInputSnapshot {
    pub samples_processed: u64,
    pub underrun_count: u64,
    pub discontinuity_count: u64,
    pub avg_input_rate_hz: f64,
}

/// Shared metrics handle: one `PerInputMetrics` per configured input.
pub struct ZohMetrics(Vec<PerInputMetrics>);

impl ZohMetrics {
    fn new(n_inputs: usize) -> Self {
        Self((0..n_inputs).map(|_| PerInputMetrics::new()).collect())
    }

    pub fn snapshot(&self) -> Vec<PerInputSnapshot> {
        self.0.iter().map(PerInputMetrics::snapshot).collect()
    }
}

struct InputState<T: Sample> {
    queue: VecDeque<(T, u64)>,
    last_value: T,
    last_t_ns: u64,
    has_data: bool,
    last_batch_id: Option<u64>,
    avg_spacing_ns: f64,
    has_avg: bool,
    stopped: bool,
    complete: bool,
}

impl<T: Sample> InputState<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_value: T::default(),
            last_t_ns: 0,
            has_data: false,
            last_batch_id: None,
            avg_spacing_ns: 0.0,
            has_avg: false,
            stopped: false,
            complete: false,
        }
    }

    fn done(&self) -> bool {
        self.stopped || self.complete
    }

    /// Pulls batches from `input` as needed and consumes every queued sample
    /// with `t ≤ next_out`, leaving `last_value`/`last_t_ns` at the most
    /// recent one. Returns once the input is exhausted for this tick, has no
    /// more data available within `handle.timeout`, or has gone away.
    fn advance(
        &mut self,
        input: &crate::buffer::BatchBuffer<T>,
        next_out: u64,
        handle: &FilterHandle<T>,
        metrics: &PerInputMetrics,
    ) -> Result<(), WorkerError> {
        loop {
            if let Some(&(_, t)) = self.queue.front() {
                if t <= next_out {
                    let (v, t) = self.queue.pop_front().unwrap();
                    if self.has_data {
                        let spacing = (t.saturating_sub(self.last_t_ns)) as f64;
                        if spacing > 0.0 {
                            self.avg_spacing_ns = if self.has_avg {
                                0.9 * self.avg_spacing_ns + 0.1 * spacing
                            } else {
                                spacing
                            };
                            self.has_avg = true;
                            metrics.set_rate_hz(1.0e9 / self.avg_spacing_ns);
                        }
                    }
                    self.last_value = v;
                    self.last_t_ns = t;
                    self.has_data = true;
                    metrics.samples_processed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                return Ok(());
            }
            if self.done() {
                return Ok(());
            }
            match input.get_tail(handle.timeout) {
                Err(BufferError::Timeout) => return Ok(()),
                Err(BufferError::Stopped) => {
                    self.stopped = true;
                    return Ok(());
                }
                Ok(batch) => {
                    if batch.is_complete() {
                        self.complete = true;
                        input.del_tail();
                        return Ok(());
                    }
                    if batch.period_ns == 0 {
                        input.del_tail();
                        return Err(WorkerError::new(WorkerErrorKind::InvalidPeriod));
                    }
                    if let Some(last_id) = self.last_batch_id {
                        if batch.batch_id != last_id + 1 {
                            metrics.discontinuity_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    self.last_batch_id = Some(batch.batch_id);
                    for i in 0..batch.count {
                        let t = batch.t_ns + i as u64 * batch.period_ns;
                        self.queue.push_back((batch.samples()[i], t));
                    }
                    input.del_tail();
                }
            }
        }
    }
}

fn align_forward(t_ns: u64, period_ns: u64) -> u64 {
    let floor = (t_ns / period_ns) * period_ns;
    if floor == t_ns {
        floor
    } else {
        floor + period_ns
    }
}

/// Multi-input `FilterWorker` emitting one interleaved row per output tick.
pub struct ZohResampler<T: Sample> {
    output_period_ns: u64,
    drop_on_underrun: bool,
    inputs: Vec<InputState<T>>,
    out: Batch<T>,
    next_batch_id: u64,
    metrics: Arc<ZohMetrics>,
}

impl<T: Sample> ZohResampler<T> {
    pub fn new(config: &ZohConfig) -> (Self, Arc<ZohMetrics>) {
        let metrics = Arc::new(ZohMetrics::new(config.n_inputs));
        let out = Batch::with_capacity(config.filter.buff_config.batch_capacity());
        let worker = Self {
            output_period_ns: config.output_period_ns,
            drop_on_underrun: config.drop_on_underrun,
            inputs: (0..config.n_inputs).map(|_| InputState::new()).collect(),
            out,
            next_batch_id: 0,
            metrics: Arc::clone(&metrics),
        };
        (worker, metrics)
    }

    fn emit_row(&mut self, row: &[T], t_ns: u64, handle: &FilterHandle<T>) {
        if self.out.count + row.len() > self.out.capacity() {
            self.flush(handle);
        }
        if self.out.count == 0 {
            self.out.t_ns = t_ns;
        }
        let base = self.out.count;
        self.out.data_mut()[base..base + row.len()].copy_from_slice(row);
        self.out.count += row.len();
        self.out.period_ns = self.output_period_ns;
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
                tracing::debug!(filter = %handle.name, "sink stopped while ZOH was writing");
            }
        }
        self.out.count = 0;
    }
}

impl<T: Sample> FilterWorker<T> for ZohResampler<T> {
    fn run(&mut self, handle: &FilterHandle<T>) -> Result<(), WorkerError> {
        // Phase 1: peek each input's first sample to establish the starting grid.
        let mut firsts = Vec::with_capacity(handle.inputs.len());
        for (idx, input) in handle.inputs.iter().enumerate() {
            loop {
                if !handle.is_running() {
                    return Ok(());
                }
                if let Some(&(_, t)) = self.inputs[idx].queue.front() {
                    firsts.push(t);
                    break;
                }
                if self.inputs[idx].done() {
                    firsts.push(0);
                    break;
                }
                match input.get_tail(handle.timeout) {
                    Err(BufferError::Timeout) => continue,
                    Err(BufferError::Stopped) => {
                        self.inputs[idx].stopped = true;
                        firsts.push(0);
                        break;
                    }
                    Ok(batch) => {
                        if batch.is_complete() {
                            self.inputs[idx].complete = true;
                            input.del_tail();
                            firsts.push(0);
                            break;
                        }
                        if batch.period_ns == 0 {
                            input.del_tail();
                            return Err(WorkerError::new(WorkerErrorKind::InvalidPeriod));
                        }
                        self.inputs[idx].last_batch_id = Some(batch.batch_id);
                        for i in 0..batch.count {
                            let t = batch.t_ns + i as u64 * batch.period_ns;
                            self.inputs[idx]
                                .queue
                                .push_back((batch.samples()[i], t));
                        }
                        input.del_tail();
                    }
                }
            }
        }
        let max_first = firsts.into_iter().max().unwrap_or(0);
        let mut next_out = align_forward(max_first, self.output_period_ns);

        let mut row = vec![T::default(); handle.inputs.len()];
        loop {
            if !handle.is_running() {
                break;
            }
            if self.inputs.iter().all(InputState::done) {
                break;
            }
            let mut skip_tick = false;
            for (idx, input) in handle.inputs.iter().enumerate() {
                self.inputs[idx].advance(input, next_out, handle, &self.metrics.0[idx])?;
                if !self.inputs[idx].has_data {
                    self.metrics.0[idx].underrun_count.fetch_add(1, Ordering::Relaxed);
                    if self.drop_on_underrun {
                        skip_tick = true;
                    }
                }
            }
            if !skip_tick {
                for (idx, slot) in row.iter_mut().enumerate() {
                    *slot = self.inputs[idx].last_value;
                }
                self.emit_row(&row, next_out, handle);
            }
            next_out += self.output_period_ns;
        }
        self.flush(handle);
        handle.forward_complete(self.next_batch_id, self.output_period_ns);
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

    fn config(n_inputs: usize, output_period_ns: u64) -> ZohConfig {
        let buff = BufferConfig::new(DType::F32, 6, 4, OverflowPolicy::Block);
        ZohConfig::new(FilterConfig::new("zoh", buff), output_period_ns, n_inputs)
    }

    #[test]
    fn two_inputs_interleave_rows() {
        let cfg = config(2, 2_000_000);
        let (mut worker, _metrics) = ZohResampler::<f32>::new(&cfg);

        let a = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        let b = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        a.start();
        b.start();

        {
            let slot = a.get_head();
            slot.t_ns = 0;
            slot.period_ns = 1_000_000;
            slot.count = 32;
            slot.batch_id = 0;
            for (i, s) in slot.data_mut().iter_mut().enumerate().take(32) {
                *s = (i + 1) as f32;
            }
            a.submit(Duration::from_millis(5)).unwrap();
            let slot = a.get_head();
            slot.reset_as_complete(1, 1_000_000);
            a.submit_complete(Duration::from_millis(5)).unwrap();
        }
        {
            let slot = b.get_head();
            slot.t_ns = 0;
            slot.period_ns = 1_250_000;
            slot.count = 32;
            slot.batch_id = 0;
            for (i, s) in slot.data_mut().iter_mut().enumerate().take(32) {
                *s = (100 + i) as f32;
            }
            b.submit(Duration::from_millis(5)).unwrap();
            let slot = b.get_head();
            slot.reset_as_complete(1, 1_250_000);
            b.submit_complete(Duration::from_millis(5)).unwrap();
        }

        let sink = Arc::new(crate::buffer::BatchBuffer::new(cfg.filter.buff_config));
        sink.start();
        let handle = FilterHandle {
            name: "zoh".to_string(),
            inputs: vec![a, b],
            sinks: vec![Arc::clone(&sink)],
            running: Arc::new(AtomicBool::new(true)),
            timeout: Duration::from_millis(5),
        };

        worker.run(&handle).unwrap();

        let out = sink.get_tail(Duration::from_millis(5)).unwrap();
        assert_eq!(out.period_ns, 2_000_000);
        assert_eq!(out.count % 2, 0);
        for pair in out.samples().chunks(2) {
            assert!((1.0..=32.0).contains(&pair[0]));
            assert!((100.0..=139.0).contains(&pair[1]));
        }
    }
}
