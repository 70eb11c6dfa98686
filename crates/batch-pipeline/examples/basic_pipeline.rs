//! Minimal end-to-end pipeline: a hand-rolled SOURCE generates a ramp, a
//! `SampleAligner` re-grids it, and a hand-rolled SINK prints what arrives.
//!
//! Neither the source nor the sink is part of the library surface — per the
//! design, leaf filters are external collaborators the core only specifies
//! an interface for. This is demonstration code, not a benchmark.

use batch_pipeline::{
    AlignGrid, AlignMethod, AlignerConfig, BatchBuffer, BufferConfig, DType, Filter,
    FilterConfig, FilterHandle, FilterWorker, OverflowPolicy, SampleAligner, WorkerError,
};
use std::sync::Arc;
use std::time::Duration;

/// Emits `total` samples of a ramp at `period_ns`, phased 345us off the grid,
/// then forwards `COMPLETE`.
struct RampSource {
    period_ns: u64,
    phase_ns: u64,
    total: u64,
    emitted: u64,
    next_batch_id: u64,
}

impl FilterWorker<f32> for RampSource {
    fn run(&mut self, handle: &FilterHandle<f32>) -> Result<(), WorkerError> {
        while self.emitted < self.total && handle.is_running() {
            let count = 16.min((self.total - self.emitted) as usize);
            let t_ns = self.phase_ns + self.emitted * self.period_ns;
            for sink in &handle.sinks {
                let slot = sink.get_head();
                slot.t_ns = t_ns;
                slot.period_ns = self.period_ns;
                slot.batch_id = self.next_batch_id;
                slot.count = count;
                for (i, s) in slot.data_mut().iter_mut().enumerate().take(count) {
                    *s = (self.emitted as usize + i) as f32;
                }
                let _ = sink.submit(handle.timeout);
            }
            self.emitted += count as u64;
            self.next_batch_id += 1;
        }
        handle.forward_complete(self.next_batch_id, self.period_ns);
        Ok(())
    }
}

/// Prints each arriving batch's timestamp and first sample, then exits on `COMPLETE`.
struct PrintSink;

impl FilterWorker<f32> for PrintSink {
    fn run(&mut self, handle: &FilterHandle<f32>) -> Result<(), WorkerError> {
        let input = &handle.inputs[0];
        loop {
            if !handle.is_running() {
                return Ok(());
            }
            match input.get_tail(handle.timeout) {
                Err(batch_pipeline::BufferError::Timeout) => continue,
                Err(batch_pipeline::BufferError::Stopped) => return Ok(()),
                Ok(batch) => {
                    if batch.is_complete() {
                        println!("sink: received COMPLETE, exiting");
                        input.del_tail();
                        return Ok(());
                    }
                    println!(
                        "sink: batch {} t_ns={} first={:?}",
                        batch.batch_id,
                        batch.t_ns,
                        batch.samples().first()
                    );
                    input.del_tail();
                }
            }
        }
    }
}

fn main() {
    let buff = BufferConfig::new(DType::F32, 6, 4, OverflowPolicy::Block);

    let source_cfg = FilterConfig::new("ramp_source", buff);
    let mut source = Filter::init(
        source_cfg,
        0,
        Box::new(RampSource {
            period_ns: 1_000_000,
            phase_ns: 345_000,
            total: 256,
            emitted: 0,
            next_batch_id: 0,
        }),
    )
    .unwrap();

    let mut aligner_cfg = AlignerConfig::new(FilterConfig::new("aligner", buff));
    aligner_cfg.method = AlignMethod::Linear;
    aligner_cfg.alignment = AlignGrid::Nearest;
    let (worker, metrics) = SampleAligner::<f32>::new(&aligner_cfg);
    let mut aligner = Filter::init(aligner_cfg.filter.clone(), 1, Box::new(worker)).unwrap();

    let sink_cfg = FilterConfig::terminal("print_sink", buff);
    let mut sink = Filter::init(sink_cfg, 1, Box::new(PrintSink)).unwrap();

    let aligner_input = Arc::clone(&aligner.inputs()[0]);
    let sink_input: Arc<BatchBuffer<f32>> = Arc::clone(&sink.inputs()[0]);
    sink_input.start();
    aligner_input.start();

    source.sink_connect(aligner_input).unwrap();
    aligner.sink_connect(sink_input).unwrap();

    sink.start().unwrap();
    aligner.start().unwrap();
    source.start().unwrap();

    std::thread::sleep(Duration::from_millis(200));

    source.stop();
    aligner.stop();
    sink.stop();

    let snap = metrics.snapshot();
    println!(
        "aligner: emitted={} interpolated={} max_phase_correction_ns={}",
        snap.samples_emitted, snap.samples_interpolated, snap.max_phase_correction_ns
    );
}
