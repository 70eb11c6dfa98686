use batch_pipeline::{BatchBuffer, BufferConfig, DType, Filter, FilterConfig, OverflowPolicy, ZohConfig, ZohResampler};
use std::sync::Arc;
use std::time::Duration;

/// S6 — two inputs at different rates merged at 500Hz; output rows interleave
/// [a, b] with each value bounded by its source's range and timestamps
/// increasing by exactly the output period.
#[test]
fn s6_zoh_two_inputs() {
    let buff = BufferConfig::new(DType::F32, 8, 4, OverflowPolicy::Block);
    let cfg = ZohConfig::new(FilterConfig::new("zoh", buff), 2_000_000, 2);
    let (worker, metrics) = ZohResampler::<f32>::new(&cfg);
    let mut filter = Filter::init(cfg.filter.clone(), 2, Box::new(worker)).unwrap();
    let sink = Arc::new(BatchBuffer::new(buff));
    filter.sink_connect(Arc::clone(&sink)).unwrap();
    sink.start();
    filter.start().unwrap();

    let a = Arc::clone(&filter.inputs()[0]);
    let b = Arc::clone(&filter.inputs()[1]);

    {
        let slot = a.get_head();
        slot.t_ns = 0;
        slot.period_ns = 1_000_000;
        slot.batch_id = 0;
        slot.count = 32;
        for (i, s) in slot.data_mut().iter_mut().enumerate().take(32) {
            *s = (i + 1) as f32;
        }
        a.submit(Duration::from_millis(50)).unwrap();
        let slot = a.get_head();
        slot.reset_as_complete(1, 1_000_000);
        a.submit_complete(Duration::from_millis(50)).unwrap();
    }
    {
        let slot = b.get_head();
        slot.t_ns = 0;
        slot.period_ns = 1_250_000;
        slot.batch_id = 0;
        slot.count = 32;
        for (i, s) in slot.data_mut().iter_mut().enumerate().take(32) {
            *s = (100 + i) as f32;
        }
        b.submit(Duration::from_millis(50)).unwrap();
        let slot = b.get_head();
        slot.reset_as_complete(1, 1_250_000);
        b.submit_complete(Duration::from_millis(50)).unwrap();
    }

    let out = sink.get_tail(Duration::from_millis(500)).unwrap();
    assert_eq!(out.period_ns, 2_000_000);
    assert_eq!(out.count % 2, 0);
    let mut prev_t: Option<u64> = None;
    for (i, pair) in out.samples().chunks(2).enumerate() {
        assert!((1.0..=32.0).contains(&pair[0]));
        assert!((100.0..=139.0).contains(&pair[1]));
        let row_t = out.t_ns + i as u64 * out.period_ns;
        if let Some(p) = prev_t {
            assert_eq!(row_t - p, out.period_ns, "row t_ns must step by output_period_ns");
        }
        prev_t = Some(row_t);
    }
    sink.del_tail();

    filter.stop();
    let snap = metrics.snapshot();
    assert_eq!(snap.len(), 2);
}

#[test]
fn drop_on_underrun_skips_tick_and_counts_it() {
    let buff = BufferConfig::new(DType::F32, 8, 4, OverflowPolicy::Block);
    let mut cfg = ZohConfig::new(FilterConfig::new("zoh", buff), 1_000_000, 2);
    cfg.drop_on_underrun = true;
    let (worker, metrics) = ZohResampler::<f32>::new(&cfg);
    let mut filter = Filter::init(cfg.filter.clone(), 2, Box::new(worker)).unwrap();
    let sink = Arc::new(BatchBuffer::new(buff));
    filter.sink_connect(Arc::clone(&sink)).unwrap();
    sink.start();
    filter.start().unwrap();

    let a = Arc::clone(&filter.inputs()[0]);
    let b = Arc::clone(&filter.inputs()[1]);

    {
        let slot = a.get_head();
        slot.t_ns = 0;
        slot.period_ns = 1_000_000;
        slot.batch_id = 0;
        slot.count = 4;
        slot.data_mut()[..4].copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        a.submit(Duration::from_millis(50)).unwrap();
        let slot = a.get_head();
        slot.reset_as_complete(1, 1_000_000);
        a.submit_complete(Duration::from_millis(50)).unwrap();
    }
    {
        // b never produces data — just completes immediately.
        let slot = b.get_head();
        slot.reset_as_complete(0, 1_000_000);
        b.submit_complete(Duration::from_millis(50)).unwrap();
    }

    // With drop_on_underrun, every tick is skipped since `b` never has data,
    // so the sink only ever sees the forwarded COMPLETE sentinel.
    let out = sink.get_tail(Duration::from_millis(500)).unwrap();
    assert!(out.is_complete());
    sink.del_tail();

    filter.stop();
    let snap = metrics.snapshot();
    assert!(snap[1].underrun_count > 0);
}
