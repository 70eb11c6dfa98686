use batch_pipeline::{BatchBuffer, BufferConfig, DType, OverflowPolicy};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const BATCHES_PER_RUN: u64 = 200_000;
const SUBMIT_TIMEOUT: Duration = Duration::from_millis(50);

fn bench_spsc_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("batchbuffer_block");
    group.throughput(Throughput::Elements(BATCHES_PER_RUN));

    group.bench_function("ring16_batch64", |b| {
        b.iter(|| {
            let cfg = BufferConfig::new(DType::F32, 6, 4, OverflowPolicy::Block);
            let buf = Arc::new(BatchBuffer::<f32>::new(cfg));
            buf.start();

            let producer_buf = Arc::clone(&buf);
            let producer = thread::spawn(move || {
                for i in 0..BATCHES_PER_RUN {
                    let slot = producer_buf.get_head();
                    slot.batch_id = i;
                    slot.count = slot.capacity();
                    producer_buf.submit(SUBMIT_TIMEOUT).unwrap();
                }
            });

            let mut consumed = 0u64;
            while consumed < BATCHES_PER_RUN {
                if let Ok(batch) = buf.get_tail(SUBMIT_TIMEOUT) {
                    black_box(batch.batch_id);
                    buf.del_tail();
                    consumed += 1;
                }
            }

            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_overflow_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("batchbuffer_overflow");

    for policy in [OverflowPolicy::DropHead, OverflowPolicy::DropTail] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{policy:?}")),
            &policy,
            |b, &policy| {
                b.iter(|| {
                    let cfg = BufferConfig::new(DType::F32, 4, 3, policy);
                    let buf = BatchBuffer::<f32>::new(cfg);
                    buf.start();
                    // Deliberately oversubscribe a small ring with no consumer
                    // draining it, to measure the overflow path's cost.
                    for i in 0..10_000u64 {
                        let slot = buf.get_head();
                        slot.batch_id = i;
                        slot.count = 1;
                        buf.submit(SUBMIT_TIMEOUT).unwrap();
                        black_box(buf.metrics());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("batchbuffer_batch_sizes");

    for batch_expo in [4u8, 8, 10] {
        let capacity = 1usize << batch_expo;
        group.throughput(Throughput::Elements(BATCHES_PER_RUN));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("cap_{capacity}")),
            &batch_expo,
            |b, &expo| {
                b.iter(|| {
                    let cfg = BufferConfig::new(DType::F32, expo, 4, OverflowPolicy::Block);
                    let buf = Arc::new(BatchBuffer::<f32>::new(cfg));
                    buf.start();

                    let producer_buf = Arc::clone(&buf);
                    let producer = thread::spawn(move || {
                        for i in 0..BATCHES_PER_RUN {
                            let slot = producer_buf.get_head();
                            slot.batch_id = i;
                            slot.count = slot.capacity();
                            producer_buf.submit(SUBMIT_TIMEOUT).unwrap();
                        }
                    });

                    let mut consumed = 0u64;
                    while consumed < BATCHES_PER_RUN {
                        if let Ok(batch) = buf.get_tail(SUBMIT_TIMEOUT) {
                            black_box(batch.samples());
                            buf.del_tail();
                            consumed += 1;
                        }
                    }
                    producer.join().unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_spsc_block,
    bench_overflow_policies,
    bench_batch_sizes
);
criterion_main!(benches);
