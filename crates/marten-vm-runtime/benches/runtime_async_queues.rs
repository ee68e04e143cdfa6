//! Throughput benchmarks for the job queue and the promise/async
//! generator paths layered on it.

use criterion::{Criterion, criterion_group, criterion_main};
use marten_vm_runtime::Marten;
use marten_vm_runtime::core::value::Value;
use std::hint::black_box;

fn bench_job_queue_drain(c: &mut Criterion) {
    c.bench_function("job_queue_enqueue_drain_1000", |b| {
        let marten = Marten::new();
        b.iter(|| {
            for _ in 0..1000 {
                marten.event_loop().queue_microtask(|| Ok(()));
            }
            black_box(marten.run_until_idle())
        });
    });
}

fn bench_promise_chain(c: &mut Criterion) {
    c.bench_function("promise_chain_depth_100", |b| {
        let marten = Marten::new();
        b.iter(|| {
            let mut promise = marten.resolved(Value::number(0.0));
            for _ in 0..100 {
                promise = promise
                    .then_fulfilled(|v| Ok(Value::number(v.as_number().unwrap() + 1.0)));
            }
            marten.run_until_idle();
            black_box(promise.result())
        });
    });
}

fn bench_async_generator_drain(c: &mut Criterion) {
    c.bench_function("async_generator_drain_100", |b| {
        let marten = Marten::new();
        let values: Vec<Value> = (0..100).map(|n| Value::number(f64::from(n))).collect();
        b.iter(|| {
            let generator = marten.async_generator_from_sequence(values.clone());
            let promises: Vec<_> = (0..101)
                .map(|_| generator.next(Value::undefined()))
                .collect();
            marten.run_until_idle();
            black_box(promises.last().map(|p| p.is_settled()))
        });
    });
}

criterion_group!(
    benches,
    bench_job_queue_drain,
    bench_promise_chain,
    bench_async_generator_drain
);
criterion_main!(benches);
