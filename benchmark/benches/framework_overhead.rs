// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-iteration bookkeeping overhead of the framework itself.
//!
//! No-op drivers isolate the cost of timing, result recording and state
//! tracking from any container work.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snapbench_benchmark::harness::run_driver;
use snapbench_benchmark::{BenchmarkTestDriver, IterationTimer, LatencyMetrics};

fn bench_noop_driver(c: &mut Criterion) {
    let mut group = c.benchmark_group("framework_noop_driver");

    for iterations in [1u32, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(iterations),
            &iterations,
            |b, &iterations| {
                b.iter(|| {
                    let mut driver = BenchmarkTestDriver::new("noop", iterations, |_| Ok(()))
                        .before(|| Ok(()))
                        .after(|| Ok(()));
                    black_box(run_driver(&mut driver))
                });
            },
        );
    }

    group.finish();
}

fn bench_iteration_timer(c: &mut Criterion) {
    c.bench_function("iteration_timer_reset_stop", |b| {
        b.iter(|| {
            let mut timer = IterationTimer::start();
            timer.reset();
            timer.stop();
            black_box(timer.elapsed())
        });
    });
}

fn bench_latency_summary(c: &mut Criterion) {
    let samples: Vec<u64> = (0..1000u64).map(|i| 100_000_000 + i * 7919 % 10_000).collect();

    c.bench_function("latency_summary_1000", |b| {
        b.iter(|| black_box(LatencyMetrics::from_samples(samples.clone())));
    });
}

criterion_group!(
    benches,
    bench_noop_driver,
    bench_iteration_timer,
    bench_latency_summary
);
criterion_main!(benches);
