//! Benchmarks for the timer wheel.
//!
//! Run with: cargo bench --bench timer_wheel

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use decnet::TimerWheel;
use decnet::timer::{DEFAULT_SLOTS, DEFAULT_TICK};
use std::time::Duration;

/// A wheel holding `n` timers spread over the first minute.
fn populated_wheel(n: u32) -> TimerWheel<u32> {
    let mut wheel = TimerWheel::new(DEFAULT_SLOTS, DEFAULT_TICK);
    for i in 0..n {
        wheel.start(i, Duration::from_millis(100 * u64::from(i % 600 + 1)));
    }
    wheel
}

// ===== TimerWheel Benchmarks =====

fn bench_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_start");

    group.bench_function("in_revolution", |b| {
        let mut wheel = TimerWheel::new(DEFAULT_SLOTS, DEFAULT_TICK);
        let mut token = 0u32;
        b.iter(|| {
            token = token.wrapping_add(1) % 4096;
            wheel.start(black_box(token), Duration::from_secs(15));
        })
    });

    // Longer than one revolution lands in the overflow list
    group.bench_function("overflow", |b| {
        let mut wheel = TimerWheel::new(DEFAULT_SLOTS, DEFAULT_TICK);
        let mut token = 0u32;
        b.iter(|| {
            token = token.wrapping_add(1) % 4096;
            wheel.start(black_box(token), Duration::from_secs(600));
        })
    });

    group.finish();
}

fn bench_restart(c: &mut Criterion) {
    let mut wheel = populated_wheel(1000);
    c.bench_function("timer_restart_1000_armed", |b| {
        b.iter(|| wheel.start(black_box(500), Duration::from_secs(45)))
    });
}

fn bench_cancel(c: &mut Criterion) {
    c.bench_function("timer_cancel_1000_armed", |b| {
        b.iter_batched(
            || populated_wheel(1000),
            |mut wheel| wheel.cancel(black_box(&500)),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_advance");

    for n in [100u32, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("one_minute", n), &n, |b, &n| {
            b.iter_batched(
                || populated_wheel(n),
                |mut wheel| wheel.advance_duration(black_box(Duration::from_secs(60))),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_start, bench_restart, bench_cancel, bench_advance);
criterion_main!(benches);
