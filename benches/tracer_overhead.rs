//! Tracing overhead benchmark
//!
//! Compares the instrumented demos run:
//!
//! 1. without any installed hook (probes only cost a thread-local lookup)
//! 2. under an `ExecutionTracer` recording the events in memory
//! 3. under an `ExecutionTracer` rendering a sequence or component diagram
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench tracer_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use doctrace::demos::{fibonacci, math};
use doctrace::export::tracing_session;
use doctrace::filter::{presets, trace_all};
use doctrace::plantuml::{ComponentAggregator, SequenceRenderer};
use doctrace::sink::RecordingSink;
use doctrace::tracer::ExecutionTracer;

/// Benchmark: instrumented recursion without tracer
fn bench_untraced_probes(c: &mut Criterion) {
    c.bench_function("untraced_fibonacci_15", |b| {
        b.iter(|| black_box(fibonacci::fibonacci(black_box(15))));
    });
}

/// Benchmark: event recording for growing call trees
fn bench_recording_tracer(c: &mut Criterion) {
    let mut group = c.benchmark_group("recording_tracer_fibonacci");

    for value in [5u64, 10, 15] {
        group.bench_with_input(BenchmarkId::from_parameter(value), &value, |b, &value| {
            b.iter(|| {
                let tracer = ExecutionTracer::new(RecordingSink::new(), trace_all());
                black_box(tracer.runfunc(|| fibonacci::fibonacci(value)));
            });
        });
    }

    group.finish();
}

/// Benchmark: filtering cost, with the depth preset muting most of the tree
fn bench_filtered_tracer(c: &mut Criterion) {
    c.bench_function("depth_filtered_fibonacci_15", |b| {
        b.iter(|| {
            let filter = doctrace::filter::call_filter_factory(Some(vec![
                presets::exclude_depth_below_5(),
            ]));
            let tracer = ExecutionTracer::new(RecordingSink::new(), filter);
            black_box(tracer.runfunc(|| fibonacci::fibonacci(15)));
        });
    });
}

/// Benchmark: full sessions rendering PlantUML into memory
fn bench_diagram_sessions(c: &mut Criterion) {
    let mut group = c.benchmark_group("diagram_session_factorial_checker");

    group.bench_function("sequence", |b| {
        b.iter(|| {
            let run = tracing_session(
                SequenceRenderer::new(Vec::new()),
                "doctrace.demos.math",
                "factorial_with_checker",
                trace_all(),
                || math::factorial_with_checker("x"),
            );
            black_box(run.map(|run| run.output.into_inner().len()).ok());
        });
    });

    group.bench_function("component", |b| {
        b.iter(|| {
            let run = tracing_session(
                ComponentAggregator::new(Vec::new()),
                "doctrace.demos.math",
                "factorial_with_checker",
                trace_all(),
                || math::factorial_with_checker("12"),
            );
            black_box(run.map(|run| run.output.into_inner().len()).ok());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_untraced_probes,
    bench_recording_tracer,
    bench_filtered_tracer,
    bench_diagram_sessions
);
criterion_main!(benches);
