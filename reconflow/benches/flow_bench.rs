//! Benchmarks for flow compilation and execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reconflow::context::Context;
use reconflow::flow::{Graph, RunOptions, Task, TaskFn, TaskHandle, TaskHandles};

fn wide_graph(width: usize) -> Graph {
    let mut graph = Graph::new("wide");
    let roots: Vec<TaskHandle> = (0..width)
        .map(|i| graph.add(Task::new(format!("task-{i}"), TaskFn::noop())))
        .collect();
    let roots: TaskHandles = roots.into_iter().collect();
    graph.add(Task::new("join", TaskFn::noop()).with_dependencies(roots));
    graph
}

fn chain_graph(length: usize) -> Graph {
    let mut graph = Graph::new("chain");
    let mut previous = graph.add(Task::new("task-0", TaskFn::noop()));
    for i in 1..length {
        previous = graph.add(Task::new(format!("task-{i}"), TaskFn::noop()).with_dependency(previous));
    }
    graph
}

fn flow_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let mut group = c.benchmark_group("flow_run");
    for size in [10, 100] {
        group.bench_with_input(BenchmarkId::new("wide", size), &size, |b, &size| {
            b.iter(|| {
                let flow = wide_graph(size).compile().expect("valid graph");
                let report = runtime.block_on(flow.run(&Context::new(), RunOptions::new()));
                black_box(report.is_ok())
            });
        });
        group.bench_with_input(BenchmarkId::new("chain", size), &size, |b, &size| {
            b.iter(|| {
                let flow = chain_graph(size).compile().expect("valid graph");
                let report = runtime.block_on(flow.run(&Context::new(), RunOptions::new()));
                black_box(report.is_ok())
            });
        });
    }
    group.finish();

    c.bench_function("compile_wide_1000", |b| {
        b.iter(|| black_box(wide_graph(1000).compile().is_ok()));
    });
}

criterion_group!(benches, flow_benchmark);
criterion_main!(benches);
