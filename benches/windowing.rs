//! Benchmarks for the scheduling hot paths: window arithmetic run per
//! configuration per tick, and the atomic enqueue gate.

use std::hint::black_box;

use chrono::Duration;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use vigil::adapters::sqlite::{create_migrated_test_pool, SqliteAnalysisTaskRepository};
use vigil::domain::models::{scope_keys, AnalysisTask, AnalysisType, BaselineWindow};
use vigil::domain::ports::{minute_to_datetime, AnalysisTaskRepository};
use vigil::services::backoff::{is_past_backoff, next_backoff_count};
use vigil::services::windowing::{
    is_collection_due, l2_clustering_minute, log_ml_analysis_end_minute, metric_collection_window,
    time_series_analysis_start, L2Inputs, LogMlInputs,
};

const NOW: i64 = 29_000_010;

fn bench_collection_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing/collection_due");
    let now = minute_to_datetime(NOW);

    for elapsed in [5_i64, 25, 45, 240] {
        let last = now - Duration::minutes(elapsed);
        group.bench_with_input(BenchmarkId::from_parameter(elapsed), &last, |b, last| {
            b.iter(|| is_collection_due(black_box(*last), black_box(now)));
        });
    }

    group.finish();
}

fn bench_window_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowing/window_selection");
    let baseline = BaselineWindow::new(NOW - 1000, NOW - 970);

    group.bench_function("metric_collection_window", |b| {
        b.iter(|| metric_collection_window(black_box(NOW), black_box(Some(NOW - 300))));
    });

    group.bench_function("time_series_restart", |b| {
        b.iter(|| time_series_analysis_start(black_box(NOW - 2), black_box(Some(NOW - 200)), black_box(NOW)));
    });

    group.bench_function("l2_clustering_minute", |b| {
        let inputs = L2Inputs {
            min_h1: Some(NOW - 400),
            max_h1: Some(NOW - 5),
            last_h2: Some(NOW - 390),
            last_hf: None,
        };
        b.iter(|| l2_clustering_minute(black_box(inputs), baseline, black_box(NOW)));
    });

    group.bench_function("log_ml_end_minute", |b| {
        let inputs = LogMlInputs {
            min_h2: Some(NOW - 400),
            max_h2: Some(NOW - 15),
            last_analysis: Some(NOW - 390),
        };
        b.iter(|| log_ml_analysis_end_minute(black_box(inputs), baseline, black_box(NOW)));
    });

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff");
    let now = minute_to_datetime(NOW);

    group.bench_function("walk_table", |b| {
        b.iter(|| {
            let mut count = 0;
            for _ in 0..12 {
                count = next_backoff_count(black_box(count));
            }
            count
        });
    });

    group.bench_function("is_past_backoff", |b| {
        let updated = now - Duration::minutes(20);
        b.iter(|| is_past_backoff(black_box(updated), black_box(5), black_box(now)));
    });

    group.finish();
}

fn bench_enqueue_gate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = rt.block_on(async {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAnalysisTaskRepository::new(pool)
    });

    // Seed a queue so the gate runs against realistic history.
    rt.block_on(async {
        for i in 0..500_i64 {
            let task = AnalysisTask::new(
                "acct",
                scope_keys::time_series(&format!("cfg-{}", i % 50)),
                AnalysisType::TimeSeries,
                NOW - i * 15,
            );
            repo.enqueue_if_absent(&task).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("task_queue/enqueue_if_absent");
    group.bench_function("duplicate_window", |b| {
        b.to_async(&rt).iter(|| async {
            let task = AnalysisTask::new("acct", scope_keys::time_series("cfg-0"), AnalysisType::TimeSeries, NOW);
            repo.enqueue_if_absent(black_box(&task)).await.unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_collection_grid,
    bench_window_selection,
    bench_backoff,
    bench_enqueue_gate
);
criterion_main!(benches);
