use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use forge::clock::SystemClock;
use forge::metrics::types::{MetricKind, MetricSample, SeriesFilter, Tags};
use forge::metrics::{MetricPipeline, MetricPipelineConfig};
use forge::store::memory::InMemoryMetricStore;
use tokio::runtime::Runtime;

fn sample(i: u64) -> MetricSample {
    MetricSample {
        name: "bench.cpu".into(),
        kind: MetricKind::Gauge,
        value: (i % 100) as f64,
        tags: Tags::new(),
        timestamp: Utc::now(),
    }
}

fn bench_ingest(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let pipeline = |capacity: usize| {
        MetricPipeline::new(
            Arc::new(InMemoryMetricStore::new()),
            Arc::new(SystemClock),
            MetricPipelineConfig {
                buffer_capacity: capacity,
                flush_interval: Duration::from_secs(3600),
                retention_sweep_interval: Duration::from_secs(3600),
            },
        )
    };

    c.bench_function("record_single_sample", |b| {
        let p = pipeline(10_000);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(p.record(sample(i)).unwrap());
        });
    });

    c.bench_function("record_then_query", |b| {
        let p = pipeline(10_000);
        let filter = SeriesFilter { name: "bench.cpu".into(), tags: Tags::new() };
        b.iter(|| {
            p.record(sample(1)).unwrap();
            rt.block_on(async {
                let start = Utc::now() - chrono::Duration::minutes(1);
                let end = Utc::now() + chrono::Duration::minutes(1);
                black_box(p.query(&filter, start, end).await.unwrap());
            });
        });
    });
}

criterion_group!(metric_pipeline_group, bench_ingest);
criterion_main!(metric_pipeline_group);
