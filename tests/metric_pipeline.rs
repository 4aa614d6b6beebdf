use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forge::clock::SystemClock;
use forge::metrics::types::{Aggregation, MetricKind, MetricSample, SeriesFilter, Tags};
use forge::metrics::{MetricPipeline, MetricPipelineConfig};
use forge::store::memory::InMemoryMetricStore;

fn pipeline(capacity: usize) -> Arc<MetricPipeline> {
    MetricPipeline::new(
        Arc::new(InMemoryMetricStore::new()),
        Arc::new(SystemClock),
        MetricPipelineConfig {
            buffer_capacity: capacity,
            flush_interval: Duration::from_secs(3600),
            retention_sweep_interval: Duration::from_secs(3600),
        },
    )
}

fn sample(name: &str, value: f64) -> MetricSample {
    MetricSample { name: name.into(), kind: MetricKind::Gauge, value, tags: Tags::new(), timestamp: Utc::now() }
}

#[tokio::test]
async fn ingested_samples_are_queryable_after_a_capacity_flush() {
    let pipeline = pipeline(2);
    pipeline.record(sample("cpu", 1.0)).unwrap();
    pipeline.record(sample("cpu", 2.0)).unwrap(); // fills the buffer, wakes the flusher
    tokio::time::sleep(Duration::from_millis(20)).await;

    let filter = SeriesFilter { name: "cpu".into(), tags: Tags::new() };
    let now = Utc::now();
    let results = pipeline.query(&filter, now - chrono::Duration::minutes(1), now + chrono::Duration::minutes(1)).await.unwrap();
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn batch_record_rejects_on_first_invalid_sample() {
    let pipeline = pipeline(10);
    let mut batch = vec![sample("cpu", 1.0)];
    batch.push(MetricSample { name: String::new(), ..sample("mem", 2.0) });
    let err = pipeline.record_batch(batch).unwrap_err();
    assert!(matches!(err, forge::metrics::MetricError::EmptyName));
}

#[tokio::test]
async fn query_with_aggregation_rejects_unknown_resolution_strings() {
    let pipeline = pipeline(10);
    let filter = SeriesFilter { name: "cpu".into(), tags: Tags::new() };
    let err = pipeline
        .query_with_aggregation(&filter, Utc::now(), Utc::now(), "fortnight", Aggregation::Avg)
        .await
        .unwrap_err();
    assert!(matches!(err, forge::metrics::MetricError::InvalidResolution(_)));
}

#[tokio::test]
async fn query_with_aggregation_computes_buckets_from_raw_samples_on_the_fly() {
    let pipeline = pipeline(10);
    let now = Utc::now();
    for (i, value) in [10.0, 20.0, 30.0].into_iter().enumerate() {
        pipeline
            .record(MetricSample { timestamp: now - chrono::Duration::seconds(30 - i as i64 * 10), ..sample("cpu", value) })
            .unwrap();
    }

    let filter = SeriesFilter { name: "cpu".into(), tags: Tags::new() };
    let buckets = pipeline
        .query_with_aggregation(&filter, now - chrono::Duration::minutes(1), now + chrono::Duration::minutes(1), "1m", Aggregation::Avg)
        .await
        .unwrap();

    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].avg, 20.0);
    assert_eq!(buckets[0].count, 3);
}

#[tokio::test]
async fn downsampling_produces_one_bucket_per_window() {
    let pipeline = pipeline(100);
    let now = Utc::now();
    for i in 0..5 {
        pipeline.record(MetricSample { timestamp: now - chrono::Duration::seconds(i), ..sample("cpu", i as f64) }).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    let filter = SeriesFilter { name: "cpu".into(), tags: Tags::new() };
    let produced = pipeline.downsample_series(&filter, now + chrono::Duration::seconds(1), "1m").await.unwrap();
    assert_eq!(produced, 1);
}
