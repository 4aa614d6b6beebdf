//! Metric pipeline: ingestion, buffering, downsampling and
//! tiered retention.

pub mod buffer;
pub mod downsample;
pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::store::MetricStore;

use buffer::MetricBuffer;
use types::{AggregatedBucket, Aggregation, MetricKind, MetricSample, MetricStats, Resolution, SeriesFilter, Tags};

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
    #[error("metric name must not be empty")]
    EmptyName,
    #[error("too many tags: {0} (max {max})", max = types::MAX_TAGS)]
    TooManyTags(usize),
    #[error("persist failed: {0}")]
    PersistFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
}

pub struct MetricPipelineConfig {
    pub buffer_capacity: usize,
    pub flush_interval: StdDuration,
    pub retention_sweep_interval: StdDuration,
}

impl Default for MetricPipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            flush_interval: StdDuration::from_secs(10),
            retention_sweep_interval: StdDuration::from_secs(3600),
        }
    }
}

/// Ingests samples into a bounded buffer, flushed to the configured
/// [`MetricStore`] on a timer, on capacity, or ahead of a query that needs
/// data the flusher hasn't pushed yet.
pub struct MetricPipeline {
    store: Arc<dyn MetricStore>,
    clock: Arc<dyn Clock>,
    buffer: MetricBuffer,
    flush_notify: Notify,
    flush_failures_total: AtomicU64,
    cancel: CancellationToken,
}

fn validate(sample: &MetricSample) -> Result<(), MetricError> {
    if sample.name.is_empty() {
        return Err(MetricError::EmptyName);
    }
    if sample.tags.len() > types::MAX_TAGS {
        return Err(MetricError::TooManyTags(sample.tags.len()));
    }
    Ok(())
}

impl MetricPipeline {
    pub fn new(store: Arc<dyn MetricStore>, clock: Arc<dyn Clock>, config: MetricPipelineConfig) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            store,
            clock,
            buffer: MetricBuffer::new(config.buffer_capacity),
            flush_notify: Notify::new(),
            flush_failures_total: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        });
        pipeline.clone().spawn_flusher(config.flush_interval);
        pipeline.clone().spawn_retention_sweeper(config.retention_sweep_interval);
        pipeline
    }

    pub fn record(&self, sample: MetricSample) -> Result<(), MetricError> {
        validate(&sample)?;
        if self.buffer.push(sample) {
            self.flush_notify.notify_one();
        }
        Ok(())
    }

    pub fn record_batch(&self, samples: Vec<MetricSample>) -> Result<(), MetricError> {
        for sample in samples {
            self.record(sample)?;
        }
        Ok(())
    }

    /// Forces a flush before reading, so a query immediately after a burst
    /// of `record` calls still sees them.
    pub async fn query(&self, filter: &SeriesFilter, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> Result<Vec<MetricSample>, MetricError> {
        self.flush_once().await;
        self.store
            .query(filter, start, end)
            .await
            .map_err(|e| MetricError::QueryFailed(e.to_string()))
    }

    /// Buckets the raw series into `resolution`-wide, epoch-aligned windows
    /// over `[start, end)` and returns one [`AggregatedBucket`] per window.
    /// `aggregation` selects which field of each bucket the caller should
    /// read (see [`Aggregation::select`]) — every bucket carries the full
    /// set of stats regardless, so nothing here needs to special-case it.
    ///
    /// Raw retention is shorter than aggregate retention: for windows whose
    /// raw samples have already aged out, the store's precomputed buckets
    /// for `resolution` fill the gap instead of being dropped silently.
    pub async fn query_with_aggregation(
        &self,
        filter: &SeriesFilter,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        resolution: &str,
        aggregation: Aggregation,
    ) -> Result<Vec<AggregatedBucket>, MetricError> {
        let resolution = Resolution::parse(resolution)?;
        self.flush_once().await;

        let raw = self
            .store
            .query(filter, start, end)
            .await
            .map_err(|e| MetricError::QueryFailed(e.to_string()))?;
        let mut buckets = downsample::downsample(&raw, resolution);

        let covered: std::collections::HashSet<i64> = buckets.iter().map(|b| b.window_start.timestamp()).collect();
        let stored = self
            .store
            .query_aggregated(filter, start, end, resolution)
            .await
            .map_err(|e| MetricError::QueryFailed(e.to_string()))?;
        buckets.extend(stored.into_iter().filter(|b| !covered.contains(&b.window_start.timestamp())));

        buckets.sort_by_key(|b| b.window_start);
        debug!(buckets = buckets.len(), aggregation = ?aggregation, "computed aggregated buckets");
        Ok(buckets)
    }

    pub fn stats(&self) -> MetricStats {
        MetricStats {
            buffered: self.buffer.len(),
            dropped_total: self.buffer.dropped_total(),
            flush_failures_total: self.flush_failures_total.load(Ordering::Relaxed),
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn flush_once(&self) {
        if self.buffer.is_empty() {
            return;
        }
        let samples = self.buffer.drain();
        let count = samples.len();
        if let Err(e) = self.store.record_batch(samples.clone()).await {
            self.flush_failures_total.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, count, "metric flush failed, requeueing");
            self.buffer.requeue(samples);
        } else {
            debug!(count, "flushed metric samples");
        }
    }

    fn spawn_flusher(self: Arc<Self>, interval_period: StdDuration) {
        tokio::spawn(async move {
            let mut tick = interval(interval_period);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tick.tick() => self.flush_once().await,
                    _ = self.flush_notify.notified() => self.flush_once().await,
                }
            }
        });
    }

    fn spawn_retention_sweeper(self: Arc<Self>, sweep_period: StdDuration) {
        tokio::spawn(async move {
            let mut tick = interval(sweep_period);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tick.tick() => self.run_retention_sweep().await,
                }
            }
        });
    }

    async fn run_retention_sweep(&self) {
        let now = self.clock.now();
        let raw_threshold = now - chrono::Duration::days(downsample::RAW_RETENTION_DAYS);
        match self.store.delete_raw_before(raw_threshold).await {
            Ok(n) if n > 0 => debug!(deleted = n, "raw metric retention sweep"),
            Err(e) => error!(error = %e, "raw metric retention sweep failed"),
            _ => {}
        }

        for resolution in [Resolution::OneMinute, Resolution::FiveMinutes, Resolution::OneHour, Resolution::OneDay] {
            let threshold = now - resolution.default_retention();
            match self.store.delete_aggregated_before(threshold, resolution).await {
                Ok(n) if n > 0 => debug!(deleted = n, resolution = resolution.as_str(), "aggregated retention sweep"),
                Err(e) => error!(error = %e, resolution = resolution.as_str(), "aggregated retention sweep failed"),
                _ => {}
            }
        }
    }

    /// Downsamples every raw sample older than `older_than` still sitting in
    /// the store into `resolution` buckets, then lets the retention sweep
    /// clean up the raw rows on its own schedule.
    pub async fn downsample_series(
        &self,
        filter: &SeriesFilter,
        older_than: chrono::DateTime<chrono::Utc>,
        resolution: &str,
    ) -> Result<usize, MetricError> {
        let resolution = Resolution::parse(resolution)?;
        let epoch = chrono::DateTime::<chrono::Utc>::from_timestamp(0, 0).unwrap();
        let raw = self
            .store
            .query(filter, epoch, older_than)
            .await
            .map_err(|e| MetricError::QueryFailed(e.to_string()))?;
        if raw.is_empty() {
            return Ok(0);
        }
        let buckets = downsample::downsample(&raw, resolution);
        let produced = buckets.len();
        self.store
            .record_aggregated_batch(buckets)
            .await
            .map_err(|e| MetricError::PersistFailed(e.to_string()))?;
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::memory::InMemoryMetricStore;

    fn pipeline() -> Arc<MetricPipeline> {
        MetricPipeline::new(
            Arc::new(InMemoryMetricStore::new()),
            Arc::new(SystemClock),
            MetricPipelineConfig {
                buffer_capacity: 4,
                flush_interval: StdDuration::from_secs(3600),
                retention_sweep_interval: StdDuration::from_secs(3600),
            },
        )
    }

    fn sample(name: &str, value: f64) -> MetricSample {
        MetricSample {
            name: name.to_string(),
            kind: MetricKind::Gauge,
            value,
            tags: Tags::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_then_query_returns_the_sample_after_flush() {
        let pipeline = pipeline();
        pipeline.record(sample("cpu", 42.0)).unwrap();
        let results = pipeline
            .query(
                &SeriesFilter { name: "cpu".into(), tags: Tags::new() },
                chrono::Utc::now() - chrono::Duration::minutes(1),
                chrono::Utc::now() + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 42.0);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let pipeline = pipeline();
        let err = pipeline.record(sample("", 1.0)).unwrap_err();
        assert!(matches!(err, MetricError::EmptyName));
    }

    #[tokio::test]
    async fn unknown_resolution_string_is_rejected() {
        let pipeline = pipeline();
        let err = pipeline
            .query_with_aggregation(
                &SeriesFilter { name: "cpu".into(), tags: Tags::new() },
                chrono::Utc::now(),
                chrono::Utc::now(),
                "3m",
                Aggregation::Avg,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MetricError::InvalidResolution(_)));
    }
}
