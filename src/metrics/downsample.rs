//! Downsampling and tiered retention.
//!
//! Raw samples live for 7 days; progressively coarser aggregates live
//! longer (1m buckets for 30 days, 5m for 60, 1h for 365, 1d indefinitely).
//! `downsample` computes one resolution's buckets from a raw sample set;
//! the pipeline calls it once per tier on its periodic sweep.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{AggregatedBucket, MetricSample, Resolution};

pub const RAW_RETENTION_DAYS: i64 = 7;

fn window_start(ts: DateTime<Utc>, resolution: Resolution) -> DateTime<Utc> {
    let width = resolution.duration().num_seconds();
    let epoch = ts.timestamp();
    let floored = epoch - epoch.rem_euclid(width);
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

/// Buckets `samples` into `resolution`-wide windows per series.
pub fn downsample(samples: &[MetricSample], resolution: Resolution) -> Vec<AggregatedBucket> {
    struct Acc {
        name: String,
        tags: super::types::Tags,
        window_start: DateTime<Utc>,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
    }

    let mut buckets: HashMap<(u64, i64), Acc> = HashMap::new();
    for sample in samples {
        let hash = sample.series_hash();
        let start = window_start(sample.timestamp, resolution);
        let entry = buckets.entry((hash, start.timestamp())).or_insert_with(|| Acc {
            name: sample.name.clone(),
            tags: sample.tags.clone(),
            window_start: start,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        });
        entry.count += 1;
        entry.sum += sample.value;
        entry.min = entry.min.min(sample.value);
        entry.max = entry.max.max(sample.value);
    }

    buckets
        .into_iter()
        .map(|((hash, _), acc)| AggregatedBucket {
            series_hash: hash,
            name: acc.name,
            tags: acc.tags,
            window_start: acc.window_start,
            window_end: acc.window_start + resolution.duration(),
            count: acc.count,
            sum: acc.sum,
            min: acc.min,
            max: acc.max,
            avg: acc.sum / acc.count as f64,
            resolution,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{MetricKind, Tags};
    use chrono::TimeZone;

    fn sample_at(ts: DateTime<Utc>, value: f64) -> MetricSample {
        MetricSample {
            name: "cpu".into(),
            kind: MetricKind::Gauge,
            value,
            tags: Tags::new(),
            timestamp: ts,
        }
    }

    #[test]
    fn buckets_samples_within_the_same_minute_together() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let samples = vec![
            sample_at(base, 10.0),
            sample_at(base + chrono::Duration::seconds(20), 20.0),
        ];
        let buckets = downsample(&samples, Resolution::OneMinute);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].avg, 15.0);
        assert_eq!(buckets[0].min, 10.0);
        assert_eq!(buckets[0].max, 20.0);
    }

    #[test]
    fn splits_samples_across_minute_boundaries() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 50).unwrap();
        let samples = vec![sample_at(base, 1.0), sample_at(base + chrono::Duration::seconds(20), 2.0)];
        let buckets = downsample(&samples, Resolution::OneMinute);
        assert_eq!(buckets.len(), 2);
    }
}
