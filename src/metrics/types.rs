//! Metric pipeline data model (Metric sample, Aggregated bucket).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MetricError;

/// String->string tag map, at most 32 pairs (a fixed-size invariant).
pub type Tags = BTreeMap<String, String>;

pub const MAX_TAGS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    OneMinute,
    FiveMinutes,
    OneHour,
    OneDay,
}

impl Resolution {
    pub fn parse(s: &str) -> Result<Self, MetricError> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            other => Err(MetricError::InvalidResolution(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            Self::OneMinute => chrono::Duration::minutes(1),
            Self::FiveMinutes => chrono::Duration::minutes(5),
            Self::OneHour => chrono::Duration::hours(1),
            Self::OneDay => chrono::Duration::days(1),
        }
    }

    /// Default retention window for this resolution's aggregates.
    pub fn default_retention(&self) -> chrono::Duration {
        match self {
            Self::OneMinute => chrono::Duration::days(30),
            Self::FiveMinutes => chrono::Duration::days(60),
            Self::OneHour => chrono::Duration::days(365),
            // "indefinite" — represented as an effectively unbounded window.
            Self::OneDay => chrono::Duration::days(365 * 100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Tags,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Stable series identity: `H(name || sorted(tags))`. `BTreeMap`
    /// iteration is already sorted by key, so hashing the map in order
    /// gives a stable digest without an explicit sort step.
    pub fn series_hash(&self) -> u64 {
        series_hash(&self.name, &self.tags)
    }
}

pub fn series_hash(name: &str, tags: &Tags) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = ahash::AHasher::default();
    name.hash(&mut hasher);
    for (k, v) in tags {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    /// Reads the field of `bucket` this aggregation selects.
    pub fn select(&self, bucket: &AggregatedBucket) -> f64 {
        match self {
            Self::Avg => bucket.avg,
            Self::Sum => bucket.sum,
            Self::Min => bucket.min,
            Self::Max => bucket.max,
            Self::Count => bucket.count as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedBucket {
    pub series_hash: u64,
    pub name: String,
    pub tags: Tags,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub resolution: Resolution,
}

/// Selects a series (or set of series) for querying. `tags` is matched by
/// equality only (no label indexing beyond equality).
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    pub name: String,
    pub tags: Tags,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct MetricStats {
    pub buffered: usize,
    pub dropped_total: u64,
    pub flush_failures_total: u64,
}
