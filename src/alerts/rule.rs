//! Alert rule definitions.

use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::metrics::types::Tags;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Condition {
    ThresholdAbove { value: f64 },
    ThresholdBelow { value: f64 },
    ThresholdEqual { value: f64 },
    /// Fires when the series changes by more than `delta` between the two
    /// most recent samples in `window`. Limited to exactly two samples —
    /// see `RateOfChange` doc on [`super::AlertEngine::evaluate_rule`].
    RateOfChange { delta: f64, window_secs: i64 },
    /// Fires when the latest sample's z-score against the rolling mean of
    /// the last `min_samples` (≥10) exceeds `z_threshold`.
    Anomaly { z_threshold: f64, min_samples: usize },
    /// Fires when no sample for the series has arrived within `for_secs`.
    AbsenceOfData { for_secs: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Id,
    pub name: String,
    pub metric_name: String,
    pub tags: Tags,
    pub condition: Condition,
    pub severity: Severity,
    /// Condition must hold continuously for this long before the rule fires.
    pub for_secs: i64,
    pub enabled: bool,
    pub labels: Tags,
}

impl AlertRule {
    /// `ruleId‖metricName` — identifies one (rule, series) pairing across
    /// evaluation cycles.
    pub fn fingerprint(&self) -> String {
        format!("{}\u{2016}{}", self.id, self.metric_name)
    }
}
