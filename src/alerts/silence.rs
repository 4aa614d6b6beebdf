//! Silences suppress notification for matching alerts. A silenced alert is
//! still evaluated and stored, but its state reads `silenced` instead of
//! `firing` for as long as an active silence matches its labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;
use crate::metrics::types::Tags;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
    pub id: Id,
    pub matchers: Tags,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_by: String,
    pub comment: String,
}

impl Silence {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    /// A silence matches when every one of its matcher labels is present
    /// with an equal value in `labels` (AND, equality-only).
    pub fn matches(&self, labels: &Tags) -> bool {
        self.matchers
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}
