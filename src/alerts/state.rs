//! Alert lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Pending,
    Firing,
    Resolved,
    Silenced,
    Acknowledged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Id,
    pub rule_id: Id,
    pub fingerprint: String,
    pub state: AlertState,
    pub value: f64,
    pub started_at: DateTime<Utc>,
    pub last_evaluated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub escalation_level: u32,
    pub next_escalation_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new_pending(rule_id: Id, fingerprint: String, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Id::new(),
            rule_id,
            fingerprint,
            state: AlertState::Pending,
            value,
            started_at: now,
            last_evaluated_at: now,
            resolved_at: None,
            acknowledged_at: None,
            escalation_level: 0,
            next_escalation_at: None,
        }
    }

    /// An acknowledgement freezes escalation until the alert resolves or the
    /// acknowledgement itself is cleared.
    pub fn escalation_frozen(&self) -> bool {
        matches!(self.state, AlertState::Acknowledged | AlertState::Resolved)
    }
}
