//! Escalation policies: repeat/step up notification for unacknowledged,
//! still-firing alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub after_secs: i64,
    pub channel_ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: Id,
    pub rule_id: Id,
    pub steps: Vec<EscalationStep>,
    pub repeat: bool,
}

impl EscalationPolicy {
    /// Picks the step due at or before `elapsed_secs` into the alert's
    /// firing lifetime, given the alert is currently at `level`. Returns
    /// `None` when no further step is due yet.
    pub fn due_step(&self, level: u32, elapsed_secs: i64) -> Option<(u32, &EscalationStep)> {
        let idx = level as usize;
        if let Some(step) = self.steps.get(idx) {
            if elapsed_secs >= step.after_secs {
                return Some((level, step));
            }
            return None;
        }
        // Exhausted the step list; restart from the first step if repeating.
        if self.repeat && !self.steps.is_empty() {
            let step = &self.steps[0];
            if elapsed_secs >= step.after_secs {
                return Some((0, step));
            }
        }
        None
    }
}

/// Per-alert escalation bookkeeping, separate from [`EscalationPolicy`]
/// (the policy is the rule; this is the running instance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationState {
    pub alert_id: Id,
    pub policy_id: Id,
    pub level: u32,
    pub last_escalated_at: DateTime<Utc>,
}
