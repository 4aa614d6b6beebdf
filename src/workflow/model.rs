//! Workflow and execution data model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Shell,
    Http,
    Metric,
    Ai,
    Task,
    Plugin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub config: Value,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_delay_secs: u64,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub state: StepState,
    pub output: Value,
    pub error: Option<String>,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Id,
    pub workflow_id: Id,
    pub state: ExecutionState,
    pub input: Value,
    /// Every intermediate step's result, keyed by step id — the execution
    /// record always carries the full trace, not just the terminal steps
    /// (see DESIGN.md).
    pub steps: BTreeMap<String, StepResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    pub fn new_running(workflow_id: Id, input: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Id::new(),
            workflow_id,
            state: ExecutionState::Running,
            input,
            steps: BTreeMap::new(),
            started_at: now,
            finished_at: None,
        }
    }

    /// Composes a step's input: the workflow input overlaid with each
    /// dependency's output under the key `"<dep>_<outputKey>"`.
    pub fn compose_step_input(&self, step: &WorkflowStep) -> Value {
        let mut obj = self.input.as_object().cloned().unwrap_or_default();
        for dep in &step.depends_on {
            if let Some(result) = self.steps.get(dep) {
                if let Some(output_obj) = result.output.as_object() {
                    for (k, v) in output_obj {
                        obj.insert(format!("{dep}_{k}"), v.clone());
                    }
                }
            }
        }
        Value::Object(obj)
    }
}
