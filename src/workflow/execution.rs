//! DAG execution: readiness-set scheduling, retries, timeouts
//! and cancellation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::actions::{Action, ActionContext};
use super::model::{Execution, ExecutionState, StepResult, StepState, StepType, Workflow, WorkflowStep};
use super::WorkflowError;

pub type ActionRegistry = HashMap<StepType, Arc<dyn Action>>;

/// Runs every step of `workflow` to completion (or first unrecoverable
/// failure), writing one [`StepResult`] per step into `execution`. Steps
/// become ready the instant all of their `depends_on` entries have a
/// terminal result — parallel branches run concurrently within a single
/// readiness wave.
pub async fn run(
    workflow: &Workflow,
    execution: &mut Execution,
    registry: &Arc<ActionRegistry>,
    ctx: &Arc<ActionContext>,
    cancel: &CancellationToken,
) -> Result<(), WorkflowError> {
    let by_id: HashMap<&str, &WorkflowStep> = workflow.steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut remaining: HashSet<&str> = workflow.steps.iter().map(|s| s.id.as_str()).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut failed_hard = false;

    while !remaining.is_empty() {
        if cancel.is_cancelled() {
            execution.state = ExecutionState::Cancelled;
            execution.finished_at = Some(Utc::now());
            return Ok(());
        }

        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| by_id[id].depends_on.iter().all(|d| done.contains(d.as_str())))
            .collect();

        if ready.is_empty() {
            // No runnable step but steps remain: every surviving candidate
            // depends on one that failed without `continue_on_error`.
            break;
        }

        let mut wave = JoinSet::new();
        for step_id in &ready {
            let step = (*by_id[step_id]).clone();
            let input = execution.compose_step_input(&step);
            let registry = registry.clone();
            let ctx = ctx.clone();
            let cancel = cancel.clone();
            wave.spawn(async move { run_step(&step, input, &registry, &ctx, &cancel).await });
        }

        while let Some(joined) = wave.join_next().await {
            let result = match joined {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "step task panicked");
                    continue;
                }
            };
            let step = by_id[result.step_id.as_str()];
            let failed = result.state == StepState::Failed;
            done.insert(step.id.as_str());
            remaining.remove(step.id.as_str());
            execution.steps.insert(result.step_id.clone(), result);
            if failed && !step.continue_on_error {
                failed_hard = true;
            }
        }

        if failed_hard {
            break;
        }
    }

    // Anything left unscheduled after a hard failure is recorded as skipped
    // so the execution's step map still accounts for every declared step.
    for step_id in remaining {
        execution.steps.entry(step_id.to_string()).or_insert_with(|| StepResult {
            step_id: step_id.to_string(),
            state: StepState::Skipped,
            output: serde_json::Value::Null,
            error: None,
            attempt: 0,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
        });
    }

    execution.state = if failed_hard {
        ExecutionState::Failed
    } else {
        ExecutionState::Succeeded
    };
    execution.finished_at = Some(Utc::now());
    Ok(())
}

async fn run_step(
    step: &WorkflowStep,
    input: serde_json::Value,
    registry: &ActionRegistry,
    ctx: &ActionContext,
    cancel: &CancellationToken,
) -> StepResult {
    let started_at = Utc::now();
    let action = match registry.get(&step.step_type) {
        Some(a) => a.clone(),
        None => {
            return StepResult {
                step_id: step.id.clone(),
                state: StepState::Failed,
                output: serde_json::Value::Null,
                error: Some(format!("no action registered for step type {:?}", step.step_type)),
                attempt: 0,
                started_at,
                finished_at: Some(Utc::now()),
            }
        }
    };

    let max_attempts = step.retries + 1;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let invocation = action.execute(ctx, &step.config, &input);
        let outcome = match step.timeout_secs {
            Some(secs) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return cancelled_result(step, attempt, started_at);
                    }
                    res = tokio::time::timeout(Duration::from_secs(secs), invocation) => {
                        match res {
                            Ok(inner) => inner,
                            Err(_) => Err(WorkflowError::DeadlineExceeded(step.id.clone())),
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return cancelled_result(step, attempt, started_at);
                    }
                    res = invocation => res,
                }
            }
        };

        match outcome {
            Ok(output) => {
                return StepResult {
                    step_id: step.id.clone(),
                    state: StepState::Succeeded,
                    output,
                    error: None,
                    attempt,
                    started_at,
                    finished_at: Some(Utc::now()),
                };
            }
            Err(e) => {
                warn!(step = %step.id, attempt, error = %e, "step attempt failed");
                last_error = Some(e.to_string());
                if attempt < max_attempts {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(Duration::from_secs(step.retry_delay_secs)) => {}
                    }
                }
            }
        }
    }

    debug!(step = %step.id, "step exhausted retries");
    StepResult {
        step_id: step.id.clone(),
        state: StepState::Failed,
        output: serde_json::Value::Null,
        error: last_error,
        attempt: max_attempts,
        started_at,
        finished_at: Some(Utc::now()),
    }
}

fn cancelled_result(step: &WorkflowStep, attempt: u32, started_at: chrono::DateTime<Utc>) -> StepResult {
    StepResult {
        step_id: step.id.clone(),
        state: StepState::Cancelled,
        output: serde_json::Value::Null,
        error: Some("cancelled".into()),
        attempt,
        started_at,
        finished_at: Some(Utc::now()),
    }
}
