use std::sync::Arc;
use std::time::Duration;

use forge::clock::SystemClock;
use forge::metrics::{MetricPipeline, MetricPipelineConfig};
use forge::store::memory::{InMemoryExecutionStore, InMemoryMetricStore, InMemoryWorkflowStore};
use forge::workflow::actions::ActionContext;
use forge::workflow::model::{ExecutionState, StepState};
use forge::workflow::{WorkflowEngine, WorkflowEngineConfig};

const FAN_OUT: &str = r#"
name: fan-out
version: "1"
steps:
  - id: a
    type: task
    config: { value: 1 }
  - id: b
    type: task
    depends_on: [a]
    config: { value: 2 }
  - id: c
    type: task
    depends_on: [a]
    config: { value: 3 }
  - id: join
    type: task
    depends_on: [b, c]
    config: {}
"#;

fn engine() -> Arc<WorkflowEngine> {
    let metrics = MetricPipeline::new(
        Arc::new(InMemoryMetricStore::new()),
        Arc::new(SystemClock),
        MetricPipelineConfig { buffer_capacity: 100, flush_interval: Duration::from_secs(3600), retention_sweep_interval: Duration::from_secs(3600) },
    );
    WorkflowEngine::new(
        Arc::new(InMemoryWorkflowStore::new()),
        Arc::new(InMemoryExecutionStore::new()),
        ActionContext { metrics, plugins: None },
        WorkflowEngineConfig { max_concurrent_executions: 4 },
    )
}

#[tokio::test]
async fn a_diamond_shaped_workflow_runs_every_step_to_completion() {
    let engine = engine();
    let workflow = engine.load_workflow(FAN_OUT).await.unwrap();
    let execution = engine.execute(workflow.id, serde_json::json!({"seed": 1})).await.unwrap();

    assert_eq!(execution.state, ExecutionState::Succeeded);
    assert_eq!(execution.steps.len(), 4);
    for step_id in ["a", "b", "c", "join"] {
        assert_eq!(execution.steps[step_id].state, StepState::Succeeded);
    }
}

#[tokio::test]
async fn a_hard_failure_skips_its_dependents_but_leaves_siblings_untouched() {
    let yaml = r#"
name: partial-failure
version: "1"
steps:
  - id: a
    type: shell
    config: { command: "false" }
  - id: b
    type: task
    depends_on: [a]
    config: {}
  - id: independent
    type: task
    config: {}
"#;
    let engine = engine();
    let workflow = engine.load_workflow(yaml).await.unwrap();
    let execution = engine.execute(workflow.id, serde_json::json!({})).await.unwrap();

    assert_eq!(execution.state, ExecutionState::Failed);
    assert_eq!(execution.steps["a"].state, StepState::Failed);
    assert_eq!(execution.steps["b"].state, StepState::Skipped);
    assert_eq!(execution.steps["independent"].state, StepState::Succeeded);
}

#[tokio::test]
async fn continue_on_error_lets_the_dag_proceed_past_a_failed_step() {
    let yaml = r#"
name: tolerant
version: "1"
steps:
  - id: a
    type: shell
    continue_on_error: true
    config: { command: "false" }
  - id: b
    type: task
    depends_on: [a]
    config: {}
"#;
    let engine = engine();
    let workflow = engine.load_workflow(yaml).await.unwrap();
    let execution = engine.execute(workflow.id, serde_json::json!({})).await.unwrap();

    assert_eq!(execution.steps["a"].state, StepState::Failed);
    assert_eq!(execution.steps["b"].state, StepState::Succeeded);
    assert_eq!(execution.state, ExecutionState::Succeeded);
}

#[tokio::test]
async fn a_step_that_outlives_its_timeout_is_marked_failed() {
    let yaml = r#"
name: slow-step
version: "1"
steps:
  - id: a
    type: shell
    timeout_secs: 1
    config: { command: "sleep 5" }
"#;
    let engine = engine();
    let workflow = engine.load_workflow(yaml).await.unwrap();
    let execution = engine.execute(workflow.id, serde_json::json!({})).await.unwrap();

    assert_eq!(execution.steps["a"].state, StepState::Failed);
    assert_eq!(execution.state, ExecutionState::Failed);
}

#[tokio::test]
async fn an_execution_can_be_looked_up_after_it_completes() {
    let engine = engine();
    let workflow = engine.load_workflow(FAN_OUT).await.unwrap();
    let execution = engine.execute(workflow.id, serde_json::json!({})).await.unwrap();

    let fetched = engine.get_execution(execution.id).await.unwrap();
    assert_eq!(fetched.id, execution.id);
    assert_eq!(fetched.state, ExecutionState::Succeeded);
}
