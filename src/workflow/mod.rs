//! Workflow engine: DAG-based automation with retries,
//! timeouts and cancellation.

pub mod actions;
pub mod execution;
pub mod loader;
pub mod model;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::ids::Id;
use crate::store::{ExecutionStore, WorkflowStore};

use actions::{default_registry, ActionContext};
use execution::ActionRegistry;
use model::{Execution, Workflow};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),
    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),
    #[error("step {0} depends on unknown step {1}")]
    UnknownDependency(String, String),
    #[error("circular dependency: {0}")]
    CircularDependency(String),
    #[error("workflow not found: {0}")]
    WorkflowNotFound(Id),
    #[error("execution not found: {0}")]
    ExecutionNotFound(Id),
    #[error("invalid step config: {0}")]
    InvalidStepConfig(String),
    #[error("step action failed: {0}")]
    ActionFailed(String),
    #[error("step {0} exceeded its deadline")]
    DeadlineExceeded(String),
    #[error("execution cancelled")]
    Cancelled,
    #[error("store error: {0}")]
    Store(String),
}

pub struct WorkflowEngineConfig {
    pub max_concurrent_executions: usize,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self { max_concurrent_executions: 8 }
    }
}

pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<ActionRegistry>,
    action_ctx: Arc<ActionContext>,
    concurrency: Arc<tokio::sync::Semaphore>,
    running: AsyncMutex<std::collections::HashMap<Id, CancellationToken>>,
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        action_ctx: ActionContext,
        config: WorkflowEngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            workflows,
            executions,
            registry: Arc::new(default_registry()),
            action_ctx: Arc::new(action_ctx),
            concurrency: Arc::new(tokio::sync::Semaphore::new(config.max_concurrent_executions)),
            running: AsyncMutex::new(std::collections::HashMap::new()),
        })
    }

    pub async fn load_workflow(&self, yaml: &str) -> Result<Workflow, WorkflowError> {
        let workflow = loader::load(yaml)?;
        self.workflows
            .put(workflow.clone())
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: Id) -> Result<Workflow, WorkflowError> {
        self.workflows
            .get(id)
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?
            .ok_or(WorkflowError::WorkflowNotFound(id))
    }

    /// Starts an execution and runs it to completion, honoring the
    /// configured concurrency cap via a semaphore permit held for the
    /// duration of the run.
    pub async fn execute(&self, workflow_id: Id, input: Value) -> Result<Execution, WorkflowError> {
        let workflow = self.get_workflow(workflow_id).await?;
        let _permit = self.concurrency.clone().acquire_owned().await.expect("semaphore not closed");

        let mut execution = Execution::new_running(workflow_id, input, chrono::Utc::now());
        let cancel = CancellationToken::new();
        self.running.lock().await.insert(execution.id, cancel.clone());

        let result = execution::run(&workflow, &mut execution, &self.registry, &self.action_ctx, &cancel).await;
        self.running.lock().await.remove(&execution.id);
        result?;

        self.executions
            .put(execution.clone())
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?;
        Ok(execution)
    }

    pub async fn cancel(&self, execution_id: Id) -> Result<(), WorkflowError> {
        match self.running.lock().await.get(&execution_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(WorkflowError::ExecutionNotFound(execution_id)),
        }
    }

    pub async fn get_execution(&self, id: Id) -> Result<Execution, WorkflowError> {
        self.executions
            .get(id)
            .await
            .map_err(|e| WorkflowError::Store(e.to_string()))?
            .ok_or(WorkflowError::ExecutionNotFound(id))
    }
}
