//! Step action registry: one [`Action`] implementation per
//! [`StepType`], each returning a fixed output shape.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::metrics::types::{Aggregation, SeriesFilter};
use crate::metrics::MetricPipeline;
use crate::wasm::PluginHost;

use super::model::StepType;
use super::WorkflowError;

/// Resources an action may need beyond its own step config — the metric
/// pipeline for `metric` steps, the plugin host for `plugin` steps.
pub struct ActionContext {
    pub metrics: Arc<MetricPipeline>,
    pub plugins: Option<Arc<PluginHost>>,
}

#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &ActionContext, config: &Value, input: &Value) -> Result<Value, WorkflowError>;
}

pub struct ShellAction;

/// Substitutes `${key}` placeholders in `template` with the matching field
/// of `input` (string values inserted bare, everything else via its JSON
/// rendering). Mirrors the substitution `AiAction` does for prompts.
fn substitute(template: &str, input: &Value) -> String {
    let mut out = template.to_string();
    if let Some(obj) = input.as_object() {
        for (k, v) in obj {
            let placeholder = format!("${{{k}}}");
            if out.contains(&placeholder) {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&placeholder, &value);
            }
        }
    }
    out
}

#[async_trait]
impl Action for ShellAction {
    async fn execute(&self, _ctx: &ActionContext, config: &Value, input: &Value) -> Result<Value, WorkflowError> {
        let command_template = config
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("shell step requires a `command` string".into()))?;
        let command = substitute(command_template, input);
        let shell = config.get("shell").and_then(Value::as_str).unwrap_or("/bin/sh");

        let mut cmd = Command::new(shell);
        cmd.arg("-c").arg(&command).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(workdir) = config.get("workdir").and_then(Value::as_str) {
            cmd.current_dir(workdir);
        }
        if let Some(env) = config.get("env").and_then(Value::as_object) {
            for (k, v) in env {
                if let Some(v) = v.as_str() {
                    cmd.env(k, v);
                }
            }
        }

        let output = cmd.output().await.map_err(|e| WorkflowError::ActionFailed(e.to_string()))?;

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code().unwrap_or(-1),
            "success": output.status.success(),
        }))
    }
}

pub struct HttpAction {
    client: reqwest::Client,
}

impl HttpAction {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for HttpAction {
    async fn execute(&self, _ctx: &ActionContext, config: &Value, _input: &Value) -> Result<Value, WorkflowError> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("http step requires a `url` string".into()))?;
        let method = config.get("method").and_then(Value::as_str).unwrap_or("GET");
        let timeout_ms = config.get("timeout_ms").and_then(Value::as_u64).unwrap_or(30_000);

        let mut req = self
            .client
            .request(method.parse().unwrap_or(reqwest::Method::GET), url)
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(body) = config.get("body") {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| WorkflowError::ActionFailed(e.to_string()))?;
        let status = resp.status();
        let headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));

        Ok(json!({
            "status": status.as_u16(),
            "status_text": status.canonical_reason().unwrap_or_default(),
            "body": body,
            "headers": headers,
            "success": status.is_success(),
        }))
    }
}

pub struct MetricAction;

#[async_trait]
impl Action for MetricAction {
    async fn execute(&self, ctx: &ActionContext, config: &Value, _input: &Value) -> Result<Value, WorkflowError> {
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("metric step requires a `name` string".into()))?;
        let range_secs = config.get("range_secs").and_then(Value::as_i64).unwrap_or(3600);
        let now = chrono::Utc::now();
        let filter = SeriesFilter { name: name.to_string(), tags: Default::default() };

        if let Some(resolution) = config.get("resolution").and_then(Value::as_str) {
            let buckets = ctx
                .metrics
                .query_with_aggregation(&filter, now - chrono::Duration::seconds(range_secs), now, resolution, Aggregation::Avg)
                .await
                .map_err(|e| WorkflowError::ActionFailed(e.to_string()))?;
            return Ok(json!({
                "series": [{ "name": name, "tags": {}, "points": buckets.iter().map(|b| json!({
                    "window_start": b.window_start,
                    "value": Aggregation::Avg.select(b),
                    "avg": b.avg,
                    "min": b.min,
                    "max": b.max,
                    "count": b.count,
                })).collect::<Vec<_>>() }],
                "count": buckets.len(),
            }));
        }

        let samples = ctx
            .metrics
            .query(&filter, now - chrono::Duration::seconds(range_secs), now)
            .await
            .map_err(|e| WorkflowError::ActionFailed(e.to_string()))?;
        Ok(json!({
            "series": [{ "name": name, "tags": {}, "points": samples.iter().map(|s| json!({
                "timestamp": s.timestamp,
                "value": s.value,
            })).collect::<Vec<_>>() }],
            "count": samples.len(),
        }))
    }
}

/// Templated text completion. No language-model client is in the
/// dependency stack, so this returns the rendered prompt as its own
/// response — enough to exercise the step-chaining machinery in tests
/// without fabricating an external API integration.
pub struct AiAction;

#[async_trait]
impl Action for AiAction {
    async fn execute(&self, _ctx: &ActionContext, config: &Value, input: &Value) -> Result<Value, WorkflowError> {
        let prompt_template = config
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("ai step requires a `prompt` string".into()))?;
        let model = config.get("model").and_then(Value::as_str).unwrap_or("stub").to_string();

        let mut prompt = prompt_template.to_string();
        if let Some(obj) = input.as_object() {
            for (k, v) in obj {
                let placeholder = format!("${{{k}}}");
                if prompt.contains(&placeholder) {
                    prompt = prompt.replace(&placeholder, &v.to_string());
                }
            }
        }

        Ok(json!({
            "response": prompt,
            "model": model,
            "prompt": prompt_template,
        }))
    }
}

/// A no-op pass-through step, useful for fan-in/fan-out join points in a
/// DAG that don't need their own side effect.
pub struct TaskAction;

#[async_trait]
impl Action for TaskAction {
    async fn execute(&self, _ctx: &ActionContext, config: &Value, input: &Value) -> Result<Value, WorkflowError> {
        Ok(json!({ "config": config, "input": input }))
    }
}

pub struct PluginAction;

#[async_trait]
impl Action for PluginAction {
    async fn execute(&self, ctx: &ActionContext, config: &Value, input: &Value) -> Result<Value, WorkflowError> {
        let plugins = ctx
            .plugins
            .as_ref()
            .ok_or_else(|| WorkflowError::ActionFailed("no plugin host configured".into()))?;
        let plugin_id = config
            .get("plugin_id")
            .and_then(Value::as_str)
            .and_then(crate::ids::Id::parse)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("plugin step requires a `plugin_id`".into()))?;
        let function = config
            .get("function")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkflowError::InvalidStepConfig("plugin step requires a `function` string".into()))?;

        let payload = serde_json::to_vec(input).unwrap_or_default();
        let result = plugins
            .call_function(plugin_id, function, &payload)
            .await
            .map_err(|e| WorkflowError::ActionFailed(e.to_string()))?;
        Ok(serde_json::from_slice(&result).unwrap_or_else(|_| json!({ "raw_len": result.len() })))
    }
}

pub fn default_registry() -> HashMap<StepType, Arc<dyn Action>> {
    let mut registry: HashMap<StepType, Arc<dyn Action>> = HashMap::new();
    registry.insert(StepType::Shell, Arc::new(ShellAction));
    registry.insert(StepType::Http, Arc::new(HttpAction::new()));
    registry.insert(StepType::Metric, Arc::new(MetricAction));
    registry.insert(StepType::Ai, Arc::new(AiAction));
    registry.insert(StepType::Task, Arc::new(TaskAction));
    registry.insert(StepType::Plugin, Arc::new(PluginAction));
    registry
}
