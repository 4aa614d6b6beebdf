//! Forge: an embeddable observability and automation core.
//!
//! Four subsystems share one process: a metric pipeline, an alert engine,
//! a DAG workflow engine and a sandboxed WebAssembly plugin host. Each is
//! usable standalone through [`AppState`]; the axum router in [`app`] is
//! minimal ambient plumbing (`/healthz`, `/metrics`) rather than a public
//! API surface for the four subsystems.

pub mod alerts;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod store;
pub mod wasm;
pub mod workflow;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::StatusCode;

pub use config::AppConfig;

use alerts::notifier::{LogNotifier, WebhookNotifier};
use alerts::{AlertEngine, AlertEngineConfig};
use clock::{Clock, SystemClock};
use metrics::{MetricPipeline, MetricPipelineConfig};
use store::memory::{
    InMemoryAlertRuleStore, InMemoryAlertStore, InMemoryChannelStore, InMemoryEscalationStore, InMemoryExecutionStore,
    InMemoryMetricStore, InMemoryPluginStore, InMemoryRouteStore, InMemorySilenceStore, InMemoryWorkflowStore,
};
use wasm::{PluginHost, PluginHostConfig};
use workflow::actions::ActionContext;
use workflow::{WorkflowEngine, WorkflowEngineConfig};

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricPipeline>,
    pub alerts: Arc<AlertEngine>,
    pub workflows: Arc<WorkflowEngine>,
    pub plugins: Arc<PluginHost>,
    pub event_bus: Arc<bus::EventBus>,
    pub process_start: Instant,
}

/// Wires every subsystem against the in-memory reference stores. An
/// embedder swapping in a durable backend constructs the same subsystem
/// types directly with their own `Arc<dyn ...Store>` implementations —
/// this function is the default/no-external-dependencies path.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let metric_store = Arc::new(InMemoryMetricStore::new());
    let metrics = MetricPipeline::new(
        metric_store,
        clock.clone(),
        MetricPipelineConfig {
            buffer_capacity: config.metrics.buffer_capacity,
            flush_interval: std::time::Duration::from_secs(config.metrics.flush_interval_secs),
            retention_sweep_interval: std::time::Duration::from_secs(config.metrics.retention_sweep_interval_secs),
        },
    );

    let event_bus = Arc::new(bus::EventBus::new(config.wasm.event_bus_capacity));

    let plugins = PluginHost::new(
        event_bus.clone(),
        PluginHostConfig {
            data_dir: config.wasm.data_dir.clone(),
            default_memory_limit_bytes: config.wasm.default_memory_limit_bytes,
            default_fuel_budget: config.wasm.default_fuel_budget,
            default_timeout_ms: config.wasm.default_timeout_ms,
            require_signed_plugins: config.wasm.require_signed_plugins,
        },
        std::collections::HashMap::new(),
    )?;

    let notifier: Arc<dyn alerts::notifier::Notifier> = if std::env::var("FORGE_NOTIFIER").as_deref() == Ok("log") {
        Arc::new(LogNotifier)
    } else {
        Arc::new(WebhookNotifier::new())
    };

    let alerts = AlertEngine::new(
        Arc::new(InMemoryAlertRuleStore::new()),
        Arc::new(InMemoryAlertStore::new()),
        Arc::new(InMemorySilenceStore::new()),
        Arc::new(InMemoryChannelStore::new()),
        Arc::new(InMemoryRouteStore::new()),
        Arc::new(InMemoryEscalationStore::new()),
        metrics.clone(),
        notifier,
        clock.clone(),
        AlertEngineConfig {
            eval_interval: std::time::Duration::from_secs(config.alerts.eval_interval_secs),
            escalation_interval: std::time::Duration::from_secs(config.alerts.escalation_interval_secs),
        },
    );

    let workflows = WorkflowEngine::new(
        Arc::new(InMemoryWorkflowStore::new()),
        Arc::new(InMemoryExecutionStore::new()),
        ActionContext { metrics: metrics.clone(), plugins: Some(plugins.clone()) },
        WorkflowEngineConfig { max_concurrent_executions: config.workflows.max_concurrent_executions },
    );

    let _plugin_store = Arc::new(InMemoryPluginStore::new());

    Ok(AppState {
        metrics,
        alerts,
        workflows,
        plugins,
        event_bus,
        process_start: Instant::now(),
    })
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let json = serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.process_start.elapsed().as_secs(),
        "metrics": state.metrics.stats(),
        "alertEvaluationsTotal": state.alerts.evaluations_total(),
    });
    (StatusCode::OK, Json(json))
}

/// Hand-rolled Prometheus text exposition, `# HELP`/`# TYPE` lines written
/// directly rather than through a metrics-registry crate.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    use std::fmt::Write as _;
    let stats = state.metrics.stats();
    let mut buf = String::new();

    writeln!(&mut buf, "# HELP forge_metric_buffered Samples currently buffered awaiting flush").ok();
    writeln!(&mut buf, "# TYPE forge_metric_buffered gauge").ok();
    writeln!(&mut buf, "forge_metric_buffered {}", stats.buffered).ok();

    writeln!(&mut buf, "# HELP forge_metric_dropped_total Samples dropped on a full buffer").ok();
    writeln!(&mut buf, "# TYPE forge_metric_dropped_total counter").ok();
    writeln!(&mut buf, "forge_metric_dropped_total {}", stats.dropped_total).ok();

    writeln!(&mut buf, "# HELP forge_metric_flush_failures_total Failed flush attempts to the metric store").ok();
    writeln!(&mut buf, "# TYPE forge_metric_flush_failures_total counter").ok();
    writeln!(&mut buf, "forge_metric_flush_failures_total {}", stats.flush_failures_total).ok();

    writeln!(&mut buf, "# HELP forge_alert_evaluations_total Alert rule evaluation cycles run").ok();
    writeln!(&mut buf, "# TYPE forge_alert_evaluations_total counter").ok();
    writeln!(&mut buf, "forge_alert_evaluations_total {}", state.alerts.evaluations_total()).ok();

    writeln!(&mut buf, "# HELP forge_event_bus_depth Events currently queued on the internal bus").ok();
    writeln!(&mut buf, "# TYPE forge_event_bus_depth gauge").ok();
    writeln!(&mut buf, "forge_event_bus_depth {}", state.event_bus.len()).ok();

    writeln!(&mut buf, "# HELP forge_build_info Build metadata, value is always 1").ok();
    writeln!(&mut buf, "# TYPE forge_build_info gauge").ok();
    writeln!(&mut buf, "forge_build_info{{version=\"{}\"}} 1", env!("CARGO_PKG_VERSION")).ok();

    (StatusCode::OK, buf)
}
