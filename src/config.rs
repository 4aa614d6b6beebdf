//! Environment-driven configuration, one knob per subsystem.
//!
//! `AppConfig::from_env()` keeps typed parsing helpers for optional env
//! vars, a single fallible constructor, and tests that mutate the process
//! environment under a shared mutex.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct MetricConfig {
    pub buffer_capacity: usize,
    pub flush_interval_secs: u64,
    pub retention_sweep_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub eval_interval_secs: u64,
    pub escalation_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub max_concurrent_executions: usize,
}

#[derive(Debug, Clone)]
pub struct WasmConfig {
    pub data_dir: PathBuf,
    pub default_memory_limit_bytes: usize,
    pub default_fuel_budget: u64,
    pub default_timeout_ms: u64,
    pub require_signed_plugins: bool,
    pub event_bus_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub metrics: MetricConfig,
    pub alerts: AlertConfig,
    pub workflows: WorkflowConfig,
    pub wasm: WasmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = parse_optional_u64("PORT")?.unwrap_or(8080) as u16;

        let metrics = MetricConfig {
            buffer_capacity: parse_optional_u64("FORGE_METRIC_BUFFER_CAPACITY")?.unwrap_or(1000) as usize,
            flush_interval_secs: parse_optional_u64("FORGE_METRIC_FLUSH_INTERVAL_SECS")?.unwrap_or(10),
            retention_sweep_interval_secs: parse_optional_u64("FORGE_METRIC_RETENTION_SWEEP_SECS")?.unwrap_or(3600),
        };

        let alerts = AlertConfig {
            eval_interval_secs: parse_optional_u64("FORGE_ALERT_EVAL_INTERVAL_SECS")?.unwrap_or(30),
            escalation_interval_secs: parse_optional_u64("FORGE_ALERT_ESCALATION_INTERVAL_SECS")?.unwrap_or(30),
        };

        let workflows = WorkflowConfig {
            max_concurrent_executions: parse_optional_u64("FORGE_WORKFLOW_MAX_CONCURRENCY")?.unwrap_or(8) as usize,
        };

        let wasm = WasmConfig {
            data_dir: env::var("FORGE_WASM_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data/plugins")),
            default_memory_limit_bytes: parse_optional_u64("FORGE_WASM_MEMORY_LIMIT_BYTES")?.unwrap_or(64 * 1024 * 1024) as usize,
            default_fuel_budget: parse_optional_u64("FORGE_WASM_FUEL_BUDGET")?.unwrap_or(10_000_000),
            default_timeout_ms: parse_optional_u64("FORGE_WASM_TIMEOUT_MS")?.unwrap_or(5_000),
            require_signed_plugins: parse_bool_env("FORGE_WASM_REQUIRE_SIGNED")?.unwrap_or(false),
            event_bus_capacity: parse_optional_u64("FORGE_EVENT_BUS_CAPACITY")?.unwrap_or(100) as usize,
        };

        Ok(Self { port, metrics, alerts, workflows, wasm })
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
