//! Plugin record data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Installed,
    Loaded,
    Ready,
    Calling,
    Unloaded,
    HashMismatch,
    ExecutionFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub wasm_digest: String,
    pub exported_functions: Vec<String>,
    pub memory_limit_bytes: u64,
    pub fuel_budget: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    pub id: Id,
    pub manifest: PluginManifest,
    pub state: PluginState,
    pub installed_at: DateTime<Utc>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PluginRecord {
    pub fn new_installed(manifest: PluginManifest, now: DateTime<Utc>) -> Self {
        Self {
            id: Id::new(),
            manifest,
            state: PluginState::Installed,
            installed_at: now,
            loaded_at: None,
            last_error: None,
        }
    }
}
