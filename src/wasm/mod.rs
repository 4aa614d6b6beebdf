//! WebAssembly plugin host.
//!
//! Grounded directly on the ORCA plugin host reference: `wasmtime::Engine`
//! with fuel metering and epoch-based interruption for CPU budgets, a
//! `StoreLimits` for memory, and a narrow `forge` host ABI registered via
//! `Linker::func_wrap`. Every loaded module gets its own `Store` — no
//! sharing of linear memory across plugins.

pub mod abi;
pub mod memory;
pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use wasmtime::{Config, Engine, Instance, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

use crate::bus::EventBus;
use crate::ids::Id;

use types::{PluginManifest, PluginRecord, PluginState};

#[derive(Debug, Error)]
pub enum WasmError {
    #[error("plugin not found: {0}")]
    PluginNotLoaded(Id),
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("digest mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },
    #[error("plugin signature not verified")]
    SignatureUnverified,
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("invalid host path")]
    InvalidHostPath,
    #[error("wasmtime error: {0}")]
    Engine(String),
}

/// Per-`Store` state, reachable from every host ABI function via
/// `Caller::data()`/`data_mut()`.
pub struct StoreState {
    pub wasi: WasiP1Ctx,
    pub limits: StoreLimits,
    pub plugin_id: Id,
    pub event_bus: Arc<EventBus>,
    pub config: HashMap<String, String>,
    pub data_dir: PathBuf,
    pub http_client: reqwest::Client,
    pub pending_metrics: Vec<(String, f64)>,
    pub last_http_response: Option<Vec<u8>>,
}

struct LoadedPlugin {
    module: Module,
    record: PluginRecord,
    lock: Arc<AsyncMutex<()>>,
}

pub struct PluginHostConfig {
    pub data_dir: PathBuf,
    pub default_memory_limit_bytes: usize,
    pub default_fuel_budget: u64,
    pub default_timeout_ms: u64,
    pub require_signed_plugins: bool,
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/plugins"),
            default_memory_limit_bytes: 64 * 1024 * 1024,
            default_fuel_budget: 10_000_000,
            default_timeout_ms: 5_000,
            require_signed_plugins: false,
        }
    }
}

pub struct PluginHost {
    engine: Engine,
    linker: Linker<StoreState>,
    modules: RwLock<HashMap<Id, LoadedPlugin>>,
    event_bus: Arc<EventBus>,
    config: PluginHostConfig,
    shared_config: HashMap<String, String>,
}

impl PluginHost {
    pub fn new(event_bus: Arc<EventBus>, config: PluginHostConfig, shared_config: HashMap<String, String>) -> Result<Arc<Self>, WasmError> {
        let mut engine_config = Config::new();
        engine_config.consume_fuel(true);
        engine_config.epoch_interruption(true);
        engine_config.async_support(true);
        let engine = Engine::new(&engine_config).map_err(|e| WasmError::Engine(e.to_string()))?;

        let mut linker = Linker::new(&engine);
        preview1::add_to_linker_async(&mut linker, |s: &mut StoreState| &mut s.wasi).map_err(|e| WasmError::Engine(e.to_string()))?;
        abi::register(&mut linker).map_err(|e| WasmError::Engine(e.to_string()))?;

        Ok(Arc::new(Self {
            engine,
            linker,
            modules: RwLock::new(HashMap::new()),
            event_bus,
            config,
            shared_config,
        }))
    }

    /// Verifies `wasm_bytes` against the manifest's declared sha256 digest,
    /// compiles the module, and registers it in `Installed` state ready to
    /// be loaded.
    pub async fn install(&self, manifest: PluginManifest, wasm_bytes: &[u8]) -> Result<Id, WasmError> {
        let computed = hex::encode(Sha256::digest(wasm_bytes));
        let expected = manifest.wasm_digest.to_lowercase();
        if computed != expected {
            return Err(WasmError::HashMismatch { expected, computed });
        }
        if self.config.require_signed_plugins {
            return Err(WasmError::SignatureUnverified);
        }

        let module = Module::new(&self.engine, wasm_bytes).map_err(|e| WasmError::Engine(e.to_string()))?;
        let record = PluginRecord::new_installed(manifest, chrono::Utc::now());
        let id = record.id;
        self.modules.write().insert(
            id,
            LoadedPlugin { module, record, lock: Arc::new(AsyncMutex::new(())) },
        );
        Ok(id)
    }

    pub fn state(&self, id: Id) -> Option<PluginState> {
        self.modules.read().get(&id).map(|p| p.record.state)
    }

    pub async fn unload(&self, id: Id) -> Result<(), WasmError> {
        let lock = {
            let modules = self.modules.read();
            modules.get(&id).map(|p| p.lock.clone()).ok_or(WasmError::PluginNotLoaded(id))?
        };
        let _guard = lock.lock().await;
        self.modules.write().remove(&id).ok_or(WasmError::PluginNotLoaded(id))?;
        Ok(())
    }

    /// Instantiates (on demand) and calls `function`, enforcing the
    /// manifest's fuel and timeout budgets. Per-plugin lock serializes
    /// concurrent calls into the same module instance
    pub async fn call_function(&self, id: Id, function: &str, args: &[u8]) -> Result<Vec<u8>, WasmError> {
        let (module, manifest, lock) = {
            let modules = self.modules.read();
            let plugin = modules.get(&id).ok_or(WasmError::PluginNotLoaded(id))?;
            (plugin.module.clone(), plugin.record.manifest.clone(), plugin.lock.clone())
        };
        let _guard = lock.lock().await;
        self.set_state(id, PluginState::Calling);

        let result = self.call_function_locked(&module, &manifest, id, function, args).await;

        self.set_state(id, if result.is_ok() { PluginState::Ready } else { PluginState::ExecutionFailed });
        result
    }

    async fn call_function_locked(
        &self,
        module: &Module,
        manifest: &PluginManifest,
        id: Id,
        function: &str,
        args: &[u8],
    ) -> Result<Vec<u8>, WasmError> {
        let wasi = WasiCtxBuilder::new().build_p1();
        let limits = StoreLimitsBuilder::new()
            .memory_size(manifest.memory_limit_bytes.max(1) as usize)
            .build();
        let state = StoreState {
            wasi,
            limits,
            plugin_id: id,
            event_bus: self.event_bus.clone(),
            config: self.shared_config.clone(),
            data_dir: self.config.data_dir.join(id.to_string()),
            http_client: reqwest::Client::new(),
            pending_metrics: Vec::new(),
            last_http_response: None,
        };
        let mut store = Store::new(&self.engine, state);
        store.limiter(|s| &mut s.limits);
        store
            .set_fuel(manifest.fuel_budget.max(1))
            .map_err(|e| WasmError::Engine(e.to_string()))?;
        store.set_epoch_deadline(1);

        let engine = self.engine.clone();
        let timeout = Duration::from_millis(manifest.timeout_ms.max(1));
        let watchdog = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            engine.increment_epoch();
        });

        let instance = self
            .linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(|e| WasmError::ExecutionFailed(e.to_string()))?;

        let result = self.invoke(&mut store, &instance, function, args).await;
        watchdog.abort();
        result
    }

    async fn invoke(&self, store: &mut Store<StoreState>, instance: &Instance, function: &str, args: &[u8]) -> Result<Vec<u8>, WasmError> {
        let memory = instance
            .get_memory(&mut *store, "memory")
            .ok_or_else(|| WasmError::ExecutionFailed("guest exports no memory".into()))?;
        let (arg_ptr, arg_len) = memory::guest_alloc_and_write(store, instance, memory, args).await;

        let func = instance
            .get_typed_func::<(u32, u32), (u32, u32)>(&mut *store, function)
            .map_err(|_| WasmError::FunctionNotFound(function.to_string()))?;

        let (out_ptr, out_len) = func
            .call_async(&mut *store, (arg_ptr, arg_len))
            .await
            .map_err(|e| WasmError::ExecutionFailed(e.to_string()))?;

        memory::read_bytes(store, memory, out_ptr, out_len).ok_or_else(|| WasmError::ExecutionFailed("guest returned an out-of-bounds buffer".into()))
    }

    fn set_state(&self, id: Id, new_state: PluginState) {
        if let Some(plugin) = self.modules.write().get_mut(&id) {
            plugin.record.state = new_state;
        }
    }
}
