use std::collections::HashMap;

use forge::bus::EventBus;
use forge::ids::Id;
use forge::wasm::types::PluginManifest;
use forge::wasm::{PluginHost, PluginHostConfig, WasmError};
use sha2::{Digest, Sha256};

const TRIVIAL_MODULE: &[u8] = br#"(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    global.get $heap
    local.set $ptr
    global.get $heap
    local.get $size
    i32.add
    global.set $heap
    local.get $ptr)
  (func (export "echo") (param $ptr i32) (param $len i32) (result i32 i32)
    local.get $ptr
    local.get $len)
)"#;

fn manifest(digest: String) -> PluginManifest {
    PluginManifest {
        name: "echo".into(),
        version: "0.1.0".into(),
        wasm_digest: digest,
        exported_functions: vec!["echo".into()],
        memory_limit_bytes: 1 << 20,
        fuel_budget: 1_000_000,
        timeout_ms: 1_000,
    }
}

fn host(require_signed: bool) -> std::sync::Arc<PluginHost> {
    let bus = std::sync::Arc::new(EventBus::new(16));
    PluginHost::new(
        bus,
        PluginHostConfig { require_signed_plugins: require_signed, ..PluginHostConfig::default() },
        HashMap::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn installing_with_a_wrong_digest_is_rejected_before_compilation() {
    let host = host(false);
    let err = host.install(manifest("0".repeat(64)), TRIVIAL_MODULE).await.unwrap_err();
    assert!(matches!(err, WasmError::HashMismatch { .. }));
}

#[tokio::test]
async fn a_correct_digest_installs_the_module() {
    let host = host(false);
    let digest = hex::encode(Sha256::digest(TRIVIAL_MODULE));
    let id = host.install(manifest(digest), TRIVIAL_MODULE).await.unwrap();
    assert!(host.state(id).is_some());
}

#[tokio::test]
async fn signed_plugins_are_required_when_configured() {
    let host = host(true);
    let digest = hex::encode(Sha256::digest(TRIVIAL_MODULE));
    let err = host.install(manifest(digest), TRIVIAL_MODULE).await.unwrap_err();
    assert!(matches!(err, WasmError::SignatureUnverified));
}

#[tokio::test]
async fn calling_an_unknown_plugin_id_fails_without_touching_wasmtime() {
    let host = host(false);
    let err = host.call_function(Id::new(), "echo", b"hi").await.unwrap_err();
    assert!(matches!(err, WasmError::PluginNotLoaded(_)));
}

#[tokio::test]
async fn echo_round_trips_a_payload_through_guest_memory() {
    let host = host(false);
    let digest = hex::encode(Sha256::digest(TRIVIAL_MODULE));
    let id = host.install(manifest(digest), TRIVIAL_MODULE).await.unwrap();
    let out = host.call_function(id, "echo", b"hello").await.unwrap();
    assert_eq!(out, b"hello");
}

#[tokio::test]
async fn unloading_a_plugin_removes_it_from_the_table() {
    let host = host(false);
    let digest = hex::encode(Sha256::digest(TRIVIAL_MODULE));
    let id = host.install(manifest(digest), TRIVIAL_MODULE).await.unwrap();
    host.unload(id).await.unwrap();

    assert!(host.state(id).is_none());
    let err = host.call_function(id, "echo", b"hello").await.unwrap_err();
    assert!(matches!(err, WasmError::PluginNotLoaded(_)));
}

#[tokio::test]
async fn unloading_an_unknown_plugin_id_fails() {
    let host = host(false);
    let err = host.unload(Id::new()).await.unwrap_err();
    assert!(matches!(err, WasmError::PluginNotLoaded(_)));
}
