//! Host ABI: every function a guest plugin can import, all under the single
//! `forge` namespace. Argument/return convention follows the
//! ORCA reference host — `(ptr, len)` pairs into the guest's own memory,
//! negative `i32` returns for error codes.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use wasmtime::{Caller, Linker};

use crate::bus::BusEvent;

use super::memory::{caller_memory, read_bytes, write_bytes};
use super::StoreState;

const ERR_INVALID_ARGS: i32 = -1;
const ERR_BUFFER_TOO_SMALL: i32 = -2;
const ERR_EVENT_BUS_FULL: i32 = -3;
const ERR_SANDBOX_VIOLATION: i32 = -4;
const ERR_IO: i32 = -5;
const MAX_HTTP_BODY: usize = 10 * 1024 * 1024;
const MAX_FILE_READ: usize = 10 * 1024 * 1024;

fn guest_string(caller: &mut Caller<'_, StoreState>, ptr: u32, len: u32) -> Option<String> {
    let memory = caller_memory(caller)?;
    let bytes = read_bytes(caller, memory, ptr, len)?;
    String::from_utf8(bytes).ok()
}

/// Rejects absolute paths and `..` components so a plugin can only ever
/// touch files inside its configured data directory.
fn sandboxed_path(data_dir: &Path, requested: &str) -> Option<PathBuf> {
    let requested = Path::new(requested);
    if requested.is_absolute() || requested.components().any(|c| c == Component::ParentDir) {
        return None;
    }
    Some(data_dir.join(requested))
}

pub fn register(linker: &mut Linker<StoreState>) -> wasmtime::Result<()> {
    linker.func_wrap("forge", "log", |mut caller: Caller<'_, StoreState>, ptr: u32, len: u32| -> i32 {
        match guest_string(&mut caller, ptr, len) {
            Some(msg) => {
                tracing::info!(target: "forge::plugin", "{msg}");
                0
            }
            None => ERR_INVALID_ARGS,
        }
    })?;

    linker.func_wrap(
        "forge",
        "metric_record",
        |mut caller: Caller<'_, StoreState>, name_ptr: u32, name_len: u32, value: f64| -> i32 {
            match guest_string(&mut caller, name_ptr, name_len) {
                Some(name) => {
                    caller.data_mut().pending_metrics.push((name, value));
                    0
                }
                None => ERR_INVALID_ARGS,
            }
        },
    )?;

    linker.func_wrap(
        "forge",
        "emit_event",
        |mut caller: Caller<'_, StoreState>, type_ptr: u32, type_len: u32, payload_ptr: u32, payload_len: u32| -> i32 {
            let Some(event_type) = guest_string(&mut caller, type_ptr, type_len) else {
                return ERR_INVALID_ARGS;
            };
            let memory = match caller_memory(&mut caller) {
                Some(m) => m,
                None => return ERR_INVALID_ARGS,
            };
            let Some(payload_bytes) = read_bytes(&caller, memory, payload_ptr, payload_len) else {
                return ERR_INVALID_ARGS;
            };
            let payload = serde_json::from_slice(&payload_bytes).unwrap_or(serde_json::Value::Null);
            let plugin_id = caller.data().plugin_id;
            let bus = caller.data().event_bus.clone();
            let event = BusEvent { plugin_id: Some(plugin_id), event_type, payload };
            if bus.publish(event) {
                0
            } else {
                ERR_EVENT_BUS_FULL
            }
        },
    )?;

    linker.func_wrap(
        "forge",
        "get_config",
        |mut caller: Caller<'_, StoreState>, key_ptr: u32, key_len: u32, out_ptr: u32, out_cap: u32| -> i32 {
            let Some(key) = guest_string(&mut caller, key_ptr, key_len) else {
                return ERR_INVALID_ARGS;
            };
            let value = match caller.data().config.get(&key) {
                Some(v) => v.clone(),
                None => return ERR_INVALID_ARGS,
            };
            let bytes = value.into_bytes();
            if bytes.len() as u32 > out_cap {
                return ERR_BUFFER_TOO_SMALL;
            }
            let memory = match caller_memory(&mut caller) {
                Some(m) => m,
                None => return ERR_INVALID_ARGS,
            };
            if write_bytes(&mut caller, memory, out_ptr, &bytes) {
                bytes.len() as i32
            } else {
                ERR_INVALID_ARGS
            }
        },
    )?;

    linker.func_wrap(
        "forge",
        "read_file",
        |mut caller: Caller<'_, StoreState>, path_ptr: u32, path_len: u32, out_ptr: u32, out_cap: u32| -> i32 {
            let Some(path) = guest_string(&mut caller, path_ptr, path_len) else {
                return ERR_INVALID_ARGS;
            };
            let data_dir = caller.data().data_dir.clone();
            let Some(resolved) = sandboxed_path(&data_dir, &path) else {
                return ERR_SANDBOX_VIOLATION;
            };
            let contents = match std::fs::read(&resolved) {
                Ok(c) => c,
                Err(_) => return ERR_IO,
            };
            let truncated = &contents[..contents.len().min(MAX_FILE_READ).min(out_cap as usize)];
            let memory = match caller_memory(&mut caller) {
                Some(m) => m,
                None => return ERR_INVALID_ARGS,
            };
            if write_bytes(&mut caller, memory, out_ptr, truncated) {
                truncated.len() as i32
            } else {
                ERR_INVALID_ARGS
            }
        },
    )?;

    linker.func_wrap(
        "forge",
        "write_file",
        |mut caller: Caller<'_, StoreState>, path_ptr: u32, path_len: u32, data_ptr: u32, data_len: u32| -> i32 {
            let Some(path) = guest_string(&mut caller, path_ptr, path_len) else {
                return ERR_INVALID_ARGS;
            };
            if data_len as usize > MAX_FILE_READ {
                return ERR_BUFFER_TOO_SMALL;
            }
            let data_dir = caller.data().data_dir.clone();
            let Some(resolved) = sandboxed_path(&data_dir, &path) else {
                return ERR_SANDBOX_VIOLATION;
            };
            let memory = match caller_memory(&mut caller) {
                Some(m) => m,
                None => return ERR_INVALID_ARGS,
            };
            let Some(bytes) = read_bytes(&caller, memory, data_ptr, data_len) else {
                return ERR_INVALID_ARGS;
            };
            if let Some(parent) = resolved.parent() {
                if std::fs::create_dir_all(parent).is_err() {
                    return ERR_IO;
                }
            }
            match std::fs::write(&resolved, bytes) {
                Ok(()) => 0,
                Err(_) => ERR_IO,
            }
        },
    )?;

    linker.func_wrap_async(
        "forge",
        "http_request",
        |mut caller: Caller<'_, StoreState>, (url_ptr, url_len, timeout_ms): (u32, u32, u32)| {
            Box::new(async move {
                let Some(url) = guest_string(&mut caller, url_ptr, url_len) else {
                    return ERR_INVALID_ARGS;
                };
                let client = caller.data().http_client.clone();
                let result = client
                    .get(&url)
                    .timeout(Duration::from_millis(timeout_ms as u64))
                    .send()
                    .await;
                match result {
                    Ok(resp) => {
                        let status = resp.status().as_u16() as i32;
                        let body = resp.bytes().await.unwrap_or_default();
                        if body.len() > MAX_HTTP_BODY {
                            return ERR_BUFFER_TOO_SMALL;
                        }
                        caller.data_mut().last_http_response = Some(body.to_vec());
                        status
                    }
                    Err(_) => ERR_IO,
                }
            })
        },
    )?;

    Ok(())
}
