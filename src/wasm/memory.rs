//! Guest linear-memory helpers shared by the host ABI functions.
//!
//! Mirrors the ORCA reference host: host functions exchange byte buffers
//! with the guest as `(ptr, len)` pairs into the guest's own exported
//! `memory`, allocated by calling the guest's exported `malloc` (or `alloc`)
//! function rather than the host reaching into memory it doesn't own.

use wasmtime::{AsContext, AsContextMut, Caller, Memory};

use super::StoreState;

pub fn read_bytes(caller: &impl AsContext<Data = StoreState>, memory: Memory, ptr: u32, len: u32) -> Option<Vec<u8>> {
    let data = memory.data(caller.as_context());
    let start = ptr as usize;
    let end = start.checked_add(len as usize)?;
    data.get(start..end).map(|s| s.to_vec())
}

pub fn write_bytes(caller: &mut impl AsContextMut<Data = StoreState>, memory: Memory, ptr: u32, bytes: &[u8]) -> bool {
    let data = memory.data_mut(caller.as_context_mut());
    let start = ptr as usize;
    let Some(end) = start.checked_add(bytes.len()) else { return false };
    if end > data.len() {
        return false;
    }
    data[start..end].copy_from_slice(bytes);
    true
}

/// Calls the guest's exported allocator to reserve `len` bytes and writes
/// `bytes` into the returned region. Returns `(ptr, len)`; `(0, 0)` when the
/// guest exports no allocator — callers log and skip the write in that case
/// rather than guessing at an offset.
pub async fn guest_alloc_and_write(store: &mut wasmtime::Store<StoreState>, instance: &wasmtime::Instance, memory: Memory, bytes: &[u8]) -> (u32, u32) {
    let Some(malloc) = instance
        .get_typed_func::<u32, u32>(&mut *store, "malloc")
        .or_else(|_| instance.get_typed_func::<u32, u32>(&mut *store, "alloc"))
        .ok()
    else {
        tracing::warn!("guest exports no malloc/alloc function, dropping host->guest write");
        return (0, 0);
    };

    let Ok(ptr) = malloc.call_async(&mut *store, bytes.len() as u32).await else {
        return (0, 0);
    };
    if !write_bytes(store, memory, ptr, bytes) {
        return (0, 0);
    }
    (ptr, bytes.len() as u32)
}

pub fn caller_memory(caller: &mut Caller<'_, StoreState>) -> Option<Memory> {
    caller.get_export("memory").and_then(|e| e.into_memory())
}
