//! Internal event bus.
//!
//! A bounded in-process topic bus consumed by alerts, workflows and
//! plugins. Publish is non-blocking and drops on full; subscribe is a
//! single-consumer drain via [`EventBus::drain`]. Same style as
//! `AC_CACHE`'s small shared concurrent structure guarded by a
//! low-contention primitive rather than a heavyweight pub/sub crate — no
//! mature in-process broker dependency is worth pulling in here, so a
//! bounded `parking_lot::Mutex<VecDeque<_>>` is the idiomatic minimal
//! choice.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub plugin_id: Option<Id>,
    pub event_type: String,
    pub payload: Value,
}

pub struct EventBus {
    capacity: usize,
    queue: Mutex<VecDeque<BusEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Non-blocking enqueue. Returns `false` when the bus is full (caller
    /// maps this to `EventBusFull` / `-3` at the host ABI boundary).
    pub fn publish(&self, event: BusEvent) -> bool {
        let mut q = self.queue.lock();
        if q.len() >= self.capacity {
            return false;
        }
        q.push_back(event);
        true
    }

    /// Drain every currently queued event. Single-consumer; concurrent
    /// drainers will each see a disjoint subset, never duplicates.
    pub fn drain(&self) -> Vec<BusEvent> {
        let mut q = self.queue.lock();
        q.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
