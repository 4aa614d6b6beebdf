//! Bounded ingestion buffer sitting in front of the metric store.
//!
//! Producers never block: once the buffer is at capacity, incoming samples
//! are dropped and counted rather than applying backpressure — the same
//! degrade-before-you-stall preference `RotatingWriter`'s non-blocking
//! write-or-drop logging applies on the request path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::types::MetricSample;

pub struct MetricBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<MetricSample>>,
    dropped_total: AtomicU64,
}

impl MetricBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Returns `true` when the push filled the buffer to capacity, a signal
    /// the caller should wake the flusher immediately.
    pub fn push(&self, sample: MetricSample) -> bool {
        let mut q = self.queue.lock();
        if q.len() >= self.capacity {
            drop(q);
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        q.push_back(sample);
        q.len() >= self.capacity
    }

    pub fn drain(&self) -> Vec<MetricSample> {
        let mut q = self.queue.lock();
        q.drain(..).collect()
    }

    /// Puts samples back at the front after a failed persist attempt. Any
    /// that no longer fit are dropped and counted — retrying forever would
    /// let a wedged store grow the buffer unbounded.
    pub fn requeue(&self, samples: Vec<MetricSample>) {
        let mut q = self.queue.lock();
        let spare = self.capacity.saturating_sub(q.len());
        let keep = samples.len().min(spare);
        let dropped = samples.len() - keep;
        for sample in samples.into_iter().take(keep).rev() {
            q.push_front(sample);
        }
        if dropped > 0 {
            self.dropped_total.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{MetricKind, Tags};
    use chrono::Utc;

    fn sample(n: &str) -> MetricSample {
        MetricSample {
            name: n.to_string(),
            kind: MetricKind::Gauge,
            value: 1.0,
            tags: Tags::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn drops_and_counts_past_capacity() {
        let buf = MetricBuffer::new(2);
        assert!(!buf.push(sample("a")));
        assert!(buf.push(sample("b")));
        assert!(!buf.push(sample("c")));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.dropped_total(), 1);
    }

    #[test]
    fn requeue_preserves_order_and_drops_overflow() {
        let buf = MetricBuffer::new(2);
        buf.push(sample("kept"));
        buf.requeue(vec![sample("a"), sample("b")]);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.dropped_total(), 1);
        let drained = buf.drain();
        assert_eq!(drained[0].name, "a");
    }
}
