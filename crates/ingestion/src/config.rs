//! Backpressure configuration and metrics

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use contracts::DEFAULT_QUEUE_CAPACITY;

/// Backpressure configuration
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Queue cap; reaching it pauses ingestion
    pub capacity: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl BackpressureConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

/// Queue metrics, shared by producer and consumer
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub frames_received: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub pause_events: AtomicU64,
    pub queue_len: AtomicUsize,
    pub high_water: AtomicUsize,
    pub paused: AtomicBool,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pause(&self) {
        self.pause_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        self.high_water.fetch_max(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            pause_events: self.pause_events.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
            paused: self.paused.load(Ordering::Acquire),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub pause_events: u64,
    pub queue_len: usize,
    pub high_water: usize,
    pub paused: bool,
}
