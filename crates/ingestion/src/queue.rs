//! Bounded per-device frame queue with pause-on-full backpressure

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{DeviceId, FrameRecord, FrameSource};
use metrics::{counter, gauge};
use tracing::{trace, warn};

use crate::config::{BackpressureConfig, QueueMetrics};
use crate::error::{IngestionError, Result};

struct Shared {
    device: DeviceId,
    capacity: usize,
    metrics: QueueMetrics,
}

/// Create a queue for one device.
///
/// The producer half stays with the device stream, the receiver goes to
/// exactly one capture worker.
pub fn frame_queue(device: DeviceId, config: BackpressureConfig) -> (FrameProducer, FrameReceiver) {
    let capacity = config.capacity.max(1);
    let (tx, rx) = async_channel::bounded(capacity);
    let shared = Arc::new(Shared {
        device,
        capacity,
        metrics: QueueMetrics::new(),
    });
    (
        FrameProducer {
            tx,
            shared: Arc::clone(&shared),
        },
        FrameReceiver { rx, shared },
    )
}

/// Producer half, fed from the device stream
pub struct FrameProducer {
    tx: Sender<FrameRecord>,
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Enqueue a frame.
    ///
    /// Once an accepted frame brings the queue to its cap, ingestion is
    /// paused and every later frame is rejected. The pause is latched:
    /// the consumer treats it as a stop signal.
    pub fn push(&self, frame: FrameRecord) -> Result<()> {
        let metrics = &self.shared.metrics;
        if self.is_paused() {
            metrics.record_rejected();
            return Err(self.paused_error());
        }

        match self.tx.try_send(frame) {
            Ok(()) => {
                metrics.record_received();
                let len = self.tx.len();
                metrics.update_queue_len(len);
                gauge!("synccap_queue_depth", "device" => self.shared.device.to_string())
                    .set(len as f64);
                if len >= self.shared.capacity {
                    self.pause(len);
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                metrics.record_rejected();
                self.pause(self.tx.len());
                Err(self.paused_error())
            }
            Err(TrySendError::Closed(_)) => {
                trace!(device = %self.shared.device, "frame queue closed");
                Err(IngestionError::QueueClosed {
                    device: self.shared.device.to_string(),
                })
            }
        }
    }

    fn paused_error(&self) -> IngestionError {
        IngestionError::Paused {
            device: self.shared.device.to_string(),
            depth: self.tx.len(),
            capacity: self.shared.capacity,
        }
    }

    fn pause(&self, depth: usize) {
        let metrics = &self.shared.metrics;
        if !metrics.paused.swap(true, Ordering::AcqRel) {
            metrics.record_pause();
            counter!("synccap_queue_paused_total", "device" => self.shared.device.to_string())
                .increment(1);
            warn!(
                device = %self.shared.device,
                depth,
                capacity = self.shared.capacity,
                "queue at capacity, pausing ingestion"
            );
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.metrics.paused.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.shared.metrics
    }
}

/// Consumer half, owned by a capture worker
pub struct FrameReceiver {
    rx: Receiver<FrameRecord>,
    shared: Arc<Shared>,
}

impl FrameReceiver {
    pub fn device(&self) -> &DeviceId {
        &self.shared.device
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.shared.metrics
    }
}

impl FrameSource for FrameReceiver {
    fn try_pop(&mut self) -> Option<FrameRecord> {
        let frame = self.rx.try_recv().ok()?;
        self.shared.metrics.update_queue_len(self.rx.len());
        Some(frame)
    }

    fn is_paused(&self) -> bool {
        self.shared.metrics.paused.load(Ordering::Acquire)
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn close(&mut self) {
        self.rx.close();
    }
}
