//! # Ingestion
//!
//! Per-device frame queues between a device's stream callback (producer)
//! and its capture worker (consumer).
//!
//! Responsibilities:
//! - Bounded FIFO per device, no frames are ever dropped from the head
//! - Backpressure: once the queue is at its cap the producer pauses and
//!   rejects further frames until the queue drains
//! - Queue metrics
//!
//! ## Usage Example
//!
//! ```
//! use bytes::Bytes;
//! use contracts::{FrameRecord, FrameSource};
//! use ingestion::{frame_queue, BackpressureConfig};
//!
//! let (producer, mut receiver) = frame_queue("40123456".into(), BackpressureConfig::new(2));
//! producer.push(FrameRecord::new(0, 10, Bytes::new())).unwrap();
//! assert_eq!(receiver.try_pop().map(|f| f.frame_index), Some(0));
//! ```

mod config;
mod error;
mod queue;

pub use config::{BackpressureConfig, MetricsSnapshot, QueueMetrics};
pub use error::{IngestionError, Result};
pub use queue::{frame_queue, FrameProducer, FrameReceiver};
