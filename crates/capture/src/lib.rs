//! # Capture
//!
//! Per-device capture workers.
//!
//! Responsibilities:
//! - Drain one device's frame queue on a dedicated thread
//! - Write each frame to its metadata log and output sink
//! - Stop on deadline, cancellation, backpressure pause or sink death
//! - Tear down in order: metadata log, sink, acquisition, queue, device

pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;
pub mod worker;

pub use error::{CaptureError, Result};
pub use handle::WorkerHandle;
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use sinks::{open_sink, FrameSink, ProcessByteSink, SrawSink, TranscoderSink};
pub use worker::{CaptureWorker, MetadataLog, WorkerConfig, WorkerOutcome, WorkerState};
