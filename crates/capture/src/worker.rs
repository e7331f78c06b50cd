//! CaptureWorker - drains one device's frame queue into its sink
//!
//! ```text
//! Idle -> Acquiring -> Draining -> Stopped
//! ```
//!
//! The loop never blocks on the queue: an empty pop sleeps for one poll
//! interval so the deadline, the stop flag and sink liveness are seen
//! promptly. Teardown attempts every step and reports each failure.

use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contracts::{
    DeviceClock, DeviceId, DeviceReport, FrameRecord, FrameSource, HostClock, StopReason,
};
use sraw::MetadataLogWriter;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::metrics::{WorkerMetrics, WorkerMetricsSnapshot};
use crate::sinks::FrameSink;

/// Metadata log as written by a worker
pub type MetadataLog = MetadataLogWriter<BufWriter<File>>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
const DEFAULT_SINK_FLUSH_EVERY: u64 = 30;

/// Settings shared by all workers of a session
#[derive(Clone)]
pub struct WorkerConfig {
    /// Host-clock instant at which recording ends
    pub deadline_ns: i64,
    pub poll_interval: Duration,
    /// Flush the sink every N frames
    pub sink_flush_every: u64,
    pub host: Arc<dyn HostClock>,
    /// Cooperative cancellation
    pub stop: Arc<AtomicBool>,
}

impl WorkerConfig {
    pub fn new(host: Arc<dyn HostClock>, deadline_ns: i64) -> Self {
        Self {
            deadline_ns,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sink_flush_every: DEFAULT_SINK_FLUSH_EVERY,
            host,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_sink_flush_every(mut self, frames: u64) -> Self {
        self.sink_flush_every = frames.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Acquiring,
    Draining,
    Stopped,
}

/// What a worker reports back when it finishes
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub device_id: DeviceId,
    pub frames_written: u64,
    pub stop_reason: StopReason,
    /// Queue was paused by backpressure at stop time
    pub paused: bool,
    pub files: Vec<PathBuf>,
    /// `"<step>: <error>"` for each failed teardown step
    pub teardown_errors: Vec<String>,
    pub metrics: WorkerMetricsSnapshot,
}

impl WorkerOutcome {
    /// Outcome for a worker thread that panicked
    pub fn panicked(device_id: DeviceId, metrics: WorkerMetricsSnapshot) -> Self {
        Self {
            device_id,
            frames_written: metrics.frames_written,
            stop_reason: StopReason::Panicked,
            paused: false,
            files: Vec::new(),
            teardown_errors: vec!["worker: thread panicked".to_string()],
            metrics,
        }
    }

    pub fn into_report(self, expected_frames: u64) -> DeviceReport {
        let mut report = DeviceReport::new(self.device_id, expected_frames, self.frames_written);
        report.files = self.files;
        report.stop_reason = self.stop_reason;
        report.paused = self.paused;
        report.teardown_errors = self.teardown_errors;
        report
    }
}

pub struct CaptureWorker {
    device: Box<dyn DeviceClock>,
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    log: Option<MetadataLog>,
    config: WorkerConfig,
    metrics: Arc<WorkerMetrics>,
    state: WorkerState,
    frames: u64,
}

impl CaptureWorker {
    pub fn new(
        device: Box<dyn DeviceClock>,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        log: MetadataLog,
        config: WorkerConfig,
    ) -> Self {
        Self {
            device,
            source,
            sink,
            log: Some(log),
            config,
            metrics: Arc::new(WorkerMetrics::new()),
            state: WorkerState::Idle,
            frames: 0,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        self.device.device_id()
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Start acquisition, capture until a stop condition, then tear down
    #[instrument(name = "capture_worker_run", skip(self), fields(device = %self.device.device_id()))]
    pub fn run(mut self) -> WorkerOutcome {
        let id = self.device.device_id().clone();
        self.metrics.set_running(true);
        let mut teardown_errors = Vec::new();

        let stop_reason = match self.device.start_acquisition() {
            Ok(()) => {
                self.state = WorkerState::Acquiring;
                info!(deadline_ns = self.config.deadline_ns, sink = self.sink.name(), "acquisition started");
                match panic::catch_unwind(AssertUnwindSafe(|| self.capture_loop(&id))) {
                    Ok(reason) => reason,
                    Err(_) => {
                        error!(frames = self.frames, "capture loop panicked, tearing down");
                        teardown_errors.push("capture_loop: panicked".to_string());
                        StopReason::Panicked
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "failed to start acquisition");
                StopReason::AcquisitionFailed
            }
        };

        self.state = WorkerState::Draining;
        let paused = self.source.is_paused();
        teardown_errors.extend(self.teardown(&id));
        let files = self.sink.files();
        self.state = WorkerState::Stopped;
        self.metrics.set_running(false);

        observability::record_worker_stopped(&id, stop_reason);
        info!(
            frames = self.frames,
            reason = %stop_reason,
            paused,
            files = files.len(),
            teardown_failures = teardown_errors.len(),
            "capture worker stopped"
        );

        WorkerOutcome {
            device_id: id,
            frames_written: self.frames,
            stop_reason,
            paused,
            files,
            teardown_errors,
            metrics: self.metrics.snapshot(),
        }
    }

    fn capture_loop(&mut self, id: &DeviceId) -> StopReason {
        loop {
            if self.config.stop.load(Ordering::Acquire) {
                info!("stop requested");
                return StopReason::Cancelled;
            }
            if self.config.host.now_ns() >= self.config.deadline_ns {
                debug!("deadline reached");
                return StopReason::Deadline;
            }
            if !self.sink.is_alive() {
                warn!(sink = self.sink.name(), "sink terminated unexpectedly, stopping early");
                self.sink_failed(id);
                return StopReason::SinkFailure;
            }

            let Some(frame) = self.source.try_pop() else {
                if self.source.is_paused() {
                    warn!(frames = self.frames, "queue paused by backpressure, stopping early");
                    return StopReason::Backpressure;
                }
                self.metrics.record_empty_poll();
                thread::sleep(self.config.poll_interval);
                continue;
            };

            if let Err(e) = self.persist(&frame) {
                error!(frame_index = frame.frame_index, error = %e, "failed to persist frame");
                self.sink_failed(id);
                return StopReason::SinkFailure;
            }
            self.frames += 1;
            self.metrics.record_frame(frame.payload_size());
            observability::record_frame_written(id);

            if self.frames % self.config.sink_flush_every == 0 {
                if let Err(e) = self.sink.flush() {
                    error!(error = %e, "sink flush failed");
                    self.sink_failed(id);
                    return StopReason::SinkFailure;
                }
            }
        }
    }

    /// Metadata row first, then the payload
    fn persist(&mut self, frame: &FrameRecord) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.append(frame.frame_index, frame.timestamp_ns)?;
        }
        self.sink.write(frame)
    }

    fn sink_failed(&self, id: &DeviceId) {
        self.metrics.record_sink_failure();
        observability::record_sink_failure(id);
    }

    fn teardown(&mut self, id: &DeviceId) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.finish() {
                teardown_failed(&mut errors, id, "metadata_log", e);
            }
        }
        if let Err(e) = self.sink.flush() {
            teardown_failed(&mut errors, id, "sink_flush", e);
        }
        if let Err(e) = self.sink.close() {
            teardown_failed(&mut errors, id, "sink_close", e);
        }
        if let Err(e) = self.device.stop_acquisition() {
            teardown_failed(&mut errors, id, "stop_acquisition", e);
        }
        self.source.close();
        if let Err(e) = self.device.close() {
            teardown_failed(&mut errors, id, "close_device", e);
        }

        errors
    }
}

/// A worker dropped before it ran (e.g. its thread never spawned) still
/// disarms and releases its device.
impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.state == WorkerState::Stopped {
            return;
        }
        let id = self.device.device_id().clone();
        if self.state == WorkerState::Idle {
            if let Err(e) = self.device.cancel_schedule() {
                warn!(device = %id, error = %e, "schedule cancel failed");
            }
        }
        let errors = self.teardown(&id);
        self.state = WorkerState::Stopped;
        self.metrics.set_running(false);
        debug!(device = %id, failures = errors.len(), "unrun capture worker released");
    }
}

fn teardown_failed(errors: &mut Vec<String>, id: &DeviceId, step: &str, e: impl Display) {
    warn!(device = %id, step, error = %e, "teardown step failed");
    errors.push(format!("{step}: {e}"));
}
