//! WorkerHandle - a capture worker running on its own OS thread

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use contracts::DeviceId;
use tracing::{debug, error};

use crate::error::{CaptureError, Result};
use crate::metrics::WorkerMetrics;
use crate::worker::{CaptureWorker, WorkerOutcome};

pub struct WorkerHandle {
    device_id: DeviceId,
    metrics: Arc<WorkerMetrics>,
    thread: JoinHandle<WorkerOutcome>,
}

impl WorkerHandle {
    /// Spawn `worker` on a thread named `capture-<serial>`
    pub fn spawn(worker: CaptureWorker) -> Result<Self> {
        let device_id = worker.device_id().clone();
        let metrics = worker.metrics();
        let thread = thread::Builder::new()
            .name(format!("capture-{device_id}"))
            .spawn(move || worker.run())
            .map_err(|source| CaptureError::Spawn {
                device: device_id.clone(),
                source,
            })?;
        debug!(device = %device_id, "capture worker spawned");

        Ok(Self {
            device_id,
            metrics,
            thread,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker; a panic becomes a `Panicked` outcome
    pub fn join(self) -> WorkerOutcome {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(device = %self.device_id, "capture worker panicked");
                WorkerOutcome::panicked(self.device_id, self.metrics.snapshot())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::FrameSink;
    use crate::worker::tests::{frame, rig, sraw_sink};
    use crate::worker::WorkerConfig;
    use contracts::{FrameRecord, HostClock, StopReason, SystemHostClock};
    use devices::SimDeviceSpec;
    use std::path::PathBuf;

    struct PanickingSink;

    impl FrameSink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }
        fn write(&mut self, _frame: &FrameRecord) -> Result<()> {
            panic!("boom");
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn files(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn config() -> WorkerConfig {
        let host = Arc::new(SystemHostClock);
        let deadline = host.now_ns() + 50_000_000;
        WorkerConfig::new(host, deadline)
    }

    #[test]
    fn test_spawn_and_join() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(dir.path(), SimDeviceSpec::new("21"), 10);
        for k in 0..3 {
            rig.producer.push(frame(k)).unwrap();
        }
        let handle = WorkerHandle::spawn(CaptureWorker::new(
            rig.device,
            rig.source,
            sraw_sink(dir.path(), "21"),
            rig.log,
            config(),
        ))
        .unwrap();
        assert_eq!(handle.device_id().as_str(), "21");

        let outcome = handle.join();
        assert_eq!(outcome.stop_reason, StopReason::Deadline);
        assert_eq!(outcome.frames_written, 3);
    }

    #[test]
    fn test_backpressure_stops_one_device_only() {
        const CAPACITY: usize = 500;
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(SystemHostClock);
        let deadline = host.now_ns() + 2_000_000_000;
        let config = WorkerConfig::new(Arc::clone(&host) as Arc<dyn HostClock>, deadline);

        // "30" hits its cap before the session starts
        let full = rig(dir.path(), SimDeviceSpec::new("30"), CAPACITY);
        for k in 0..CAPACITY as u64 {
            full.producer.push(frame(k)).unwrap();
        }
        assert!(full.producer.is_paused());

        let mut siblings = Vec::new();
        let mut feeders = Vec::new();
        for serial in ["31", "32"] {
            let rig = rig(dir.path(), SimDeviceSpec::new(serial), CAPACITY);
            let producer = rig.producer;
            feeders.push(std::thread::spawn(move || {
                for k in 0..20 {
                    producer.push(frame(k)).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }));
            let handle = WorkerHandle::spawn(CaptureWorker::new(
                rig.device,
                rig.source,
                sraw_sink(dir.path(), serial),
                rig.log,
                config.clone(),
            ))
            .unwrap();
            siblings.push((rig.backend, handle));
        }

        let early = WorkerHandle::spawn(CaptureWorker::new(
            full.device,
            full.source,
            sraw_sink(dir.path(), "30"),
            full.log,
            config.clone(),
        ))
        .unwrap()
        .join();
        assert!(host.now_ns() < deadline, "paused device ran to the deadline");
        assert_eq!(early.stop_reason, StopReason::Backpressure);
        assert!(early.paused);
        assert_eq!(early.frames_written, CAPACITY as u64);

        for feeder in feeders {
            feeder.join().unwrap();
        }
        for (backend, handle) in siblings {
            assert!(!handle.is_finished());
            let outcome = handle.join();
            assert_eq!(outcome.stop_reason, StopReason::Deadline);
            assert!(!outcome.paused);
            assert_eq!(outcome.frames_written, 20);
            assert!(backend.snapshot(outcome.device_id.as_str()).unwrap().closed);
        }
        assert!(host.now_ns() >= deadline);
    }

    #[test]
    fn test_panic_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let rig = rig(dir.path(), SimDeviceSpec::new("22"), 10);
        rig.producer.push(frame(0)).unwrap();
        let handle = WorkerHandle::spawn(CaptureWorker::new(
            rig.device,
            rig.source,
            Box::new(PanickingSink),
            rig.log,
            config(),
        ))
        .unwrap();

        let outcome = handle.join();
        assert_eq!(outcome.stop_reason, StopReason::Panicked);
        assert_eq!(outcome.frames_written, 0);
        assert_eq!(outcome.teardown_errors, ["capture_loop: panicked"]);
        assert!(!outcome.metrics.running);

        // the panic did not skip teardown
        let snap = rig.backend.snapshot("22").unwrap();
        assert!(snap.closed);
        assert!(!snap.acquiring);
        assert!(rig.producer.push(frame(1)).is_err());
        let rows = sraw::read_metadata_log(&dir.path().join("cam22.csv")).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
