//! RecordingSession - sequences one synchronized recording
//!
//! prepare: role gate, offset estimation, trigger scheduling
//! start:   per-device stream, sink and metadata log; one worker thread
//!          per device plus a monitor that joins them and builds the report
//!
//! Any failure moves the session to `Error` after an ordered teardown of
//! everything opened so far.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use capture::{open_sink, CaptureWorker, FrameSink, MetadataLog, WorkerConfig, WorkerHandle};
use chrono::{DateTime, Local};
use contracts::{
    expected_frame_count, ClockOffset, DeviceClock, DeviceConfig, DeviceId, FrameSource,
    HostClock, OutputFormat, RecordingReport, SessionBlueprint,
};
use sraw::{create_metadata_log, metadata_log_name};
use sync_engine::{
    cancel_all, trigger_rates, ClockOffsetEstimator, ScheduleCoordinator, ScheduleOutcome,
    SyncRoleMonitor,
};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::estimate::{gib, DiskEstimate};
use crate::state::{SessionState, StateCell};

pub struct RecordingSession {
    blueprint: SessionBlueprint,
    host: Arc<dyn HostClock>,
    state: StateCell,
    devices: Vec<Box<dyn DeviceClock>>,
    offsets: BTreeMap<DeviceId, ClockOffset>,
    schedule: Option<ScheduleOutcome>,
}

impl RecordingSession {
    pub fn new(blueprint: SessionBlueprint, host: Arc<dyn HostClock>) -> Self {
        Self {
            blueprint,
            host,
            state: StateCell::new(),
            devices: Vec::new(),
            offsets: BTreeMap::new(),
            schedule: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn blueprint(&self) -> &SessionBlueprint {
        &self.blueprint
    }

    pub fn offsets(&self) -> &BTreeMap<DeviceId, ClockOffset> {
        &self.offsets
    }

    pub fn schedule(&self) -> Option<&ScheduleOutcome> {
        self.schedule.as_ref()
    }

    /// Idle -> Preparing -> Scheduled
    ///
    /// Takes ownership of the opened devices. On failure they are torn
    /// down and closed before the error is returned.
    #[instrument(name = "session_prepare", skip(self, devices), fields(device_count = devices.len()))]
    pub fn prepare(&mut self, devices: Vec<Box<dyn DeviceClock>>) -> Result<()> {
        self.require(SessionState::Idle, "prepare")?;
        self.state.set(SessionState::Preparing);
        self.devices = devices;

        match self.run_prepare() {
            Ok(()) => {
                self.state.set(SessionState::Scheduled);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn run_prepare(&mut self) -> Result<()> {
        self.check_device_set()?;

        let estimate = DiskEstimate::for_blueprint(&self.blueprint);
        if self.blueprint.session.output_format == OutputFormat::Raw {
            for d in &estimate.devices {
                info!(serial = %d.serial, frames = d.frames, gib = gib(d.bytes), "estimated raw size");
            }
            warn!(total_gib = gib(estimate.total_bytes), "estimated raw output size for session");
        }

        SyncRoleMonitor::from_config(&self.blueprint.session)?.wait_for_role(&mut self.devices)?;

        self.offsets =
            ClockOffsetEstimator::new(Arc::clone(&self.host)).estimate(&mut self.devices)?;

        let outcome = ScheduleCoordinator::new(Arc::clone(&self.host)).schedule(
            &mut self.devices,
            &self.offsets,
            self.blueprint.session.start_delay_s,
            &trigger_rates(&self.blueprint.devices),
        )?;

        info!(
            host_target_ns = outcome.host_target_ns,
            starts_at = %format_host_ns(outcome.host_target_ns),
            "recording scheduled"
        );
        self.schedule = Some(outcome);
        Ok(())
    }

    /// Every device must appear in the blueprint and vice versa
    fn check_device_set(&self) -> Result<()> {
        for device in &self.devices {
            self.device_config(device.device_id())?;
        }
        for config in &self.blueprint.devices {
            if !self.devices.iter().any(|d| d.device_id() == config.serial.as_str()) {
                return Err(SessionError::MissingDevice {
                    serial: config.serial.clone(),
                });
            }
        }
        Ok(())
    }

    fn device_config(&self, id: &DeviceId) -> Result<&DeviceConfig> {
        self.blueprint
            .devices
            .iter()
            .find(|d| id == d.serial.as_str())
            .ok_or_else(|| SessionError::UnknownDevice { device: id.clone() })
    }

    /// Scheduled -> Recording
    #[instrument(name = "session_start", skip(self), fields(device_count = self.devices.len()))]
    pub fn start(&mut self) -> Result<RecordingHandle> {
        self.require(SessionState::Scheduled, "start")?;
        let Some(schedule) = self.schedule.clone() else {
            return Err(SessionError::InvalidState {
                op: "start",
                state: self.state.get(),
            });
        };

        let session_dir = match create_session_dir(&self.blueprint.session.output_dir) {
            Ok(dir) => dir,
            Err(e) => return Err(self.fail(e)),
        };
        info!(dir = %session_dir.display(), "session directory created");

        let mut stations = self.open_stations(&session_dir);
        if let Some(e) = stations.iter_mut().find_map(|s| s.error.take()) {
            warn!(error = %e, "per-device setup failed, tearing down");
            for station in &mut stations {
                station.teardown();
            }
            self.state.set(SessionState::Error);
            return Err(e);
        }

        let session = &self.blueprint.session;
        let deadline_ns =
            schedule.host_target_ns + (session.duration_s * 1e9).round() as i64;
        let stop = Arc::new(AtomicBool::new(false));
        let worker_config = WorkerConfig::new(Arc::clone(&self.host), deadline_ns)
            .with_stop(Arc::clone(&stop))
            .with_sink_flush_every(session.sink_flush_every);

        let mut handles = Vec::with_capacity(stations.len());
        let mut spawn_error = None;
        let mut pending = stations.into_iter();
        for station in pending.by_ref() {
            let Some(worker) = station.into_worker(worker_config.clone()) else {
                continue;
            };
            // an unspawned worker releases its device when dropped
            match WorkerHandle::spawn(worker) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(error = %e, "failed to spawn capture worker");
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = spawn_error {
            for mut station in pending {
                station.teardown();
            }
            stop.store(true, Ordering::Release);
            for handle in handles {
                handle.join();
            }
            self.state.set(SessionState::Error);
            return Err(e.into());
        }

        self.state.set(SessionState::Recording);
        info!(
            workers = handles.len(),
            deadline_ns,
            duration_s = session.duration_s,
            "recording started"
        );

        let expected: BTreeMap<DeviceId, u64> = self
            .blueprint
            .devices
            .iter()
            .map(|d| {
                (
                    DeviceId::new(&d.serial),
                    expected_frame_count(session.duration_s, d.trigger_interval_fps),
                )
            })
            .collect();
        let monitor = Monitor {
            handles,
            expected,
            state: self.state.clone(),
            session_dir: session_dir.clone(),
            host_target_ns: schedule.host_target_ns,
            duration_s: session.duration_s,
        };
        let monitor = match thread::Builder::new()
            .name("session-monitor".to_string())
            .spawn(move || monitor.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // worker handles went down with the closure; the flag ends the detached workers
                stop.store(true, Ordering::Release);
                self.state.set(SessionState::Error);
                return Err(SessionError::Contract(e.into()));
            }
        };

        Ok(RecordingHandle {
            state: self.state.clone(),
            stop,
            monitor,
            session_dir,
            host_target_ns: schedule.host_target_ns,
        })
    }

    /// Open stream, sink and metadata log for every device, in order.
    ///
    /// Stops at the first failure; the failing station carries the error.
    fn open_stations(&mut self, session_dir: &Path) -> Vec<Station> {
        let devices = std::mem::take(&mut self.devices);
        let mut stations = Vec::with_capacity(devices.len());
        let mut failed = false;

        for device in devices {
            let mut station = Station::new(device);
            if !failed {
                if let Err(e) = self.open_station(&mut station, session_dir) {
                    failed = true;
                    station.error = Some(e);
                }
            }
            stations.push(station);
        }
        stations
    }

    fn open_station(&self, station: &mut Station, session_dir: &Path) -> Result<()> {
        let session = &self.blueprint.session;
        let id = station.device.device_id().clone();
        let config = self.device_config(&id)?;

        let source = station
            .device
            .open_stream(session.queue_capacity)
            .map_err(|e| SessionError::device_setup(&id, "open_stream", e))?;
        station.source = Some(source);

        let log_path = session_dir.join(metadata_log_name(&config.serial));
        let log = create_metadata_log(&log_path, session.metadata_flush_every)
            .map_err(|e| SessionError::device_setup(&id, "metadata_log", e))?;
        station.log = Some(log);

        let sink = open_sink(session_dir, session, &self.blueprint.transcoder, config)
            .map_err(|e| SessionError::device_setup(&id, "open_sink", e))?;
        station.sink = Some(sink);
        Ok(())
    }

    fn require(&self, expected: SessionState, op: &'static str) -> Result<()> {
        let state = self.state.get();
        if state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState { op, state })
        }
    }

    /// Enter `Error`, cancel schedules and close every held device
    fn fail(&mut self, e: SessionError) -> SessionError {
        error!(error = %e, "session failed");
        self.state.set(SessionState::Error);
        self.release_devices();
        e
    }

    /// Cancel any armed schedule, stop and close every device still held
    fn release_devices(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        cancel_all(&mut self.devices);
        for device in &mut self.devices {
            let id = device.device_id().clone();
            if let Err(err) = device.stop_acquisition() {
                teardown_failed(&id, "stop_acquisition", err);
            }
            if let Err(err) = device.close() {
                teardown_failed(&id, "close_device", err);
            }
        }
        self.devices.clear();
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if !self.devices.is_empty() {
            debug!(devices = self.devices.len(), state = ?self.state.get(), "releasing devices on drop");
        }
        self.release_devices();
    }
}

/// Per-device resources between setup and worker spawn
struct Station {
    device: Box<dyn DeviceClock>,
    source: Option<Box<dyn FrameSource>>,
    log: Option<MetadataLog>,
    sink: Option<Box<dyn FrameSink>>,
    error: Option<SessionError>,
}

impl Station {
    fn new(device: Box<dyn DeviceClock>) -> Self {
        Self {
            device,
            source: None,
            log: None,
            sink: None,
            error: None,
        }
    }

    fn into_worker(mut self, config: WorkerConfig) -> Option<CaptureWorker> {
        if self.source.is_none() || self.log.is_none() || self.sink.is_none() {
            self.teardown();
            return None;
        }
        let (Some(source), Some(log), Some(sink)) = (self.source, self.log, self.sink) else {
            return None;
        };
        Some(CaptureWorker::new(self.device, source, sink, log, config))
    }

    /// Metadata log, sink, acquisition, queue, device; every step attempted
    fn teardown(&mut self) {
        let id = self.device.device_id().clone();
        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.finish() {
                teardown_failed(&id, "metadata_log", e);
            }
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                teardown_failed(&id, "sink_close", e);
            }
        }
        if let Err(e) = self.device.cancel_schedule() {
            teardown_failed(&id, "cancel_schedule", e);
        }
        if let Err(e) = self.device.stop_acquisition() {
            teardown_failed(&id, "stop_acquisition", e);
        }
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if let Err(e) = self.device.close() {
            teardown_failed(&id, "close_device", e);
        }
    }
}

fn teardown_failed(id: &DeviceId, step: &str, e: impl Display) {
    warn!(device = %id, step, error = %e, "teardown step failed");
}

/// Joins all workers, then assembles the report
struct Monitor {
    handles: Vec<WorkerHandle>,
    expected: BTreeMap<DeviceId, u64>,
    state: StateCell,
    session_dir: PathBuf,
    host_target_ns: i64,
    duration_s: f64,
}

impl Monitor {
    fn run(self) -> RecordingReport {
        let mut devices = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let outcome = handle.join();
            let expected = self.expected.get(&outcome.device_id).copied().unwrap_or(0);
            let report = outcome.into_report(expected);
            if report.delta != 0 {
                warn!(
                    device = %report.device_id,
                    expected = report.expected_frames,
                    actual = report.actual_frames,
                    delta = report.delta,
                    reason = %report.stop_reason,
                    "frame count differs from expected"
                );
            }
            devices.push(report);
        }
        self.state.advance(SessionState::Stopping);

        let report = RecordingReport {
            session_dir: self.session_dir,
            host_target_ns: self.host_target_ns,
            duration_s: self.duration_s,
            devices,
        };
        info!(
            dir = %report.session_dir.display(),
            total_frames = report.total_frames(),
            all_completed = report.all_completed(),
            "recording finished"
        );
        self.state.advance(SessionState::Idle);
        report
    }
}

/// A running recording
pub struct RecordingHandle {
    state: StateCell,
    stop: Arc<AtomicBool>,
    monitor: JoinHandle<RecordingReport>,
    session_dir: PathBuf,
    host_target_ns: i64,
}

impl RecordingHandle {
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn host_target_ns(&self) -> i64 {
        self.host_target_ns
    }

    /// Shared flag; setting it stops every worker at its next poll
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        info!("stop requested");
        self.stop.store(true, Ordering::Release);
        self.state.advance(SessionState::Stopping);
    }

    pub fn is_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Block until every worker has stopped and torn down
    pub fn wait(self) -> Result<RecordingReport> {
        self.monitor.join().map_err(|_| {
            self.state.set(SessionState::Error);
            SessionError::MonitorPanicked
        })
    }
}

/// `<output_dir>/<YYYYmmdd-HHMMSS>`, suffixed if that already exists
fn create_session_dir(output_dir: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut dir = output_dir.join(&stamp);
    let mut n = 1;
    while dir.exists() {
        dir = output_dir.join(format!("{stamp}-{n}"));
        n += 1;
    }
    fs::create_dir_all(&dir).map_err(|source| SessionError::SessionDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

fn format_host_ns(host_ns: i64) -> String {
    DateTime::from_timestamp_nanos(host_ns)
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}
