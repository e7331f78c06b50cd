//! Simulated devices
//!
//! `SimDevice` implements `DeviceClock` on top of the host clock plus a
//! fixed offset. Once a schedule is committed and acquisition started, a
//! stream thread emits frames at `target + k * interval` (device clock)
//! into the device's frame queue and stops when ingestion pauses.
//! Property names go through the same capability resolution as a real
//! device; failures can be injected per capability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    ContractError, DeviceClock, DeviceConfig, DeviceId, FrameRecord, FrameSource, HostClock,
    PixelFormat, SyncRole, TriggerStep,
};
use ingestion::{frame_queue, BackpressureConfig, FrameProducer, IngestionError};
use rand::Rng;
use tracing::{debug, instrument, trace, warn};

use crate::backend::DeviceBackend;
use crate::capability::{resolve_capabilities, Capability, ResolvedCapabilities};
use crate::error::{DeviceError, Result};

/// Longest single sleep while waiting for a trigger instant
const STREAM_POLL: Duration = Duration::from_millis(2);

/// Which alias family the simulated firmware exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyNaming {
    #[default]
    Standard,
    Gev,
}

/// Behaviour of one simulated device
#[derive(Debug, Clone)]
pub struct SimDeviceSpec {
    pub serial: String,
    /// True device clock offset: `device = host + offset_ns`
    pub offset_ns: i64,
    pub latch_latency: Duration,
    /// Role reported once `unknown_polls` polls have passed
    pub role: SyncRole,
    pub unknown_polls: u32,
    pub naming: PropertyNaming,
    /// Capabilities not exposed at all
    pub hidden: Vec<Capability>,
    /// Capabilities whose calls fail
    pub failures: Vec<Capability>,
    pub fail_open: bool,
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    /// Bound of uniform timestamp jitter
    pub jitter_ns: i64,
    /// Stop emitting after this many frames
    pub frame_limit: Option<u64>,
}

impl SimDeviceSpec {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            offset_ns: 0,
            latch_latency: Duration::ZERO,
            role: SyncRole::Follower,
            unknown_polls: 0,
            naming: PropertyNaming::Standard,
            hidden: Vec::new(),
            failures: Vec::new(),
            fail_open: false,
            width: 64,
            height: 48,
            pixel_format: PixelFormat::BayerGr8,
            jitter_ns: 0,
            frame_limit: None,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(&config.serial).with_resolution(config.width, config.height, config.pixel_format)
    }

    pub fn with_offset_ns(mut self, offset_ns: i64) -> Self {
        self.offset_ns = offset_ns;
        self
    }

    pub fn with_latch_latency(mut self, latency: Duration) -> Self {
        self.latch_latency = latency;
        self
    }

    pub fn with_role(mut self, role: SyncRole, unknown_polls: u32) -> Self {
        self.role = role;
        self.unknown_polls = unknown_polls;
        self
    }

    pub fn with_naming(mut self, naming: PropertyNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.hidden.push(capability);
        self
    }

    pub fn failing(mut self, capability: Capability) -> Self {
        self.failures.push(capability);
        self
    }

    pub fn with_resolution(mut self, width: u16, height: u16, pixel_format: PixelFormat) -> Self {
        self.width = width;
        self.height = height;
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_jitter_ns(mut self, jitter_ns: i64) -> Self {
        self.jitter_ns = jitter_ns.max(0);
        self
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Property names this firmware exposes
    pub fn property_names(&self) -> Vec<String> {
        Capability::ALL
            .iter()
            .filter(|c| !self.hidden.contains(c))
            .map(|c| {
                let aliases = c.aliases();
                let name = match self.naming {
                    PropertyNaming::Standard => aliases[0],
                    PropertyNaming::Gev => aliases.get(1).copied().unwrap_or(aliases[0]),
                };
                name.to_string()
            })
            .collect()
    }
}

/// Observable state of a simulated device
#[derive(Debug, Clone, Default)]
pub struct SimSnapshot {
    pub role_polls: u32,
    pub latches: u32,
    pub armed_steps: u32,
    pub cancels: u32,
    /// `(target_ns, interval_us)` staged but not committed
    pub staged: Option<(i64, u32)>,
    /// `(target_ns, interval_us)` armed in hardware
    pub committed: Option<(i64, u32)>,
    pub stream_open: bool,
    pub acquiring: bool,
    pub closed: bool,
    pub frames_produced: u64,
}

type Observed = Arc<Mutex<SimSnapshot>>;

fn lock(seen: &Observed) -> MutexGuard<'_, SimSnapshot> {
    seen.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend serving simulated devices
pub struct SimBackend {
    host: Arc<dyn HostClock>,
    specs: Vec<SimDeviceSpec>,
    observed: Mutex<HashMap<String, Observed>>,
}

impl SimBackend {
    pub fn new(host: Arc<dyn HostClock>) -> Self {
        Self {
            host,
            specs: Vec::new(),
            observed: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_device(mut self, spec: SimDeviceSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// One simulated device per config entry.
    ///
    /// All devices share one clock offset from the host (they follow the
    /// same grandmaster) plus a small per-device residual.
    pub fn from_devices(host: Arc<dyn HostClock>, devices: &[DeviceConfig]) -> Self {
        let mut rng = rand::rng();
        let shared_offset: i64 = rng.random_range(-5_000_000..=5_000_000);
        devices.iter().fold(Self::new(host), |backend, config| {
            let residual: i64 = rng.random_range(-20_000..=20_000);
            backend.with_device(
                SimDeviceSpec::from_config(config)
                    .with_offset_ns(shared_offset + residual)
                    .with_latch_latency(Duration::from_micros(200)),
            )
        })
    }

    /// State of the most recently opened device with this serial
    pub fn snapshot(&self, serial: &str) -> Option<SimSnapshot> {
        let observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        observed.get(serial).map(|p| lock(p).clone())
    }
}

impl DeviceBackend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.specs.iter().map(|s| s.serial.clone()).collect())
    }

    #[instrument(name = "sim_backend_open", skip(self))]
    fn open(&self, serial: &str) -> Result<Box<dyn DeviceClock>> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.serial == serial)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound {
                serial: serial.to_string(),
            })?;
        if spec.fail_open {
            return Err(DeviceError::open_failed(serial, "device busy (simulated fault)"));
        }

        let caps = resolve_capabilities(serial, &spec.property_names())?;
        let seen: Observed = Arc::default();
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(serial.to_string(), Arc::clone(&seen));

        debug!(serial, offset_ns = spec.offset_ns, "sim device opened");
        Ok(Box::new(SimDevice::new(spec, caps, Arc::clone(&self.host), seen)))
    }
}

/// Simulated camera
pub struct SimDevice {
    id: DeviceId,
    spec: SimDeviceSpec,
    caps: ResolvedCapabilities,
    host: Arc<dyn HostClock>,
    seen: Observed,
    latched: Option<i64>,
    staged: Option<(i64, u32)>,
    committed: Option<(i64, u32)>,
    producer: Option<FrameProducer>,
    stop: Arc<AtomicBool>,
    stream: Option<JoinHandle<()>>,
    acquiring: bool,
}

impl SimDevice {
    fn new(
        spec: SimDeviceSpec,
        caps: ResolvedCapabilities,
        host: Arc<dyn HostClock>,
        seen: Observed,
    ) -> Self {
        Self {
            id: DeviceId::new(&spec.serial),
            spec,
            caps,
            host,
            seen,
            latched: None,
            staged: None,
            committed: None,
            producer: None,
            stop: Arc::new(AtomicBool::new(false)),
            stream: None,
            acquiring: false,
        }
    }

    fn device_now_ns(&self) -> i64 {
        self.host.now_ns() + self.spec.offset_ns
    }

    /// Access a resolved property, honouring injected failures
    fn access(&self, capability: Capability, op: &str) -> std::result::Result<(), ContractError> {
        let property = self.caps.name(capability);
        if self.spec.failures.contains(&capability) {
            return Err(ContractError::device_io(
                self.id.as_str(),
                op,
                format!("{property} rejected (simulated fault)"),
            ));
        }
        trace!(device = %self.id, property, op, "property access");
        Ok(())
    }

    fn device_error(&self, op: &str, message: &str) -> ContractError {
        ContractError::device_io(self.id.as_str(), op, message)
    }

    fn halt_stream(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.stream.take() {
            if handle.join().is_err() {
                warn!(device = %self.id, "sim stream thread panicked");
            }
        }
        self.acquiring = false;
        lock(&self.seen).acquiring = false;
    }
}

impl DeviceClock for SimDevice {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    fn sync_role(&mut self) -> std::result::Result<SyncRole, ContractError> {
        self.access(Capability::SyncStatus, "read_sync_role")?;
        let mut seen = lock(&self.seen);
        seen.role_polls += 1;
        if seen.role_polls <= self.spec.unknown_polls {
            Ok(SyncRole::Unknown)
        } else {
            Ok(self.spec.role)
        }
    }

    fn latch_clock(&mut self) -> std::result::Result<(), ContractError> {
        self.access(Capability::TimestampLatch, "latch_clock")?;
        if !self.spec.latch_latency.is_zero() {
            thread::sleep(self.spec.latch_latency);
        }
        self.latched = Some(self.device_now_ns());
        lock(&self.seen).latches += 1;
        Ok(())
    }

    fn read_latched_ns(&mut self) -> std::result::Result<i64, ContractError> {
        self.access(Capability::TimestampLatchValue, "read_latched_ns")?;
        self.latched
            .ok_or_else(|| self.device_error("read_latched_ns", "no latched value"))
    }

    fn arm_trigger(&mut self, step: TriggerStep) -> std::result::Result<(), ContractError> {
        let capability = match step {
            TriggerStep::Selector => Capability::TriggerSelector,
            TriggerStep::Source => Capability::TriggerSource,
            TriggerStep::Mode => Capability::TriggerMode,
        };
        self.access(capability, "arm_trigger")?;
        lock(&self.seen).armed_steps += 1;
        Ok(())
    }

    fn cancel_schedule(&mut self) -> std::result::Result<(), ContractError> {
        self.access(Capability::SchedulerCancel, "cancel_schedule")?;
        self.staged = None;
        self.committed = None;
        let mut seen = lock(&self.seen);
        seen.cancels += 1;
        seen.staged = None;
        seen.committed = None;
        Ok(())
    }

    fn program_schedule(
        &mut self,
        target_ns: i64,
        interval_us: u32,
    ) -> std::result::Result<(), ContractError> {
        self.access(Capability::SchedulerTime, "program_schedule")?;
        self.access(Capability::SchedulerInterval, "program_schedule")?;
        if interval_us == 0 {
            return Err(self.device_error("program_schedule", "interval must be > 0"));
        }
        self.staged = Some((target_ns, interval_us));
        lock(&self.seen).staged = self.staged;
        Ok(())
    }

    fn commit_schedule(&mut self) -> std::result::Result<(), ContractError> {
        self.access(Capability::SchedulerCommit, "commit_schedule")?;
        let staged = self
            .staged
            .take()
            .ok_or_else(|| self.device_error("commit_schedule", "no schedule staged"))?;
        self.committed = Some(staged);
        let mut seen = lock(&self.seen);
        seen.staged = None;
        seen.committed = Some(staged);
        Ok(())
    }

    fn open_stream(
        &mut self,
        capacity: usize,
    ) -> std::result::Result<Box<dyn FrameSource>, ContractError> {
        if self.producer.is_some() || self.stream.is_some() {
            return Err(self.device_error("open_stream", "stream already open"));
        }
        let (producer, receiver) = frame_queue(self.id.clone(), BackpressureConfig::new(capacity));
        self.producer = Some(producer);
        lock(&self.seen).stream_open = true;
        Ok(Box::new(receiver))
    }

    fn start_acquisition(&mut self) -> std::result::Result<(), ContractError> {
        self.access(Capability::AcquisitionStart, "start_acquisition")?;
        if self.acquiring {
            return Ok(());
        }
        let Some((target_ns, interval_us)) = self.committed else {
            warn!(device = %self.id, "acquisition started without a committed schedule; no frames will arrive");
            self.acquiring = true;
            lock(&self.seen).acquiring = true;
            return Ok(());
        };
        let producer = self
            .producer
            .take()
            .ok_or_else(|| self.device_error("start_acquisition", "stream not open"))?;

        let interval_ns = interval_us as i64 * 1_000;
        let plan = StreamPlan {
            id: self.id.clone(),
            host: Arc::clone(&self.host),
            offset_ns: self.spec.offset_ns,
            target_ns,
            interval_ns,
            jitter_ns: self.spec.jitter_ns.min(interval_ns / 2 - 1).max(0),
            frame_limit: self.spec.frame_limit,
            payload: Bytes::from(vec![
                0x5A;
                self.spec.pixel_format.frame_size(self.spec.width, self.spec.height) as usize
            ]),
            stop: Arc::clone(&self.stop),
            seen: Arc::clone(&self.seen),
        };

        self.stop.store(false, Ordering::Release);
        let handle = thread::Builder::new()
            .name(format!("sim-{}", self.id))
            .spawn(move || run_stream(plan, producer))
            .map_err(|e| self.device_error("start_acquisition", &e.to_string()))?;
        self.stream = Some(handle);
        self.acquiring = true;
        lock(&self.seen).acquiring = true;
        Ok(())
    }

    fn stop_acquisition(&mut self) -> std::result::Result<(), ContractError> {
        self.halt_stream();
        self.access(Capability::AcquisitionStop, "stop_acquisition")
    }

    fn close(&mut self) -> std::result::Result<(), ContractError> {
        self.halt_stream();
        self.producer = None;
        let mut seen = lock(&self.seen);
        seen.stream_open = false;
        seen.closed = true;
        Ok(())
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.halt_stream();
    }
}

struct StreamPlan {
    id: DeviceId,
    host: Arc<dyn HostClock>,
    offset_ns: i64,
    target_ns: i64,
    interval_ns: i64,
    jitter_ns: i64,
    frame_limit: Option<u64>,
    payload: Bytes,
    stop: Arc<AtomicBool>,
    seen: Observed,
}

fn run_stream(plan: StreamPlan, producer: FrameProducer) {
    let mut rng = rand::rng();
    let mut k: u64 = 0;
    debug!(device = %plan.id, target_ns = plan.target_ns, interval_ns = plan.interval_ns, "sim stream armed");

    loop {
        if plan.frame_limit.is_some_and(|limit| k >= limit) {
            break;
        }
        let fire_ns = plan.target_ns + k as i64 * plan.interval_ns;
        if !wait_for_host(&plan, fire_ns - plan.offset_ns) {
            break;
        }
        let jitter = if plan.jitter_ns > 0 {
            rng.random_range(-plan.jitter_ns..=plan.jitter_ns)
        } else {
            0
        };

        match producer.push(FrameRecord::new(k, fire_ns + jitter, plan.payload.clone())) {
            Ok(()) => {}
            Err(IngestionError::Paused { .. }) => {
                debug!(device = %plan.id, frame = k, "ingestion paused, stream idle");
                break;
            }
            Err(IngestionError::QueueClosed { .. }) => break,
        }
        k += 1;
        lock(&plan.seen).frames_produced = k;
    }

    debug!(device = %plan.id, frames = k, "sim stream stopped");
}

/// Sleep until the host clock reaches `deadline_ns`; false if stopped first
fn wait_for_host(plan: &StreamPlan, deadline_ns: i64) -> bool {
    loop {
        if plan.stop.load(Ordering::Acquire) {
            return false;
        }
        let now = plan.host.now_ns();
        if now >= deadline_ns {
            return true;
        }
        let remaining = Duration::from_nanos((deadline_ns - now) as u64);
        thread::sleep(remaining.min(STREAM_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemHostClock;
    use std::time::Instant;

    fn backend(spec: SimDeviceSpec) -> SimBackend {
        SimBackend::new(Arc::new(SystemHostClock)).with_device(spec)
    }

    #[test]
    fn test_role_becomes_follower_after_polls() {
        let backend = backend(SimDeviceSpec::new("1").with_role(SyncRole::Follower, 2));
        let mut dev = backend.open("1").unwrap();
        assert_eq!(dev.sync_role().unwrap(), SyncRole::Unknown);
        assert_eq!(dev.sync_role().unwrap(), SyncRole::Unknown);
        assert_eq!(dev.sync_role().unwrap(), SyncRole::Follower);
        assert_eq!(backend.snapshot("1").unwrap().role_polls, 3);
    }

    #[test]
    fn test_latch_reflects_offset() {
        let host = SystemHostClock;
        let backend = backend(SimDeviceSpec::new("1").with_offset_ns(-3_000_000_000));
        let mut dev = backend.open("1").unwrap();

        let before = host.now_ns();
        dev.latch_clock().unwrap();
        let after = host.now_ns();
        let latched = dev.read_latched_ns().unwrap();
        assert!(latched >= before - 3_000_000_000);
        assert!(latched <= after - 3_000_000_000);
    }

    #[test]
    fn test_read_without_latch_fails() {
        let backend = backend(SimDeviceSpec::new("1"));
        let mut dev = backend.open("1").unwrap();
        assert!(dev.read_latched_ns().is_err());
    }

    #[test]
    fn test_injected_commit_failure() {
        let backend = backend(SimDeviceSpec::new("1").failing(Capability::SchedulerCommit));
        let mut dev = backend.open("1").unwrap();
        dev.program_schedule(1_000, 33_333).unwrap();
        let err = dev.commit_schedule().unwrap_err();
        assert!(err.to_string().contains("ActionSchedulerCommit"), "{err}");
        assert!(backend.snapshot("1").unwrap().committed.is_none());
    }

    #[test]
    fn test_gev_naming_resolves() {
        let backend = backend(SimDeviceSpec::new("1").with_naming(PropertyNaming::Gev));
        let mut dev = backend.open("1").unwrap();
        dev.latch_clock().unwrap();
        assert!(dev.read_latched_ns().is_ok());
    }

    #[test]
    fn test_hidden_capability_fails_open() {
        let backend = backend(SimDeviceSpec::new("1").without(Capability::SchedulerTime));
        assert!(matches!(
            backend.open("1").err(),
            Some(DeviceError::CapabilityMissing { .. })
        ));
    }

    #[test]
    fn test_stream_emits_on_schedule() {
        let host = SystemHostClock;
        let offset = 1_000_000_000;
        let backend = backend(
            SimDeviceSpec::new("1")
                .with_offset_ns(offset)
                .with_resolution(4, 2, PixelFormat::BayerGr8)
                .with_frame_limit(5),
        );
        let mut dev = backend.open("1").unwrap();
        let target = host.now_ns() + offset + 20_000_000;
        dev.program_schedule(target, 2_000).unwrap();
        dev.commit_schedule().unwrap();
        let mut source = dev.open_stream(16).unwrap();
        dev.start_acquisition().unwrap();

        let started = Instant::now();
        let mut frames = Vec::new();
        while frames.len() < 5 && started.elapsed() < Duration::from_secs(5) {
            match source.try_pop() {
                Some(f) => frames.push(f),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        dev.stop_acquisition().unwrap();
        dev.close().unwrap();

        assert_eq!(frames.len(), 5);
        for (k, f) in frames.iter().enumerate() {
            assert_eq!(f.frame_index, k as u64);
            assert_eq!(f.timestamp_ns, target + k as i64 * 2_000_000);
            assert_eq!(f.payload_size(), 8);
        }
        let snap = backend.snapshot("1").unwrap();
        assert!(snap.closed);
        assert_eq!(snap.frames_produced, 5);
    }
}
