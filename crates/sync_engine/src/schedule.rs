//! Deferred trigger scheduling
//!
//! One host instant is chosen for the whole session and mapped into each
//! device's clock through its offset. Every device is programmed with the
//! same logical start; the remaining alignment error is the offset
//! estimate's.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    trigger_interval_us, ClockOffset, ContractError, DeviceClock, DeviceConfig, DeviceId,
    HostClock, TriggerSchedule, TriggerStep,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, SyncError};

/// Result of a successful scheduling step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleOutcome {
    /// Shared start instant, host clock
    pub host_target_ns: i64,
    /// One committed schedule per device, in device order
    pub schedules: Vec<TriggerSchedule>,
}

/// Trigger rate per device, from the blueprint
pub fn trigger_rates(devices: &[DeviceConfig]) -> BTreeMap<DeviceId, f64> {
    devices
        .iter()
        .map(|d| (DeviceId::new(&d.serial), d.trigger_interval_fps))
        .collect()
}

pub struct ScheduleCoordinator {
    host: Arc<dyn HostClock>,
}

impl ScheduleCoordinator {
    pub fn new(host: Arc<dyn HostClock>) -> Self {
        Self { host }
    }

    /// Program and commit a trigger schedule on every device.
    ///
    /// Parameters are checked before any device is touched. If any device
    /// fails, devices already committed (and the failing one) get a
    /// best-effort cancel so none is left armed.
    #[instrument(
        name = "schedule_coordinate",
        skip(self, devices, offsets, trigger_fps),
        fields(device_count = devices.len())
    )]
    pub fn schedule(
        &self,
        devices: &mut [Box<dyn DeviceClock>],
        offsets: &BTreeMap<DeviceId, ClockOffset>,
        start_delay_s: f64,
        trigger_fps: &BTreeMap<DeviceId, f64>,
    ) -> Result<ScheduleOutcome> {
        if !start_delay_s.is_finite() || start_delay_s <= 0.0 {
            return Err(SyncError::invalid(
                "start_delay_s",
                format!("must be > 0, got {start_delay_s}"),
            ));
        }

        let mut plan = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            let id = device.device_id();
            let offset = offsets
                .get(id)
                .ok_or_else(|| SyncError::MissingOffset { device: id.clone() })?;
            let fps = trigger_fps.get(id).copied().ok_or_else(|| {
                SyncError::invalid("trigger_interval_fps", format!("no rate for device '{id}'"))
            })?;
            if !fps.is_finite() || fps <= 0.0 {
                return Err(SyncError::invalid(
                    "trigger_interval_fps",
                    format!("must be > 0 for device '{id}', got {fps}"),
                ));
            }
            let interval_us = trigger_interval_us(fps).ok_or_else(|| {
                SyncError::invalid(
                    "trigger_interval_fps",
                    format!("trigger interval for {fps} fps on device '{id}' exceeds {} us", u32::MAX),
                )
            })?;
            plan.push((offset.offset_ns, interval_us));
        }

        let host_now_ns = self.host.now_ns();
        let host_target_ns = host_now_ns + (start_delay_s * 1e9).round() as i64;
        info!(host_now_ns, host_target_ns, start_delay_s, "scheduling devices");

        let mut schedules = Vec::with_capacity(devices.len());
        for (idx, (offset_ns, interval_us)) in plan.into_iter().enumerate() {
            let schedule = TriggerSchedule {
                device_id: devices[idx].device_id().clone(),
                device_target_ns: host_target_ns + offset_ns,
                interval_us,
            };

            if let Err(e) = program_device(devices[idx].as_mut(), &schedule) {
                error!(
                    device = %schedule.device_id,
                    error = %e,
                    committed = idx,
                    "scheduling failed, cancelling armed devices"
                );
                cancel_all(&mut devices[..=idx]);
                return Err(e);
            }

            info!(
                device = %schedule.device_id,
                device_target_ns = schedule.device_target_ns,
                interval_us,
                "trigger schedule committed"
            );
            schedules.push(schedule);
        }

        Ok(ScheduleOutcome {
            host_target_ns,
            schedules,
        })
    }
}

fn program_device(device: &mut dyn DeviceClock, schedule: &TriggerSchedule) -> Result<()> {
    let id = &schedule.device_id;
    let fail = |step: &'static str| {
        move |source: ContractError| SyncError::Schedule {
            device: id.clone(),
            step,
            source,
        }
    };

    if let Err(e) = device.cancel_schedule() {
        warn!(device = %id, error = %e, "cancel of previous schedule failed");
    }

    for step in TriggerStep::ALL {
        if let Err(e) = device.arm_trigger(step) {
            warn!(device = %id, step = %step, error = %e, "trigger arming step failed, continuing");
        }
    }

    device.latch_clock().map_err(fail("future_check"))?;
    let device_now_ns = device.read_latched_ns().map_err(fail("future_check"))?;
    if schedule.device_target_ns <= device_now_ns {
        return Err(fail("future_check")(ContractError::ScheduleInPast {
            device: id.to_string(),
            target_ns: schedule.device_target_ns,
            device_now_ns,
        }));
    }
    debug!(
        device = %id,
        lead_ms = (schedule.device_target_ns - device_now_ns) as f64 / 1e6,
        "target is in the device's future"
    );

    device
        .program_schedule(schedule.device_target_ns, schedule.interval_us)
        .map_err(fail("program"))?;
    device.commit_schedule().map_err(fail("commit"))?;
    Ok(())
}

/// Best-effort cancel; failures are logged
pub fn cancel_all(devices: &mut [Box<dyn DeviceClock>]) {
    for device in devices.iter_mut() {
        if let Err(e) = device.cancel_schedule() {
            warn!(device = %device.device_id(), error = %e, "schedule cancel failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::ClockOffsetEstimator;
    use contracts::SystemHostClock;
    use devices::{Capability, DeviceBackend, SimBackend, SimDeviceSpec};

    fn host() -> Arc<dyn HostClock> {
        Arc::new(SystemHostClock)
    }

    fn setup(
        backend: &SimBackend,
        serials: &[&str],
    ) -> (Vec<Box<dyn DeviceClock>>, BTreeMap<DeviceId, ClockOffset>) {
        let mut devices: Vec<Box<dyn DeviceClock>> =
            serials.iter().map(|s| backend.open(s).unwrap()).collect();
        let offsets = ClockOffsetEstimator::new(host()).estimate(&mut devices).unwrap();
        (devices, offsets)
    }

    fn rates(serials: &[&str], fps: f64) -> BTreeMap<DeviceId, f64> {
        serials.iter().map(|s| (DeviceId::new(s), fps)).collect()
    }

    #[test]
    fn test_schedules_follow_offsets() {
        let serials = ["a", "b"];
        let backend = SimBackend::new(host())
            .with_device(SimDeviceSpec::new("a").with_offset_ns(-40_000_000))
            .with_device(SimDeviceSpec::new("b").with_offset_ns(90_000_000));
        let (mut devices, offsets) = setup(&backend, &serials);

        let outcome = ScheduleCoordinator::new(host())
            .schedule(&mut devices, &offsets, 0.5, &rates(&serials, 30.0))
            .unwrap();

        assert_eq!(outcome.schedules.len(), 2);
        for schedule in &outcome.schedules {
            let offset = &offsets[&schedule.device_id];
            assert_eq!(
                schedule.device_target_ns,
                outcome.host_target_ns + offset.offset_ns
            );
            assert_eq!(schedule.interval_us, 33_333);
            let snap = backend.snapshot(schedule.device_id.as_str()).unwrap();
            assert_eq!(snap.committed, Some((schedule.device_target_ns, 33_333)));
            assert_eq!(snap.armed_steps, 3);
        }
    }

    #[test]
    fn test_rejects_bad_parameters_before_touching_devices() {
        let serials = ["a"];
        let backend = SimBackend::new(host()).with_device(SimDeviceSpec::new("a"));
        let (mut devices, offsets) = setup(&backend, &serials);
        let coordinator = ScheduleCoordinator::new(host());

        for delay in [0.0, -1.0, f64::NAN] {
            let err = coordinator
                .schedule(&mut devices, &offsets, delay, &rates(&serials, 30.0))
                .unwrap_err();
            assert!(matches!(err, SyncError::InvalidParameter { .. }));
        }
        for fps in [0.0, -5.0] {
            let err = coordinator
                .schedule(&mut devices, &offsets, 1.0, &rates(&serials, fps))
                .unwrap_err();
            assert!(matches!(err, SyncError::InvalidParameter { .. }));
        }
        let err = coordinator
            .schedule(&mut devices, &BTreeMap::new(), 1.0, &rates(&serials, 30.0))
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingOffset { .. }));

        let snap = backend.snapshot("a").unwrap();
        assert_eq!(snap.cancels, 0);
        assert_eq!(snap.armed_steps, 0);
    }

    #[test]
    fn test_interval_overflow_rejected_before_touching_devices() {
        let serials = ["a", "b"];
        let backend = SimBackend::new(host())
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b"));
        let (mut devices, offsets) = setup(&backend, &serials);
        let mut fps = rates(&serials, 30.0);
        fps.insert(DeviceId::new("b"), 0.0001);

        let err = ScheduleCoordinator::new(host())
            .schedule(&mut devices, &offsets, 0.5, &fps)
            .unwrap_err();
        match &err {
            SyncError::InvalidParameter { field, message } => {
                assert_eq!(field, "trigger_interval_fps");
                assert!(message.contains("'b'"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        // "a" precedes the bad rate and is still untouched
        for serial in serials {
            let snap = backend.snapshot(serial).unwrap();
            assert_eq!(snap.cancels, 0, "device {serial}");
            assert_eq!(snap.armed_steps, 0, "device {serial}");
            assert!(snap.staged.is_none() && snap.committed.is_none());
        }
    }

    #[test]
    fn test_partial_failure_cancels_committed_devices() {
        let serials = ["1", "2", "3", "4"];
        let backend = SimBackend::new(host())
            .with_device(SimDeviceSpec::new("1"))
            .with_device(SimDeviceSpec::new("2"))
            .with_device(SimDeviceSpec::new("3").failing(Capability::SchedulerCommit))
            .with_device(SimDeviceSpec::new("4"));
        let (mut devices, offsets) = setup(&backend, &serials);

        let err = ScheduleCoordinator::new(host())
            .schedule(&mut devices, &offsets, 0.5, &rates(&serials, 30.0))
            .unwrap_err();
        assert!(matches!(
            &err,
            SyncError::Schedule { device, step: "commit", .. } if device.as_str() == "3"
        ));

        for serial in ["1", "2", "3"] {
            let snap = backend.snapshot(serial).unwrap();
            assert!(snap.committed.is_none(), "device {serial} left armed");
            // one cancel before programming, one in the rollback
            assert_eq!(snap.cancels, 2, "device {serial}");
        }
        let untouched = backend.snapshot("4").unwrap();
        assert_eq!(untouched.cancels, 0);
        assert!(untouched.committed.is_none());
    }

    #[test]
    fn test_arming_failure_is_not_fatal() {
        let serials = ["a"];
        let backend = SimBackend::new(host())
            .with_device(SimDeviceSpec::new("a").failing(Capability::TriggerSource));
        let (mut devices, offsets) = setup(&backend, &serials);

        let outcome = ScheduleCoordinator::new(host())
            .schedule(&mut devices, &offsets, 0.5, &rates(&serials, 25.0))
            .unwrap();
        assert_eq!(outcome.schedules[0].interval_us, 40_000);
        assert_eq!(backend.snapshot("a").unwrap().armed_steps, 2);
    }

    #[test]
    fn test_target_in_past_is_rejected() {
        // the device clock runs far ahead of the offset the coordinator is given
        let serials = ["a"];
        let backend = SimBackend::new(host())
            .with_device(SimDeviceSpec::new("a").with_offset_ns(60_000_000_000));
        let mut devices: Vec<Box<dyn DeviceClock>> = vec![backend.open("a").unwrap()];
        let stale: BTreeMap<DeviceId, ClockOffset> = [(
            DeviceId::new("a"),
            ClockOffset {
                device_id: DeviceId::new("a"),
                offset_ns: 0,
                bracket_ns: 0,
            },
        )]
        .into_iter()
        .collect();

        let err = ScheduleCoordinator::new(host())
            .schedule(&mut devices, &stale, 1.0, &rates(&serials, 30.0))
            .unwrap_err();
        match err {
            SyncError::Schedule {
                step: "future_check",
                source: ContractError::ScheduleInPast { .. },
                ..
            } => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(backend.snapshot("a").unwrap().committed.is_none());
    }

    #[test]
    fn test_trigger_rates_from_config() {
        let config = DeviceConfig {
            serial: "77".into(),
            width: 8,
            height: 8,
            pixel_format: contracts::PixelFormat::BayerGr8,
            acquisition_fps: 50.0,
            trigger_interval_fps: 25.0,
        };
        let rates = trigger_rates(&[config]);
        assert_eq!(rates[&DeviceId::new("77")], 25.0);
    }
}
