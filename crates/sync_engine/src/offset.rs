//! Clock offset estimation
//!
//! All devices are latched inside one host-clock bracket and share its
//! midpoint as reference, so sequential per-device command latency does
//! not skew one device against another.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{ClockOffset, DeviceClock, DeviceId, HostClock};
use tracing::{debug, error, info, instrument};

use crate::error::{Result, SyncError};

pub struct ClockOffsetEstimator {
    host: Arc<dyn HostClock>,
}

impl ClockOffsetEstimator {
    pub fn new(host: Arc<dyn HostClock>) -> Self {
        Self { host }
    }

    /// Estimate `device_ns - host_ns` for every device.
    ///
    /// Any latch or read failure fails the whole step; a device is never
    /// given a default offset.
    #[instrument(name = "clock_offset_estimate", skip(self, devices), fields(device_count = devices.len()))]
    pub fn estimate(
        &self,
        devices: &mut [Box<dyn DeviceClock>],
    ) -> Result<BTreeMap<DeviceId, ClockOffset>> {
        let before_ns = self.host.now_ns();
        for device in devices.iter_mut() {
            let id = device.device_id().clone();
            device.latch_clock().map_err(|source| {
                error!(device = %id, error = %source, "clock latch failed");
                SyncError::Estimation {
                    device: id,
                    op: "latch_clock",
                    source,
                }
            })?;
        }
        let after_ns = self.host.now_ns();

        let bracket_ns = after_ns - before_ns;
        let host_ref_ns = before_ns + bracket_ns / 2;
        debug!(before_ns, after_ns, bracket_ns, "latch bracket closed");

        let mut offsets = BTreeMap::new();
        for device in devices.iter_mut() {
            let id = device.device_id().clone();
            let latched_ns = device.read_latched_ns().map_err(|source| {
                error!(device = %id, error = %source, "latched clock read failed");
                SyncError::Estimation {
                    device: id.clone(),
                    op: "read_latched_ns",
                    source,
                }
            })?;

            let offset = ClockOffset {
                device_id: id.clone(),
                offset_ns: latched_ns - host_ref_ns,
                bracket_ns,
            };
            observability::record_clock_offset(&id, offset.offset_ns);
            info!(
                device = %id,
                offset_ns = offset.offset_ns,
                offset_ms = offset.offset_ns as f64 / 1e6,
                bracket_us = bracket_ns as f64 / 1e3,
                "clock offset estimated"
            );
            offsets.insert(id, offset);
        }

        Ok(offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemHostClock;
    use devices::{Capability, DeviceBackend, SimBackend, SimDeviceSpec};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Host clock advancing a fixed step on every read
    struct SteppingClock {
        now: AtomicI64,
        step: i64,
    }

    impl HostClock for SteppingClock {
        fn now_ns(&self) -> i64 {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    fn open_all(backend: &SimBackend, serials: &[&str]) -> Vec<Box<dyn DeviceClock>> {
        serials.iter().map(|s| backend.open(s).unwrap()).collect()
    }

    #[test]
    fn test_offsets_within_bracket() {
        let host: Arc<dyn HostClock> = Arc::new(SteppingClock {
            now: AtomicI64::new(1_000_000_000),
            step: 1_000,
        });
        let backend = SimBackend::new(Arc::clone(&host))
            .with_device(SimDeviceSpec::new("a").with_offset_ns(-2_500_000))
            .with_device(SimDeviceSpec::new("b").with_offset_ns(7_000_000))
            .with_device(SimDeviceSpec::new("c").with_offset_ns(0));
        let mut devices = open_all(&backend, &["a", "b", "c"]);

        let offsets = ClockOffsetEstimator::new(host).estimate(&mut devices).unwrap();
        assert_eq!(offsets.len(), 3);
        for (id, truth) in [("a", -2_500_000i64), ("b", 7_000_000), ("c", 0)] {
            let offset = &offsets[&DeviceId::new(id)];
            assert!(offset.bracket_ns > 0);
            assert!(
                (offset.offset_ns - truth).abs() <= offset.bracket_ns,
                "{id}: {} vs {truth}",
                offset.offset_ns
            );
        }
    }

    #[test]
    fn test_repeated_estimates_agree() {
        let host: Arc<dyn HostClock> = Arc::new(SystemHostClock);
        let backend = SimBackend::new(Arc::clone(&host))
            .with_device(SimDeviceSpec::new("a").with_offset_ns(123_456_789));
        let mut devices = open_all(&backend, &["a"]);
        let estimator = ClockOffsetEstimator::new(host);

        let first = estimator.estimate(&mut devices).unwrap();
        let second = estimator.estimate(&mut devices).unwrap();
        let (a, b) = (&first[&DeviceId::new("a")], &second[&DeviceId::new("a")]);
        assert!((a.offset_ns - b.offset_ns).abs() <= a.bracket_ns + b.bracket_ns);
    }

    #[test]
    fn test_read_failure_is_fatal() {
        let host: Arc<dyn HostClock> = Arc::new(SystemHostClock);
        let backend = SimBackend::new(Arc::clone(&host))
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b").failing(Capability::TimestampLatchValue));
        let mut devices = open_all(&backend, &["a", "b"]);

        let err = ClockOffsetEstimator::new(host).estimate(&mut devices).unwrap_err();
        assert!(matches!(
            &err,
            SyncError::Estimation { device, op: "read_latched_ns", .. } if device.as_str() == "b"
        ));
    }

    #[test]
    fn test_latch_failure_is_fatal() {
        let host: Arc<dyn HostClock> = Arc::new(SystemHostClock);
        let backend = SimBackend::new(Arc::clone(&host))
            .with_device(SimDeviceSpec::new("a").failing(Capability::TimestampLatch));
        let mut devices = open_all(&backend, &["a"]);

        let err = ClockOffsetEstimator::new(host).estimate(&mut devices).unwrap_err();
        assert_eq!(err.device().map(DeviceId::as_str), Some("a"));
    }
}
