//! Sync role gate
//!
//! Recording may only be scheduled once every device reports the expected
//! clock-sync role (normally follower of the network grandmaster).

use std::thread;
use std::time::{Duration, Instant};

use contracts::{DeviceClock, SessionConfig, SyncRole};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::error::{Result, SyncError};

/// Devices per observed role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCensus {
    pub followers: usize,
    pub leaders: usize,
    pub unknown: usize,
}

impl RoleCensus {
    pub fn record(&mut self, role: SyncRole) {
        match role {
            SyncRole::Follower => self.followers += 1,
            SyncRole::Leader => self.leaders += 1,
            SyncRole::Unknown => self.unknown += 1,
        }
    }

    pub fn count(&self, role: SyncRole) -> usize {
        match role {
            SyncRole::Follower => self.followers,
            SyncRole::Leader => self.leaders,
            SyncRole::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.followers + self.leaders + self.unknown
    }
}

#[derive(Debug, Clone)]
pub struct SyncRoleMonitor {
    expected: SyncRole,
    timeout: Duration,
    poll_interval: Duration,
}

impl SyncRoleMonitor {
    pub fn new(expected: SyncRole, timeout: Duration, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(SyncError::invalid("role_poll_interval_s", "must be > 0"));
        }
        Ok(Self {
            expected,
            timeout,
            poll_interval,
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        Self::new(
            config.expected_role,
            config.role_timeout(),
            config.role_poll_interval(),
        )
    }

    pub fn expected(&self) -> SyncRole {
        self.expected
    }

    /// Poll all devices until every one reports the expected role.
    ///
    /// A failed role read counts as `unknown` for that round.
    #[instrument(
        name = "sync_role_wait",
        skip(self, devices),
        fields(expected = %self.expected, device_count = devices.len())
    )]
    pub fn wait_for_role(&self, devices: &mut [Box<dyn DeviceClock>]) -> Result<RoleCensus> {
        let started = Instant::now();
        let mut round = 0u32;

        loop {
            round += 1;
            let census = self.poll(devices);
            if census.count(self.expected) == devices.len() {
                info!(
                    rounds = round,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "all devices reached expected role"
                );
                return Ok(census);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                error!(
                    followers = census.followers,
                    leaders = census.leaders,
                    unknown = census.unknown,
                    "timed out waiting for sync role"
                );
                return Err(SyncError::RoleTimeout {
                    expected: self.expected,
                    waited_ms: elapsed.as_millis() as u64,
                    census,
                });
            }

            debug!(
                round,
                matching = census.count(self.expected),
                followers = census.followers,
                leaders = census.leaders,
                unknown = census.unknown,
                "waiting for sync role"
            );
            thread::sleep(self.poll_interval.min(self.timeout - elapsed));
        }
    }

    fn poll(&self, devices: &mut [Box<dyn DeviceClock>]) -> RoleCensus {
        let mut census = RoleCensus::default();
        for device in devices.iter_mut() {
            match device.sync_role() {
                Ok(role) => census.record(role),
                Err(e) => {
                    debug!(device = %device.device_id(), error = %e, "sync role read failed");
                    census.record(SyncRole::Unknown);
                }
            }
        }
        census
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SystemHostClock;
    use devices::{Capability, DeviceBackend, SimBackend, SimDeviceSpec};
    use std::sync::Arc;

    fn monitor(timeout_ms: u64) -> SyncRoleMonitor {
        SyncRoleMonitor::new(
            SyncRole::Follower,
            Duration::from_millis(timeout_ms),
            Duration::from_millis(5),
        )
        .unwrap()
    }

    fn open(backend: &SimBackend, serials: &[&str]) -> Vec<Box<dyn DeviceClock>> {
        serials.iter().map(|s| backend.open(s).unwrap()).collect()
    }

    #[test]
    fn test_waits_until_all_follow() {
        let backend = SimBackend::new(Arc::new(SystemHostClock))
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b").with_role(SyncRole::Follower, 3));
        let mut devices = open(&backend, &["a", "b"]);

        let census = monitor(2_000).wait_for_role(&mut devices).unwrap();
        assert_eq!(census.followers, 2);
        assert_eq!(backend.snapshot("b").unwrap().role_polls, 4);
    }

    #[test]
    fn test_timeout_reports_census() {
        let backend = SimBackend::new(Arc::new(SystemHostClock))
            .with_device(SimDeviceSpec::new("a"))
            .with_device(SimDeviceSpec::new("b").with_role(SyncRole::Leader, 0))
            .with_device(SimDeviceSpec::new("c").failing(Capability::SyncStatus));
        let mut devices = open(&backend, &["a", "b", "c"]);

        let err = monitor(30).wait_for_role(&mut devices).unwrap_err();
        match err {
            SyncError::RoleTimeout { census, .. } => {
                assert_eq!(census.followers, 1);
                assert_eq!(census.leaders, 1);
                assert_eq!(census.unknown, 1);
                assert_eq!(census.total(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(SyncRoleMonitor::new(SyncRole::Follower, Duration::from_secs(1), Duration::ZERO)
            .is_err());
    }
}
