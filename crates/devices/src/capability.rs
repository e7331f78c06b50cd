//! Capability resolution
//!
//! Firmware variants expose the same feature under different property
//! names. Each capability has an ordered alias list; the first alias the
//! device exposes wins, exact match before case-insensitive match.
//! Resolution runs once when a device is opened.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SyncStatus,
    TimestampLatch,
    TimestampLatchValue,
    TriggerSelector,
    TriggerSource,
    TriggerMode,
    SchedulerCancel,
    SchedulerTime,
    SchedulerInterval,
    SchedulerCommit,
    AcquisitionStart,
    AcquisitionStop,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Self::SyncStatus,
        Self::TimestampLatch,
        Self::TimestampLatchValue,
        Self::TriggerSelector,
        Self::TriggerSource,
        Self::TriggerMode,
        Self::SchedulerCancel,
        Self::SchedulerTime,
        Self::SchedulerInterval,
        Self::SchedulerCommit,
        Self::AcquisitionStart,
        Self::AcquisitionStop,
    ];

    /// Known property names, preferred first
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::SyncStatus => &["PtpStatus", "GevIEEE1588Status", "PtpClockStatus"],
            Self::TimestampLatch => &["TimestampLatch", "GevTimestampControlLatch", "PtpDataSetLatch"],
            Self::TimestampLatchValue => &["TimestampLatchValue", "GevTimestampValue", "PtpDataSetLatchValue"],
            Self::TriggerSelector => &["TriggerSelector"],
            Self::TriggerSource => &["TriggerSource"],
            Self::TriggerMode => &["TriggerMode"],
            Self::SchedulerCancel => &["ActionSchedulerCancel", "ScheduledActionCancel"],
            Self::SchedulerTime => &["ActionSchedulerTime", "ScheduledActionTime"],
            Self::SchedulerInterval => &["ActionSchedulerInterval", "ScheduledActionInterval"],
            Self::SchedulerCommit => &["ActionSchedulerCommit", "ScheduledActionCommit"],
            Self::AcquisitionStart => &["AcquisitionStart"],
            Self::AcquisitionStop => &["AcquisitionStop"],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Capability to property-name table for one device
#[derive(Debug, Clone)]
pub struct ResolvedCapabilities {
    names: HashMap<Capability, String>,
}

impl ResolvedCapabilities {
    /// Property name bound to a capability
    pub fn name(&self, capability: Capability) -> &str {
        self.names
            .get(&capability)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Resolve every capability against the properties a device exposes
pub fn resolve_capabilities(serial: &str, available: &[String]) -> Result<ResolvedCapabilities> {
    let mut names = HashMap::with_capacity(Capability::ALL.len());

    for capability in Capability::ALL {
        let aliases = capability.aliases();
        let exact = aliases
            .iter()
            .find_map(|alias| available.iter().find(|p| p.as_str() == *alias));
        let found = exact.or_else(|| {
            aliases.iter().find_map(|alias| {
                available
                    .iter()
                    .find(|p| p.eq_ignore_ascii_case(alias))
            })
        });

        match found {
            Some(property) => {
                debug!(serial, %capability, property = %property, "capability resolved");
                names.insert(capability, property.clone());
            }
            None => {
                return Err(DeviceError::CapabilityMissing {
                    serial: serial.to_string(),
                    capability: capability.to_string(),
                    tried: aliases.to_vec(),
                })
            }
        }
    }

    Ok(ResolvedCapabilities { names })
}
