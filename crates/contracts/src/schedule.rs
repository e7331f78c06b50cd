//! Clock offsets and trigger schedules

use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// Estimated difference between a device clock and the host clock.
///
/// `device_ns ≈ host_ns + offset_ns`. `bracket_ns` is the width of the host
/// time window around the latch, an upper bound on the estimate's error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub device_id: DeviceId,
    pub offset_ns: i64,
    pub bracket_ns: i64,
}

impl ClockOffset {
    /// Map a host-clock instant into this device's clock
    #[inline]
    pub fn to_device_ns(&self, host_ns: i64) -> i64 {
        host_ns + self.offset_ns
    }

    /// Map a device-clock instant back into host time
    #[inline]
    pub fn to_host_ns(&self, device_ns: i64) -> i64 {
        device_ns - self.offset_ns
    }
}

/// A committed hardware trigger schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSchedule {
    pub device_id: DeviceId,
    /// First trigger, device clock
    pub device_target_ns: i64,
    pub interval_us: u32,
}

/// Trigger interval for a trigger rate, rounded to whole microseconds.
///
/// `None` when the interval does not fit the hardware's 32-bit register
/// (rates below ~0.000233 fps) or the rate is not a positive number.
pub fn trigger_interval_us(trigger_fps: f64) -> Option<u32> {
    if !trigger_fps.is_finite() || trigger_fps <= 0.0 {
        return None;
    }
    let interval = (1_000_000.0 / trigger_fps).round().max(1.0);
    (interval <= u32::MAX as f64).then_some(interval as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_rounding() {
        assert_eq!(trigger_interval_us(30.0), Some(33_333));
        assert_eq!(trigger_interval_us(60.0), Some(16_667));
        assert_eq!(trigger_interval_us(1000.0), Some(1000));
        assert_eq!(trigger_interval_us(5e6), Some(1));
    }

    #[test]
    fn test_interval_out_of_register_range() {
        // ~4295 s between triggers still fits, a few hours does not
        assert_eq!(trigger_interval_us(0.000233), Some(4_291_845_494));
        assert_eq!(trigger_interval_us(0.0001), None);
        assert_eq!(trigger_interval_us(0.0), None);
        assert_eq!(trigger_interval_us(f64::NAN), None);
    }

    #[test]
    fn test_offset_mapping() {
        let off = ClockOffset {
            device_id: "a".into(),
            offset_ns: -250,
            bracket_ns: 10,
        };
        assert_eq!(off.to_device_ns(1_000), 750);
        assert_eq!(off.to_host_ns(750), 1_000);
    }
}
