//! Recording report emitted when a session ends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::DeviceId;

/// Why a capture worker left the acquiring state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Session end time reached
    Deadline,
    /// Stop requested before the end time
    Cancelled,
    /// Device queue hit its cap and ingestion paused
    Backpressure,
    /// Sink write failed or the encoder process exited
    SinkFailure,
    /// Acquisition could not be started
    AcquisitionFailed,
    /// Worker thread panicked
    Panicked,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deadline => "deadline",
            Self::Cancelled => "cancelled",
            Self::Backpressure => "backpressure",
            Self::SinkFailure => "sink_failure",
            Self::AcquisitionFailed => "acquisition_failed",
            Self::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

/// Per-device outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device_id: DeviceId,
    /// floor(duration * trigger_fps)
    pub expected_frames: u64,
    pub actual_frames: u64,
    /// actual - expected
    pub delta: i64,
    pub files: Vec<PathBuf>,
    pub stop_reason: StopReason,
    /// True if ingestion paused on backpressure at any point
    pub paused: bool,
    /// Teardown steps that failed (logged, never fatal)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown_errors: Vec<String>,
}

impl DeviceReport {
    pub fn new(device_id: DeviceId, expected_frames: u64, actual_frames: u64) -> Self {
        Self {
            device_id,
            expected_frames,
            actual_frames,
            delta: actual_frames as i64 - expected_frames as i64,
            files: Vec::new(),
            stop_reason: StopReason::Deadline,
            paused: false,
            teardown_errors: Vec::new(),
        }
    }
}

/// Whole-session outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingReport {
    pub session_dir: PathBuf,
    /// Scheduled first trigger, host clock
    pub host_target_ns: i64,
    pub duration_s: f64,
    pub devices: Vec<DeviceReport>,
}

impl RecordingReport {
    pub fn total_frames(&self) -> u64 {
        self.devices.iter().map(|d| d.actual_frames).sum()
    }

    /// True when every device ran to the end time
    pub fn all_completed(&self) -> bool {
        self.devices
            .iter()
            .all(|d| d.stop_reason == StopReason::Deadline)
    }
}


/// Frames a device should deliver over `duration_s` at `trigger_fps`
pub fn expected_frame_count(duration_s: f64, trigger_fps: f64) -> u64 {
    (duration_s * trigger_fps).floor().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_sign() {
        let r = DeviceReport::new("a".into(), 300, 298);
        assert_eq!(r.delta, -2);
    }

    #[test]
    fn test_expected_frame_count() {
        assert_eq!(expected_frame_count(10.0, 30.0), 300);
        assert_eq!(expected_frame_count(1.5, 25.0), 37);
    }

    #[test]
    fn test_stop_reason_json() {
        let json = serde_json::to_string(&StopReason::SinkFailure).unwrap();
        assert_eq!(json, "\"sink_failure\"");
    }
}
