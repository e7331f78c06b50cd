//! Raw output disk usage estimate

use contracts::{expected_frame_count, SessionBlueprint};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEstimate {
    pub serial: String,
    pub frames: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskEstimate {
    pub devices: Vec<DeviceEstimate>,
    pub total_bytes: u64,
}

impl DiskEstimate {
    /// `duration * trigger_fps * width * height * bytes_per_pixel` per device
    pub fn for_blueprint(blueprint: &SessionBlueprint) -> Self {
        let devices: Vec<DeviceEstimate> = blueprint
            .devices
            .iter()
            .map(|d| {
                let frames =
                    expected_frame_count(blueprint.session.duration_s, d.trigger_interval_fps);
                DeviceEstimate {
                    serial: d.serial.clone(),
                    frames,
                    bytes: frames * d.frame_size(),
                }
            })
            .collect();
        let total_bytes = devices.iter().map(|d| d.bytes).sum();
        Self {
            devices,
            total_bytes,
        }
    }
}

pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1u64 << 30) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::blueprint;

    #[test]
    fn test_estimate() {
        let mut bp = blueprint(&["a", "b"], std::path::Path::new("out"));
        bp.session.duration_s = 10.0;
        for d in &mut bp.devices {
            d.width = 1920;
            d.height = 1080;
            d.trigger_interval_fps = 30.0;
        }
        let est = DiskEstimate::for_blueprint(&bp);
        assert_eq!(est.devices[0].frames, 300);
        assert_eq!(est.devices[0].bytes, 300 * 2_073_600);
        assert_eq!(est.total_bytes, 2 * 300 * 2_073_600);
        assert!(gib(est.total_bytes) > 1.0);
    }
}
