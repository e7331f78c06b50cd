//! Capture metrics
//!
//! Thin wrappers over the `metrics` facade so metric names and labels are
//! defined in one place. Without an installed recorder they are no-ops.

use contracts::{DeviceId, StopReason};
use metrics::{counter, gauge, histogram};

/// One frame persisted by a capture worker
pub fn record_frame_written(device: &DeviceId) {
    counter!("synccap_frames_written_total", "device" => device.to_string()).increment(1);
}

/// Sink write failure or encoder exit
pub fn record_sink_failure(device: &DeviceId) {
    counter!("synccap_sink_failures_total", "device" => device.to_string()).increment(1);
}

/// Estimated device-to-host clock offset
pub fn record_clock_offset(device: &DeviceId, offset_ns: i64) {
    gauge!("synccap_clock_offset_ms", "device" => device.to_string())
        .set(offset_ns as f64 / 1e6);
}

/// Worker exit, labelled with why it stopped
pub fn record_worker_stopped(device: &DeviceId, reason: StopReason) {
    counter!(
        "synccap_workers_stopped_total",
        "device" => device.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Cross-device timestamp spread of one frame number
pub fn record_sync_spread_ms(spread_ms: f64) {
    histogram!("synccap_sync_spread_ms").record(spread_ms);
}

/// Summary of a RunningStats
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}

impl Extend<f64> for RunningStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        stats.extend([1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let empty = RunningStats::default();
        assert_eq!(empty.summary().to_string(), "N/A");

        let mut stats = RunningStats::default();
        stats.push(0.5);
        assert!(stats.summary().to_string().contains("n=1"));
    }

    #[test]
    fn test_helpers_without_recorder() {
        let id: DeviceId = "1".into();
        record_frame_written(&id);
        record_sink_failure(&id);
        record_clock_offset(&id, -1_500_000);
        record_worker_stopped(&id, StopReason::Deadline);
        record_sync_spread_ms(0.2);
    }
}
