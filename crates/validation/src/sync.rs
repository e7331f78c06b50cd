//! Cross-device sync-check
//!
//! For every frame number present in all devices' metadata logs the
//! spread `max - min` of the device timestamps is computed. Frames whose
//! spread exceeds the threshold are violations; the check passes only
//! without violations.

use std::collections::{BTreeMap, BTreeSet};

use observability::{record_sync_spread_ms, RunningStats};
use serde::Serialize;
use sraw::{read_metadata_log, MetadataLogEntry};
use tracing::{debug, info, instrument};

use crate::discover::SessionFiles;
use crate::error::{Result, ValidationError};

/// Violations listed in human-readable output
pub const MAX_SHOWN_VIOLATIONS: usize = 10;

pub const DEFAULT_THRESHOLD_MS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncViolation {
    pub frame_number: u64,
    pub spread_ns: i64,
    /// Device with the latest timestamp
    pub max_serial: String,
    /// Device with the earliest timestamp
    pub min_serial: String,
}

impl SyncViolation {
    pub fn spread_ms(&self) -> f64 {
        ns_to_ms(self.spread_ns)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncCheckReport {
    pub devices: Vec<String>,
    pub common_frames: usize,
    pub threshold_ms: f64,
    pub mean_spread_ms: f64,
    pub max_spread_ms: f64,
    pub p99_spread_ms: f64,
    pub violations: Vec<SyncViolation>,
    pub passed: bool,
}

impl SyncCheckReport {
    /// Violations to print, plus the number left out
    pub fn shown_violations(&self) -> (&[SyncViolation], usize) {
        let shown = self.violations.len().min(MAX_SHOWN_VIOLATIONS);
        (&self.violations[..shown], self.violations.len() - shown)
    }
}

/// Sync-check every device of a session that has a metadata log
#[instrument(name = "validation_sync_check", skip(session), fields(dir = %session.dir.display()))]
pub fn sync_check(session: &SessionFiles, threshold_ms: f64) -> Result<SyncCheckReport> {
    let mut logs = BTreeMap::new();
    for (serial, files) in &session.devices {
        if let Some(path) = &files.metadata_log {
            logs.insert(serial.clone(), read_metadata_log(path)?);
        }
    }
    sync_check_logs(&logs, threshold_ms)
}

/// Sync-check already loaded logs, keyed by device serial
pub fn sync_check_logs(
    logs: &BTreeMap<String, Vec<MetadataLogEntry>>,
    threshold_ms: f64,
) -> Result<SyncCheckReport> {
    if !threshold_ms.is_finite() || threshold_ms < 0.0 {
        return Err(ValidationError::invalid(
            "threshold_ms",
            format!("must be a non-negative number, got {threshold_ms}"),
        ));
    }
    if logs.len() < 2 {
        return Err(ValidationError::InsufficientDevices { found: logs.len() });
    }

    let by_frame: Vec<(&str, BTreeMap<u64, i64>)> = logs
        .iter()
        .map(|(serial, rows)| {
            let table = rows
                .iter()
                .filter_map(|r| r.frame_number_value().map(|n| (n, r.timestamp_ns)))
                .collect();
            (serial.as_str(), table)
        })
        .collect();

    let mut common: BTreeSet<u64> = by_frame[0].1.keys().copied().collect();
    for (_, table) in &by_frame[1..] {
        common.retain(|n| table.contains_key(n));
    }
    if common.is_empty() {
        return Err(ValidationError::NoCommonFrames);
    }

    let threshold_ns = (threshold_ms * 1e6).round() as i64;
    let mut stats = RunningStats::default();
    let mut spreads = Vec::with_capacity(common.len());
    let mut violations = Vec::new();

    for &frame_number in &common {
        let mut max: Option<(&str, i64)> = None;
        let mut min: Option<(&str, i64)> = None;
        for (serial, table) in &by_frame {
            let Some(&ts) = table.get(&frame_number) else {
                continue;
            };
            if max.map_or(true, |(_, m)| ts > m) {
                max = Some((*serial, ts));
            }
            if min.map_or(true, |(_, m)| ts < m) {
                min = Some((*serial, ts));
            }
        }
        let (Some((max_serial, max_ts)), Some((min_serial, min_ts))) = (max, min) else {
            continue;
        };

        let spread_ns = max_ts - min_ts;
        let spread_ms = ns_to_ms(spread_ns);
        stats.push(spread_ms);
        spreads.push(spread_ms);
        record_sync_spread_ms(spread_ms);

        if spread_ns > threshold_ns {
            debug!(frame_number, spread_ns, "sync violation");
            violations.push(SyncViolation {
                frame_number,
                spread_ns,
                max_serial: max_serial.to_string(),
                min_serial: min_serial.to_string(),
            });
        }
    }

    spreads.sort_by(f64::total_cmp);
    let p99_idx = ((spreads.len() as f64 * 0.99) as usize).min(spreads.len() - 1);
    let passed = violations.is_empty();

    info!(
        devices = logs.len(),
        common_frames = common.len(),
        mean_ms = stats.mean(),
        max_ms = stats.max(),
        violations = violations.len(),
        passed,
        "sync-check finished"
    );

    Ok(SyncCheckReport {
        devices: logs.keys().cloned().collect(),
        common_frames: common.len(),
        threshold_ms,
        mean_spread_ms: stats.mean(),
        max_spread_ms: stats.max(),
        p99_spread_ms: spreads[p99_idx],
        violations,
        passed,
    })
}

fn ns_to_ms(ns: i64) -> f64 {
    ns as f64 / 1e6
}
